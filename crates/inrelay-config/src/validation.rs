// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses, known forward modes, and
//! non-empty retry schedules.

use crate::diagnostic::ConfigError;
use crate::model::RelayConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate bind address looks like a valid IP or hostname
    let addr = config.provision.bind.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: "provision.bind must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!(
                    "provision.bind `{addr}` is not a valid IP address or hostname"
                ),
            });
        }
    }

    // Validate database_path is not empty
    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    // Validate poll interval is non-zero
    if config.bridge.poll_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "bridge.poll_interval_secs must be at least 1".to_string(),
        });
    }

    // Validate tail limit is positive
    if config.bridge.tail_limit < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "bridge.tail_limit must be positive, got {}",
                config.bridge.tail_limit
            ),
        });
    }

    // Validate forward mode is a known value
    if config.delivery.forward_mode != "base64" && config.delivery.forward_mode != "file_url" {
        errors.push(ConfigError::Validation {
            message: format!(
                "delivery.forward_mode must be `base64` or `file_url`, got `{}`",
                config.delivery.forward_mode
            ),
        });
    }

    // Validate the retry schedule exists (its length bounds retries)
    if config.delivery.retry_backoff_secs.is_empty() {
        errors.push(ConfigError::Validation {
            message: "delivery.retry_backoff_secs must not be empty".to_string(),
        });
    }

    if config.delivery.max_attach_mb < 1 {
        errors.push(ConfigError::Validation {
            message: "delivery.max_attach_mb must be at least 1".to_string(),
        });
    }

    // Validate media extension list
    if config.messenger.media_exts.is_empty() {
        errors.push(ConfigError::Validation {
            message: "messenger.media_exts must not be empty".to_string(),
        });
    }

    // Catch-all webhook must be an absolute http(s) URL and carry a token
    if let Some(url) = &config.routing.catch_all_webhook_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ConfigError::Validation {
                message: format!(
                    "routing.catch_all_webhook_url must be an http(s) URL, got `{url}`"
                ),
            });
        }
        if config.routing.catch_all_bearer_token.is_none() {
            errors.push(ConfigError::Validation {
                message: "routing.catch_all_bearer_token is required when \
                          routing.catch_all_webhook_url is set"
                    .to_string(),
            });
        }
    }

    // SMTP: from address is required once a host is configured
    if config.smtp.host.is_some() && config.smtp.from.is_none() {
        errors.push(ConfigError::Validation {
            message: "smtp.from is required when smtp.host is set".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = RelayConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = RelayConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))
        ));
    }

    #[test]
    fn zero_poll_interval_fails_validation() {
        let mut config = RelayConfig::default();
        config.bridge.poll_interval_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("poll_interval_secs"))
        ));
    }

    #[test]
    fn unknown_forward_mode_fails_validation() {
        let mut config = RelayConfig::default();
        config.delivery.forward_mode = "carrier-pigeon".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("forward_mode"))
        ));
    }

    #[test]
    fn empty_retry_schedule_fails_validation() {
        let mut config = RelayConfig::default();
        config.delivery.retry_backoff_secs = vec![];
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("retry_backoff_secs"))
        ));
    }

    #[test]
    fn catch_all_requires_token_and_http_url() {
        let mut config = RelayConfig::default();
        config.routing.catch_all_webhook_url = Some("gopher://hook".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2, "bad scheme and missing token: {errors:?}");

        config.routing.catch_all_webhook_url = Some("https://example.org/hook".to_string());
        config.routing.catch_all_bearer_token = Some("tok".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn smtp_host_without_from_fails_validation() {
        let mut config = RelayConfig::default();
        config.smtp.host = Some("smtp.example.org".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("smtp.from"))
        ));
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = RelayConfig::default();
        config.provision.bind = "0.0.0.0".to_string();
        config.storage.database_path = "/tmp/relay.db".to_string();
        config.delivery.forward_mode = "file_url".to_string();
        config.smtp.host = Some("smtp.example.org".to_string());
        config.smtp.from = Some("relay@example.org".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
