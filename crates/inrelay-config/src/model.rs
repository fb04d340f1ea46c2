// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the inrelay bridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level inrelay configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values;
/// `messenger.db_path` and `messenger.media_root` must be set before
/// `inrelay serve` will start.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Poll loop and logging settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Messenger app storage being observed.
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// Relay-owned SQLite database (subscriptions, event ledger).
    #[serde(default)]
    pub storage: StorageConfig,

    /// Provisioning HTTP API settings.
    #[serde(default)]
    pub provision: ProvisionConfig,

    /// Caption routing behavior.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Outbound delivery behavior (retries, timeouts, deletion).
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// SMTP relay used by email destinations.
    #[serde(default)]
    pub smtp: SmtpConfig,
}

/// Poll loop and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Seconds between messenger database polls. Shorter intervals lower
    /// detection latency at the cost of more I/O against the messenger's
    /// store.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum message rows fetched per poll cycle.
    #[serde(default = "default_tail_limit")]
    pub tail_limit: i64,

    /// Number of recent messages logged at startup (0 disables).
    #[serde(default = "default_boot_dump")]
    pub boot_dump: i64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            tail_limit: default_tail_limit(),
            boot_dump: default_boot_dump(),
            log_level: default_log_level(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_tail_limit() -> i64 {
    200
}

fn default_boot_dump() -> i64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Messenger app storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessengerConfig {
    /// Path to the messenger's SQLite database. Opened read-only.
    /// `None` prevents `serve` from starting.
    #[serde(default)]
    pub db_path: Option<String>,

    /// Root of the messenger's media directory (contains the
    /// high/preview/low/audio subdirectories).
    #[serde(default)]
    pub media_root: Option<String>,

    /// Media file extensions probed when resolving attachment files.
    #[serde(default = "default_media_exts")]
    pub media_exts: Vec<String>,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            media_root: None,
            media_exts: default_media_exts(),
        }
    }
}

fn default_media_exts() -> Vec<String> {
    ["avif", "jpg", "jpeg", "png", "ogg", "oga", "mp4", "m4a"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Relay database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the relay's own SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("inrelay").join("inrelay.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("inrelay.db"))
        .to_string_lossy()
        .into_owned()
}

/// Provisioning HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Enable the provisioning endpoint.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind.
    #[serde(default = "default_provision_bind")]
    pub bind: String,

    /// Port to bind.
    #[serde(default = "default_provision_port")]
    pub port: u16,

    /// Bearer secret required on `POST /provision`. `None` leaves the
    /// endpoint open to trusted operators only (documented trust boundary).
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind: default_provision_bind(),
            port: default_provision_port(),
            secret: None,
        }
    }
}

fn default_provision_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_provision_port() -> u16 {
    8788
}

/// Caption routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Route to a single subscription when the caption's first word names it.
    #[serde(default = "default_true")]
    pub caption_targeting: bool,

    /// Strip the matched routing word from the forwarded caption.
    #[serde(default = "default_true")]
    pub strip_target_word: bool,

    /// Catch-all webhook for events whose sender has no active
    /// subscriptions. `None` drops such events.
    #[serde(default)]
    pub catch_all_webhook_url: Option<String>,

    /// Bearer token for the catch-all webhook.
    #[serde(default)]
    pub catch_all_bearer_token: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            caption_targeting: default_true(),
            strip_target_word: default_true(),
            catch_all_webhook_url: None,
            catch_all_bearer_token: None,
        }
    }
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Webhook payload shape: "base64" embeds the file, "file_url" sends a
    /// file:// reference for co-located receivers.
    #[serde(default = "default_forward_mode")]
    pub forward_mode: String,

    /// Timeout for one outbound send attempt (HTTP POST or SMTP session).
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Backoff schedule between retries of one destination within a poll
    /// cycle, in seconds. The list length bounds the retry count.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: Vec<u64>,

    /// Delete the source media file once every destination succeeded.
    #[serde(default = "default_true")]
    pub delete_on_success: bool,

    /// Seconds to wait before deleting, giving the messenger UI time to
    /// release its handle on the file.
    #[serde(default = "default_delete_delay_secs")]
    pub delete_delay_secs: u64,

    /// Maximum attachment size for email destinations, in MiB. Larger files
    /// are a permanent delivery failure.
    #[serde(default = "default_max_attach_mb")]
    pub max_attach_mb: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            forward_mode: default_forward_mode(),
            http_timeout_secs: default_http_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            delete_on_success: default_true(),
            delete_delay_secs: default_delete_delay_secs(),
            max_attach_mb: default_max_attach_mb(),
        }
    }
}

fn default_forward_mode() -> String {
    "base64".to_string()
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_retry_backoff_secs() -> Vec<u64> {
    vec![1, 4, 10]
}

fn default_delete_delay_secs() -> u64 {
    2
}

fn default_max_attach_mb() -> u64 {
    5
}

/// SMTP relay configuration for email destinations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    /// SMTP server hostname. `None` disables email destinations.
    #[serde(default)]
    pub host: Option<String>,

    /// SMTP server port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// From address on outgoing mail.
    #[serde(default)]
    pub from: Option<String>,

    /// Upgrade the connection with STARTTLS.
    #[serde(default = "default_true")]
    pub use_starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            from: None,
            use_starttls: default_true(),
        }
    }
}

impl SmtpConfig {
    /// Whether enough is configured to send mail.
    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.from.is_some()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.bridge.poll_interval_secs, 1);
        assert_eq!(config.bridge.tail_limit, 200);
        assert_eq!(config.bridge.boot_dump, 5);
        assert_eq!(config.bridge.log_level, "info");
        assert!(config.messenger.db_path.is_none());
        assert_eq!(config.messenger.media_exts.len(), 8);
        assert!(config.provision.enabled);
        assert_eq!(config.provision.bind, "127.0.0.1");
        assert_eq!(config.provision.port, 8788);
        assert!(config.routing.caption_targeting);
        assert!(config.routing.strip_target_word);
        assert!(config.routing.catch_all_webhook_url.is_none());
        assert_eq!(config.delivery.forward_mode, "base64");
        assert_eq!(config.delivery.retry_backoff_secs, vec![1, 4, 10]);
        assert_eq!(config.delivery.http_timeout_secs, 15);
        assert_eq!(config.delivery.max_attach_mb, 5);
        assert!(config.delivery.delete_on_success);
        assert_eq!(config.smtp.port, 587);
        assert!(config.smtp.use_starttls);
        assert!(!config.smtp.is_configured());
    }

    #[test]
    fn smtp_is_configured_requires_host_and_from() {
        let mut smtp = SmtpConfig::default();
        smtp.host = Some("smtp.example.org".into());
        assert!(!smtp.is_configured());
        smtp.from = Some("relay@example.org".into());
        assert!(smtp.is_configured());
    }

    #[test]
    fn unknown_section_field_is_rejected() {
        let toml_str = r#"
[bridge]
poll_interval = 5
"#;
        assert!(toml::from_str::<RelayConfig>(toml_str).is_err());
    }
}
