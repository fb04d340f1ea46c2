// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the inrelay configuration system.

use inrelay_config::diagnostic::{ConfigError, suggest_key};
use inrelay_config::model::RelayConfig;
use inrelay_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_relay_config() {
    let toml = r#"
[bridge]
poll_interval_secs = 2
tail_limit = 50
boot_dump = 0
log_level = "debug"

[messenger]
db_path = "/data/messenger/messages.db"
media_root = "/data/messenger/media"
media_exts = ["jpg", "png"]

[storage]
database_path = "/var/lib/inrelay/inrelay.db"

[provision]
enabled = true
bind = "0.0.0.0"
port = 9000
secret = "a-long-provision-secret"

[routing]
caption_targeting = true
strip_target_word = false

[delivery]
forward_mode = "file_url"
http_timeout_secs = 30
retry_backoff_secs = [2, 8]
delete_on_success = false
max_attach_mb = 10

[smtp]
host = "smtp.example.org"
port = 465
username = "relay"
password = "hunter2"
from = "relay@example.org"
use_starttls = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.bridge.poll_interval_secs, 2);
    assert_eq!(config.bridge.tail_limit, 50);
    assert_eq!(config.bridge.boot_dump, 0);
    assert_eq!(config.bridge.log_level, "debug");
    assert_eq!(
        config.messenger.db_path.as_deref(),
        Some("/data/messenger/messages.db")
    );
    assert_eq!(config.messenger.media_exts, vec!["jpg", "png"]);
    assert_eq!(config.storage.database_path, "/var/lib/inrelay/inrelay.db");
    assert_eq!(config.provision.bind, "0.0.0.0");
    assert_eq!(config.provision.port, 9000);
    assert_eq!(
        config.provision.secret.as_deref(),
        Some("a-long-provision-secret")
    );
    assert!(!config.routing.strip_target_word);
    assert_eq!(config.delivery.forward_mode, "file_url");
    assert_eq!(config.delivery.retry_backoff_secs, vec![2, 8]);
    assert!(!config.delivery.delete_on_success);
    assert_eq!(config.delivery.max_attach_mb, 10);
    assert_eq!(config.smtp.host.as_deref(), Some("smtp.example.org"));
    assert_eq!(config.smtp.port, 465);
    assert!(!config.smtp.use_starttls);
    assert!(config.smtp.is_configured());
}

/// Unknown field in [bridge] section produces an error.
#[test]
fn unknown_field_in_bridge_produces_error() {
    let toml = r#"
[bridge]
pol_interval_secs = 5
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("pol_interval_secs"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let toml = "";
    let config = load_config_from_str(toml).expect("empty TOML should use defaults");

    assert_eq!(config.bridge.poll_interval_secs, 1);
    assert_eq!(config.bridge.tail_limit, 200);
    assert_eq!(config.bridge.log_level, "info");
    assert!(config.messenger.db_path.is_none());
    assert!(config.provision.enabled);
    assert_eq!(config.provision.bind, "127.0.0.1");
    assert_eq!(config.provision.port, 8788);
    assert!(config.provision.secret.is_none());
    assert!(config.routing.caption_targeting);
    assert_eq!(config.delivery.forward_mode, "base64");
    assert_eq!(config.delivery.retry_backoff_secs, vec![1, 4, 10]);
    assert!(config.smtp.host.is_none());
}

/// Env-style dotted overrides map onto nested fields.
#[test]
fn dotted_override_sets_messenger_db_path() {
    use figment::{Figment, providers::Serialized};

    let config: RelayConfig = Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(("messenger.db_path", "/from/env/messages.db"))
        .extract()
        .expect("should set db_path via dot notation");

    assert_eq!(
        config.messenger.db_path.as_deref(),
        Some("/from/env/messages.db")
    );
}

/// Missing config files are silently skipped (Figment's Toml::file behavior).
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: RelayConfig = Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::file("/nonexistent/path/inrelay.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.bridge.poll_interval_secs, 1);
}

/// Unexpected top-level section is rejected by deny_unknown_fields.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[webhooks]
url = "https://example.org"
"#;

    let err =
        load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("webhooks"),
        "error should mention unknown field, got: {err_str}"
    );
}

// ============================================================================
// Diagnostic tests
// ============================================================================

/// Unknown key close to a real one produces a "did you mean" suggestion.
#[test]
fn diagnostic_suggests_close_key() {
    let valid_keys = &["poll_interval_secs", "tail_limit", "boot_dump", "log_level"];
    assert_eq!(
        suggest_key("tail_limt", valid_keys),
        Some("tail_limit".to_string())
    );
}

/// Error output from load_and_validate_str includes the unknown key name.
#[test]
fn diagnostic_error_includes_unknown_key() {
    let toml = r#"
[bridge]
tail_limt = 50
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    assert!(!errors.is_empty(), "should have at least one error");

    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "tail_limt"
                && suggestion.as_deref() == Some("tail_limit")
                && valid_keys.contains("poll_interval_secs")
        })
    });
    assert!(
        has_unknown_key,
        "should have UnknownKey error for 'tail_limt' with suggestion, got: {errors:?}"
    );
}

/// Invalid type (string where number expected) produces a clear message.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[bridge]
poll_interval_secs = "often"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("poll_interval_secs"),
        "error should mention type mismatch, got: {err_str}"
    );
}

/// ConfigError implements miette::Diagnostic and renders.
#[test]
fn config_error_renders_with_miette() {
    use miette::GraphicalReportHandler;

    let error = ConfigError::UnknownKey {
        key: "tail_limt".to_string(),
        suggestion: Some("tail_limit".to_string()),
        valid_keys: "poll_interval_secs, tail_limit, boot_dump, log_level".to_string(),
        span: None,
        src: None,
    };

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("tail_limt"), "rendered report should mention the key");
}

/// Validation catches a semantic error after successful deserialization.
#[test]
fn validation_catches_bad_forward_mode() {
    let toml = r#"
[delivery]
forward_mode = "base32"
"#;

    let errors = load_and_validate_str(toml).expect_err("bad forward mode should fail");
    let has_validation_error = errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("forward_mode"))
    });
    assert!(has_validation_error, "should have validation error, got: {errors:?}");
}

/// load_and_validate_str with valid TOML returns Ok config.
#[test]
fn load_and_validate_valid_toml() {
    let toml = r#"
[bridge]
poll_interval_secs = 3
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should validate");
    assert_eq!(config.bridge.poll_interval_secs, 3);
}
