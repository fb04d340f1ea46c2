// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the inrelay bridge.

use thiserror::Error;

/// The primary error type used across all inrelay crates.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Relay database errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A provisioning request was malformed. Rejected synchronously;
    /// nothing is persisted. The reason is machine-readable (snake_case).
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// Activation targeted a nonexistent or already-consumed pending
    /// subscription. Deliberately carries no detail about which field
    /// mismatched.
    #[error("no matching pending subscription")]
    NotFound,

    /// Destination unreachable or rejected in a retryable way.
    #[error("transient delivery error: {message}")]
    TransientDelivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Destination rejected the delivery in a way retries cannot fix
    /// (oversized payload, malformed request). The destination is marked
    /// failed and left for operator intervention.
    #[error("permanent delivery error: {message}")]
    PermanentDelivery { message: String },

    /// Destination rejected the relay's credentials. Permanent, and the
    /// dispatcher additionally revokes the offending subscription.
    #[error("delivery unauthorized (status {status})")]
    DeliveryUnauthorized { status: u16 },

    /// The messenger database or media directory was unreadable. The
    /// whole poll cycle is aborted and retried next interval.
    #[error("detector I/O error: {source}")]
    DetectorIo {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Whether a delivery failure with this error should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::TransientDelivery { .. } | RelayError::Timeout { .. }
        )
    }

    /// Shorthand constructor for validation failures.
    pub fn validation(reason: impl Into<String>) -> Self {
        RelayError::Validation {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(
            RelayError::TransientDelivery {
                message: "503".into(),
                source: None,
            }
            .is_transient()
        );
        assert!(
            RelayError::Timeout {
                duration: std::time::Duration::from_secs(15),
            }
            .is_transient()
        );
        assert!(
            !RelayError::PermanentDelivery {
                message: "too large".into(),
            }
            .is_transient()
        );
        assert!(!RelayError::DeliveryUnauthorized { status: 401 }.is_transient());
        assert!(!RelayError::NotFound.is_transient());
    }

    #[test]
    fn not_found_message_leaks_nothing() {
        let msg = RelayError::NotFound.to_string();
        assert!(!msg.contains("token"));
        assert!(!msg.contains("phone"));
        assert!(!msg.contains("name"));
    }
}
