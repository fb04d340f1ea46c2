// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validation of provisioning inputs.
//!
//! A subscription name must be safe to appear both as the first word of a
//! media caption and inside the `sub <name> <token>` SMS command, so the
//! charset is deliberately narrow.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::RelayError;
use crate::types::Destination;

/// Maximum subscription name length.
pub const MAX_NAME_LEN: usize = 32;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static regex")
});

/// Validate a subscription name: 1..=32 chars from `[A-Za-z0-9_-]`.
pub fn validate_name(name: &str) -> Result<(), RelayError> {
    if name.is_empty() {
        return Err(RelayError::validation("empty_name"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RelayError::validation("name_too_long"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(RelayError::validation("invalid_name_charset"));
    }
    Ok(())
}

/// Validate a source phone number: non-empty after trimming.
///
/// The messenger reports MSISDNs as opaque strings; the relay matches them
/// byte-for-byte and does not attempt normalization.
pub fn validate_phone(phone: &str) -> Result<(), RelayError> {
    if phone.trim().is_empty() {
        return Err(RelayError::validation("empty_source_phone"));
    }
    Ok(())
}

/// Whether a single address is syntactically a valid email.
pub fn is_valid_email(addr: &str) -> bool {
    EMAIL_RE.is_match(addr)
}

/// Validate a destination before anything is persisted.
pub fn validate_destination(dest: &Destination) -> Result<(), RelayError> {
    match dest {
        Destination::Webhook { url, bearer_token } => {
            if url.trim().is_empty() {
                return Err(RelayError::validation("empty_webhook_url"));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(RelayError::validation("invalid_webhook_url"));
            }
            if bearer_token.trim().is_empty() {
                return Err(RelayError::validation("empty_bearer_token"));
            }
        }
        Destination::Email { addresses } => {
            if addresses.is_empty() {
                return Err(RelayError::validation("empty_address_list"));
            }
            if let Some(bad) = addresses.iter().find(|a| !is_valid_email(a)) {
                tracing::debug!(address = bad.as_str(), "rejecting invalid email address");
                return Err(RelayError::validation("invalid_email_address"));
            }
        }
    }
    Ok(())
}
