// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Acknowledgment monitor: parses inbound text replies into subscription
//! commands.
//!
//! Grammar (whitespace-split):
//! - `sub <name> <token>` -- exactly three tokens. The keyword and name fold
//!   case; the token is matched exactly as sent.
//! - `unsub <name>` / `unsub` -- revoke one or all subscriptions.
//!
//! Anything else is ordinary chat traffic and is ignored. There is no
//! outbound channel back to the sender, so failures are only logged.

use tracing::{debug, info, warn};

use inrelay_core::{InboundText, RelayError};
use inrelay_storage::SubscriptionStore;

/// A recognized subscription command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe { name: String, token: String },
    Unsubscribe { name: Option<String> },
}

/// Parse a text body into a command, if it is one.
pub fn parse_command(body: &str) -> Option<Command> {
    let parts: Vec<&str> = body.split_whitespace().collect();
    let keyword = parts.first()?.to_lowercase();
    match keyword.as_str() {
        // Exactly three tokens; extra words disqualify the command so that
        // a sentence starting with "sub" is not misread.
        "sub" if parts.len() == 3 => Some(Command::Subscribe {
            name: parts[1].to_string(),
            token: parts[2].to_string(),
        }),
        "unsub" => Some(Command::Unsubscribe {
            name: parts.get(1).map(|s| s.to_string()),
        }),
        _ => None,
    }
}

/// Watches inbound texts and applies subscription commands to the store.
pub struct AckMonitor {
    store: SubscriptionStore,
}

impl AckMonitor {
    pub fn new(store: SubscriptionStore) -> Self {
        Self { store }
    }

    /// Handle one inbound text. Never fails on unrecognized content; only
    /// storage-level errors propagate (the caller aborts the poll cycle).
    pub async fn handle_text(&self, text: &InboundText) -> Result<(), RelayError> {
        let Some(command) = parse_command(&text.body) else {
            return Ok(());
        };

        match command {
            Command::Subscribe { name, token } => {
                match self.store.activate(&text.source_phone, &name, &token).await {
                    Ok(sub) => {
                        info!(
                            source_phone = text.source_phone.as_str(),
                            name = sub.name.as_str(),
                            "subscription activated"
                        );
                        Ok(())
                    }
                    Err(RelayError::NotFound) => {
                        // Wrong token, wrong name, or a replay; nothing to
                        // tell the sender.
                        debug!(
                            source_phone = text.source_phone.as_str(),
                            name = name.as_str(),
                            "activation attempt did not match a pending subscription"
                        );
                        Ok(())
                    }
                    Err(e) => {
                        warn!(error = %e, "activation failed");
                        Err(e)
                    }
                }
            }
            Command::Unsubscribe { name } => {
                let revoked = self
                    .store
                    .revoke_by_name(&text.source_phone, name.as_deref())
                    .await?;
                info!(
                    source_phone = text.source_phone.as_str(),
                    name = name.as_deref().unwrap_or("<all>"),
                    revoked,
                    "unsubscribe processed"
                );
                Ok(())
            }
        }
    }
}
