// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing resolver: maps a media event onto its destination set.
//!
//! The first whitespace-delimited word of the caption may name one of the
//! sender's active subscriptions; if it does, only that subscription receives
//! the item and the routing word is stripped from the forwarded caption
//! (configurable). Otherwise the event fans out to all active subscriptions.
//! Matching is exact-token and case-insensitive: a caption whose first word
//! merely starts with a subscription name does not match.

use inrelay_config::model::RoutingConfig;
use inrelay_core::Subscription;

/// Reserved subscription id for the configured catch-all destination.
pub const CATCH_ALL_ID: &str = "catch-all";

/// Where one media event should go.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Sender has no active subscriptions and no catch-all is configured.
    Drop,
    /// Sender has no active subscriptions; forward to the catch-all webhook.
    CatchAll { caption: String },
    /// Deliver to the given subscriptions with the given caption.
    Deliver {
        targets: Vec<Subscription>,
        caption: String,
    },
}

/// Split off the first whitespace-delimited word.
fn split_first_word(s: &str) -> Option<(&str, &str)> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => Some((first, rest.trim_start())),
        None => Some((trimmed, "")),
    }
}

/// Resolve the destination set for a caption against the sender's active
/// subscriptions.
pub fn resolve(caption: &str, active: Vec<Subscription>, config: &RoutingConfig) -> RouteDecision {
    if active.is_empty() {
        return if config.catch_all_webhook_url.is_some() {
            RouteDecision::CatchAll {
                caption: caption.trim().to_string(),
            }
        } else {
            RouteDecision::Drop
        };
    }

    if config.caption_targeting
        && let Some((first, rest)) = split_first_word(caption)
    {
        let matched = active
            .iter()
            .position(|sub| sub.name.eq_ignore_ascii_case(first));
        if let Some(idx) = matched {
            let mut active = active;
            let target = active.swap_remove(idx);
            let caption = if config.strip_target_word {
                rest.to_string()
            } else {
                caption.trim().to_string()
            };
            return RouteDecision::Deliver {
                targets: vec![target],
                caption,
            };
        }
    }

    RouteDecision::Deliver {
        targets: active,
        caption: caption.trim().to_string(),
    }
}
