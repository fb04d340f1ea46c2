// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the inrelay workspace.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a subscription.
///
/// `pending` subscriptions hold a single-use acknowledgment token; only the
/// out-of-band `sub <name> <token>` reply from the source phone promotes them
/// to `active`. `revoked` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Revoked,
}

/// Per-destination delivery state for one media event.
///
/// `failed` is terminal (permanent error); a destination that merely
/// exhausted its backoff schedule stays `pending` and is reconsidered on the
/// next poll cycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

/// Terminal state of a media event in the seen-events ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Pending,
    Delivered,
    Failed,
}

/// A delivery sink: a Matrix-style webhook or an email recipient list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    Webhook { url: String, bearer_token: String },
    Email { addresses: Vec<String> },
}

impl Destination {
    /// Backend name this destination routes through.
    pub fn kind(&self) -> &'static str {
        match self {
            Destination::Webhook { .. } => "webhook",
            Destination::Email { .. } => "email",
        }
    }
}

/// A standing request to receive a sender's media at a named destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Stable identifier, generated at creation.
    pub id: String,
    /// Short label used for caption routing and the acknowledgment command.
    /// Unique per `source_phone` (case-insensitive).
    pub name: String,
    /// Phone number of the inReach user being subscribed to.
    pub source_phone: String,
    pub destination: Destination,
    /// Single-use token; only meaningful while `status` is `pending`.
    pub ack_token: String,
    pub status: SubscriptionStatus,
    /// RFC 3339.
    pub created_at: String,
    pub activated_at: Option<String>,
}

impl Subscription {
    /// The literal text the source phone must send to activate this
    /// subscription.
    pub fn ack_command(&self) -> String {
        format!("sub {} {}", self.name, self.ack_token)
    }
}

/// One detected arrival of a media file from a sender.
///
/// `key` is the deduplication identity across poll cycles; it is derived
/// from the messenger's message row id, which is stable across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEvent {
    /// Identity key, `msg:<message id>`.
    pub key: String,
    pub message_id: i64,
    pub thread_id: i64,
    pub attachment_id: String,
    pub source_phone: String,
    /// Raw caption text, possibly empty.
    pub caption: String,
    pub file_path: PathBuf,
    /// Messenger-reported send time (unix seconds).
    pub sent_time: i64,
    /// RFC 3339, relay-local.
    pub first_seen_at: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

impl MediaEvent {
    /// Ledger/dedup key for a messenger message id.
    pub fn key_for(message_id: i64) -> String {
        format!("msg:{message_id}")
    }

    /// Idempotency key forwarded to webhook destinations.
    pub fn idempotency_key(&self) -> String {
        format!("msg:{}:att:{}", self.message_id, self.attachment_id)
    }

    /// Filename component of the media path.
    pub fn filename(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.attachment_id.clone())
    }
}

/// An inbound text reply observed on the relay's receiving number.
///
/// Consumed only by the acknowledgment monitor; never persisted.
#[derive(Debug, Clone)]
pub struct InboundText {
    pub source_phone: String,
    pub body: String,
    /// Unix seconds, as reported by the messenger.
    pub received_at: i64,
}

/// Per-destination delivery state row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub event_key: String,
    pub subscription_id: String,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub updated_at: String,
}

/// Guess the MIME type of a media file from its extension.
///
/// The messenger only produces the extensions in this table; anything else
/// falls back to octet-stream.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("avif") => "image/avif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("mp4") => "video/mp4",
        Some("m4a") => "audio/mp4",
        _ => "application/octet-stream",
    }
}
