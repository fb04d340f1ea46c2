// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery backend trait for destination integrations (webhook, SMTP).

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::types::{Destination, MediaEvent, mime_for_path};

/// Everything a backend needs to deliver one media item to one destination.
///
/// Built once per event by the dispatcher and shared across the event's
/// destination fan-out; the file itself is read lazily by each backend.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub file_path: PathBuf,
    pub filename: String,
    pub mime_type: String,
    /// Caption after routing (the matched routing word may have been
    /// stripped).
    pub caption: String,
    /// `msg:<id>:att:<attachment>` -- forwarded so receivers can dedupe
    /// at-least-once redelivery.
    pub idempotency_key: String,
    pub source_phone: String,
    pub message_id: i64,
    pub thread_id: i64,
    pub attachment_id: String,
    /// Messenger-reported send time (unix seconds).
    pub sent_time: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

impl MediaPayload {
    /// Build a payload from a media event and the caption the routing
    /// resolver decided to forward.
    pub fn from_event(event: &MediaEvent, caption: String) -> Self {
        Self {
            file_path: event.file_path.clone(),
            filename: event.filename(),
            mime_type: mime_for_path(&event.file_path).to_string(),
            caption,
            idempotency_key: event.idempotency_key(),
            source_phone: event.source_phone.clone(),
            message_id: event.message_id,
            thread_id: event.thread_id,
            attachment_id: event.attachment_id.clone(),
            sent_time: event.sent_time,
            latitude: event.latitude,
            longitude: event.longitude,
            altitude: event.altitude,
        }
    }
}

/// Adapter for a destination kind.
///
/// Implementations must treat `deliver` as at-least-once: the dispatcher may
/// re-invoke it for the same payload after a crash or partial failure, and
/// receivers are expected to dedupe on the idempotency key.
#[async_trait]
pub trait DeliveryBackend: Send + Sync {
    /// Backend name, matching [`Destination::kind`].
    fn name(&self) -> &'static str;

    /// Deliver the payload to one destination.
    ///
    /// Errors are classified by the caller via [`RelayError::is_transient`]:
    /// transient failures are retried with backoff, permanent ones mark the
    /// destination failed.
    async fn deliver(
        &self,
        payload: &MediaPayload,
        destination: &Destination,
    ) -> Result<(), RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_from_event_derives_mime_and_keys() {
        let event = MediaEvent {
            key: "msg:7".into(),
            message_id: 7,
            thread_id: 3,
            attachment_id: "abc".into(),
            source_phone: "+1555".into(),
            caption: "cabin hello".into(),
            file_path: PathBuf::from("/media/high/abc.png"),
            sent_time: 1_700_000_000,
            first_seen_at: "2026-01-01T00:00:00Z".into(),
            latitude: Some(61.1),
            longitude: Some(8.5),
            altitude: None,
        };
        let payload = MediaPayload::from_event(&event, "hello".into());
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(payload.filename, "abc.png");
        assert_eq!(payload.idempotency_key, "msg:7:att:abc");
        assert_eq!(payload.caption, "hello");
        assert_eq!(payload.latitude, Some(61.1));
    }
}
