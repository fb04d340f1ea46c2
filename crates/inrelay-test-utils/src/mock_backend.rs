// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock delivery backend for deterministic testing.
//!
//! `MockBackend` implements `DeliveryBackend` with scripted outcomes and
//! captured deliveries for assertion in tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use inrelay_core::{DeliveryBackend, Destination, MediaPayload, RelayError};

/// A mock delivery backend.
///
/// Outcomes queued via [`MockBackend::push_outcome`] are consumed in order
/// by `deliver()`; once the queue is empty every delivery succeeds. Each
/// call is captured and retrievable via [`MockBackend::deliveries`].
pub struct MockBackend {
    name: &'static str,
    outcomes: Mutex<VecDeque<Result<(), RelayError>>>,
    deliveries: Mutex<Vec<(MediaPayload, Destination)>>,
}

impl MockBackend {
    /// Create a mock with the given backend name ("webhook" or "email").
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            outcomes: Mutex::new(VecDeque::new()),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome of the next delivery attempt.
    pub async fn push_outcome(&self, outcome: Result<(), RelayError>) {
        self.outcomes.lock().await.push_back(outcome);
    }

    /// All captured deliveries, in call order.
    pub async fn deliveries(&self) -> Vec<(MediaPayload, Destination)> {
        self.deliveries.lock().await.clone()
    }

    /// Number of delivery attempts observed.
    pub async fn delivery_count(&self) -> usize {
        self.deliveries.lock().await.len()
    }
}

#[async_trait]
impl DeliveryBackend for MockBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn deliver(
        &self,
        payload: &MediaPayload,
        destination: &Destination,
    ) -> Result<(), RelayError> {
        self.deliveries
            .lock()
            .await
            .push((payload.clone(), destination.clone()));
        self.outcomes.lock().await.pop_front().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn payload() -> MediaPayload {
        MediaPayload {
            file_path: PathBuf::from("/media/high/a.jpg"),
            filename: "a.jpg".into(),
            mime_type: "image/jpeg".into(),
            caption: "hi".into(),
            idempotency_key: "msg:1:att:a".into(),
            source_phone: "+1555".into(),
            message_id: 1,
            thread_id: 1,
            attachment_id: "a".into(),
            sent_time: 0,
            latitude: None,
            longitude: None,
            altitude: None,
        }
    }

    fn dest() -> Destination {
        Destination::Webhook {
            url: "https://example.org".into(),
            bearer_token: "t".into(),
        }
    }

    #[tokio::test]
    async fn outcomes_are_consumed_in_order_then_default_ok() {
        let backend = MockBackend::new("webhook");
        backend
            .push_outcome(Err(RelayError::TransientDelivery {
                message: "503".into(),
                source: None,
            }))
            .await;

        assert!(backend.deliver(&payload(), &dest()).await.is_err());
        assert!(backend.deliver(&payload(), &dest()).await.is_ok());
        assert_eq!(backend.delivery_count().await, 2);
    }

    #[tokio::test]
    async fn deliveries_capture_payload_and_destination() {
        let backend = MockBackend::new("email");
        backend.deliver(&payload(), &dest()).await.unwrap();

        let deliveries = backend.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0.caption, "hi");
        assert_eq!(deliveries[0].1, dest());
        assert_eq!(backend.name(), "email");
    }
}
