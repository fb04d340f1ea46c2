// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatcher: fan-out delivery with per-destination retry and deletion
//! gating.
//!
//! Destinations are resolved once per event and persisted as delivery rows;
//! later cycles re-attempt only the rows that have not succeeded. All
//! destinations of one event are sent concurrently, and the source file is
//! deleted only after a join over the outcomes shows every destination
//! delivered.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use inrelay_config::model::{DeliveryConfig, RoutingConfig};
use inrelay_core::{
    DeliveryBackend, DeliveryStatus, Destination, EventState, MediaEvent, MediaPayload,
    RelayError, Subscription, SubscriptionStatus,
};
use inrelay_storage::SubscriptionStore;

use crate::routing::{self, CATCH_ALL_ID, RouteDecision};

/// Terminal summary of one dispatch pass over an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every destination succeeded; the event is terminal.
    Delivered,
    /// Only terminally failed destinations remain; operator intervention.
    Failed,
    /// Unresolved destinations remain; the event is reconsidered next cycle.
    Retrying,
    /// No destinations resolved; the event is terminal without delivery.
    Dropped,
}

/// Delivers media events to their resolved destinations.
pub struct Dispatcher {
    store: SubscriptionStore,
    webhook: Arc<dyn DeliveryBackend>,
    email: Arc<dyn DeliveryBackend>,
    delivery: DeliveryConfig,
    routing: RoutingConfig,
    catch_all: Option<Subscription>,
}

impl Dispatcher {
    pub fn new(
        store: SubscriptionStore,
        webhook: Arc<dyn DeliveryBackend>,
        email: Arc<dyn DeliveryBackend>,
        delivery: DeliveryConfig,
        routing: RoutingConfig,
    ) -> Self {
        let catch_all = match (&routing.catch_all_webhook_url, &routing.catch_all_bearer_token) {
            (Some(url), Some(token)) => Some(Subscription {
                id: CATCH_ALL_ID.to_string(),
                name: CATCH_ALL_ID.to_string(),
                source_phone: String::new(),
                destination: Destination::Webhook {
                    url: url.clone(),
                    bearer_token: token.clone(),
                },
                ack_token: String::new(),
                status: SubscriptionStatus::Active,
                created_at: chrono::Utc::now().to_rfc3339(),
                activated_at: None,
            }),
            _ => None,
        };
        Self {
            store,
            webhook,
            email,
            delivery,
            routing,
            catch_all,
        }
    }

    /// Run one dispatch pass over an event.
    ///
    /// The event must already be in the ledger. Storage errors propagate;
    /// delivery failures are absorbed into per-destination state.
    pub async fn dispatch_event(&self, event: &MediaEvent) -> Result<DispatchOutcome, RelayError> {
        // Redelivery is only meaningful while the file exists.
        if !file_exists(&event.file_path).await {
            if self.store.all_delivered(&event.key).await? {
                self.store
                    .set_event_state(&event.key, EventState::Delivered)
                    .await?;
                return Ok(DispatchOutcome::Delivered);
            }
            warn!(
                key = event.key.as_str(),
                file = %event.file_path.display(),
                "media file disappeared with undelivered destinations"
            );
            self.store
                .set_event_state(&event.key, EventState::Failed)
                .await?;
            return Ok(DispatchOutcome::Failed);
        }

        let active = self
            .store
            .active_subscriptions_for(&event.source_phone)
            .await?;
        let decision = routing::resolve(&event.caption, active, &self.routing);

        // The first pass fixes the destination set; redelivery cycles reuse
        // the persisted rows, so destinations added or promoted later never
        // join an in-flight event. Drop is only terminal on the first pass:
        // an event whose rows already exist keeps its per-destination state
        // even if every subscription was revoked meanwhile.
        if self.store.delivery_records(&event.key).await?.is_empty() {
            let targets = match &decision {
                RouteDecision::Drop => None,
                RouteDecision::CatchAll { .. } => {
                    self.catch_all.as_ref().map(|c| vec![c.clone()])
                }
                RouteDecision::Deliver { targets, .. } => Some(targets.clone()),
            };
            match targets {
                Some(targets) => {
                    let ids: Vec<String> = targets.iter().map(|s| s.id.clone()).collect();
                    self.store.init_deliveries(&event.key, &ids).await?;
                }
                None => {
                    debug!(
                        key = event.key.as_str(),
                        source_phone = event.source_phone.as_str(),
                        "no active subscriptions, dropping event"
                    );
                    // Terminal without delivery; the file is left in place.
                    self.store
                        .set_event_state(&event.key, EventState::Delivered)
                        .await?;
                    return Ok(DispatchOutcome::Dropped);
                }
            }
        }

        let caption = match decision {
            RouteDecision::Deliver { caption, .. } | RouteDecision::CatchAll { caption } => caption,
            RouteDecision::Drop => event.caption.trim().to_string(),
        };

        let mut work = Vec::new();
        for record in self.store.pending_deliveries(&event.key).await? {
            if record.subscription_id == CATCH_ALL_ID {
                match &self.catch_all {
                    Some(catch_all) => work.push(catch_all.clone()),
                    None => {
                        self.store
                            .record_delivery_attempt(
                                &event.key,
                                &record.subscription_id,
                                DeliveryStatus::Failed,
                            )
                            .await?;
                    }
                }
                continue;
            }
            match self.store.subscription(&record.subscription_id).await? {
                Some(sub) if sub.status == SubscriptionStatus::Active => work.push(sub),
                _ => {
                    // Revoked (or deleted) while the event was in flight:
                    // permanent failure for this destination.
                    warn!(
                        key = event.key.as_str(),
                        subscription = record.subscription_id.as_str(),
                        "destination no longer active, marking failed"
                    );
                    self.store
                        .record_delivery_attempt(
                            &event.key,
                            &record.subscription_id,
                            DeliveryStatus::Failed,
                        )
                        .await?;
                }
            }
        }

        if !work.is_empty() {
            let payload = MediaPayload::from_event(event, caption);
            // Independent destinations, concurrent sends; one slow SMTP
            // session must not delay webhook delivery.
            let results = join_all(
                work.iter()
                    .map(|sub| self.deliver_with_retry(&payload, sub)),
            )
            .await;
            for (sub, status) in work.iter().zip(results) {
                self.store
                    .record_delivery_attempt(&event.key, &sub.id, status)
                    .await?;
            }
        }

        if self.store.all_delivered(&event.key).await? {
            if self.delivery.delete_on_success {
                self.delete_source_file(event).await;
            }
            self.store
                .set_event_state(&event.key, EventState::Delivered)
                .await?;
            Ok(DispatchOutcome::Delivered)
        } else if self.store.pending_deliveries(&event.key).await?.is_empty() {
            warn!(
                key = event.key.as_str(),
                "event has terminally failed destinations; file retained for operator"
            );
            self.store
                .set_event_state(&event.key, EventState::Failed)
                .await?;
            Ok(DispatchOutcome::Failed)
        } else {
            debug!(
                key = event.key.as_str(),
                "unresolved destinations remain, retrying next cycle"
            );
            Ok(DispatchOutcome::Retrying)
        }
    }

    /// One destination, bounded retries within this cycle.
    ///
    /// Returns the status to persist: `Delivered`, terminal `Failed`, or
    /// `Pending` when the backoff schedule is exhausted on transient errors.
    async fn deliver_with_retry(
        &self,
        payload: &MediaPayload,
        sub: &Subscription,
    ) -> DeliveryStatus {
        let backend = match sub.destination {
            Destination::Webhook { .. } => &self.webhook,
            Destination::Email { .. } => &self.email,
        };
        // Backends carry their own connect/read timeouts; this outer guard
        // bounds a hung connection that never surfaces one.
        let guard = Duration::from_secs(self.delivery.http_timeout_secs.saturating_add(5));

        let schedule = std::iter::once(0u64).chain(self.delivery.retry_backoff_secs.iter().copied());
        for (attempt, delay_secs) in schedule.enumerate() {
            if delay_secs > 0 {
                sleep(Duration::from_secs(delay_secs)).await;
            }
            let result = match timeout(guard, backend.deliver(payload, &sub.destination)).await {
                Ok(result) => result,
                Err(_) => Err(RelayError::Timeout { duration: guard }),
            };
            match result {
                Ok(()) => return DeliveryStatus::Delivered,
                Err(RelayError::DeliveryUnauthorized { status }) => {
                    warn!(
                        subscription = sub.id.as_str(),
                        name = sub.name.as_str(),
                        status,
                        "destination rejected credentials, revoking subscription"
                    );
                    if sub.id != CATCH_ALL_ID
                        && let Err(e) = self.store.revoke(&sub.id).await
                    {
                        warn!(error = %e, "failed to revoke unauthorized subscription");
                    }
                    return DeliveryStatus::Failed;
                }
                Err(e) if e.is_transient() => {
                    debug!(
                        subscription = sub.id.as_str(),
                        attempt,
                        error = %e,
                        "delivery attempt failed"
                    );
                }
                Err(e) => {
                    warn!(
                        subscription = sub.id.as_str(),
                        error = %e,
                        "permanent delivery failure"
                    );
                    return DeliveryStatus::Failed;
                }
            }
        }
        DeliveryStatus::Pending
    }

    /// Best-effort removal of the source file after full success.
    async fn delete_source_file(&self, event: &MediaEvent) {
        if self.delivery.delete_delay_secs > 0 {
            // Give the messenger UI a moment to release its file handle.
            sleep(Duration::from_secs(self.delivery.delete_delay_secs)).await;
        }
        match tokio::fs::remove_file(&event.file_path).await {
            Ok(()) => info!(
                key = event.key.as_str(),
                file = %event.file_path.display(),
                "deleted source media file"
            ),
            Err(e) => debug!(
                key = event.key.as_str(),
                error = %e,
                "source file delete failed (already gone?)"
            ),
        }
    }
}

async fn file_exists(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
