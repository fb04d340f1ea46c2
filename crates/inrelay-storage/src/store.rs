// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! High-level facade over the relay database.
//!
//! The store is the single writer for subscription records: the provisioning
//! API and the acknowledgment monitor both go through it and never touch
//! persisted state directly. The detector owns the event ledger through the
//! same handle.

use inrelay_core::{
    DeliveryRecord, DeliveryStatus, Destination, EventState, MediaEvent, RelayError,
    Subscription, SubscriptionStatus, validate,
};
use rand::Rng;
use tracing::info;

use crate::database::Database;
use crate::queries;

/// Ack tokens avoid glyphs that are ambiguous when read off a small device
/// screen (0/O, 1/I/L).
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const TOKEN_LEN: usize = 6;

fn generate_ack_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Outcome of a provisioning request.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub subscription: Subscription,
    /// False when an existing `(phone, name)` record was reset instead.
    pub created: bool,
}

/// Durable mapping from phone number to subscriptions, plus the seen-events
/// ledger and per-destination delivery state.
#[derive(Clone)]
pub struct SubscriptionStore {
    db: Database,
}

impl SubscriptionStore {
    /// Open the store at the given database path, running migrations.
    pub async fn open(database_path: &str) -> Result<Self, RelayError> {
        let db = Database::open(database_path).await?;
        Ok(Self { db })
    }

    /// Wrap an already-open database handle.
    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Subscription lifecycle ---

    /// Create a pending subscription with a freshly generated ack token.
    ///
    /// Re-provisioning an existing `(source_phone, name)` pair resets the
    /// record to pending and rotates its token; the old token can no longer
    /// activate anything.
    pub async fn create_pending(
        &self,
        name: &str,
        source_phone: &str,
        destination: Destination,
    ) -> Result<Provisioned, RelayError> {
        validate::validate_name(name)?;
        validate::validate_phone(source_phone)?;
        validate::validate_destination(&destination)?;

        let sub = Subscription {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            source_phone: source_phone.to_string(),
            destination,
            ack_token: generate_ack_token(),
            status: SubscriptionStatus::Pending,
            created_at: chrono::Utc::now().to_rfc3339(),
            activated_at: None,
        };

        let (subscription, created) = queries::subscriptions::upsert_pending(&self.db, &sub).await?;
        info!(
            source_phone = subscription.source_phone.as_str(),
            name = subscription.name.as_str(),
            created,
            "pending subscription stored"
        );
        Ok(Provisioned {
            subscription,
            created,
        })
    }

    /// Consume an ack token and promote the matching pending subscription.
    ///
    /// Any mismatch (phone, name, token, or a token already consumed)
    /// yields [`RelayError::NotFound`] without revealing which part was
    /// wrong. The read-modify-write is a single SQL UPDATE, so two racing
    /// activations cannot both consume one token.
    pub async fn activate(
        &self,
        source_phone: &str,
        name: &str,
        token: &str,
    ) -> Result<Subscription, RelayError> {
        queries::subscriptions::activate(&self.db, source_phone, name, token)
            .await?
            .ok_or(RelayError::NotFound)
    }

    /// Active subscriptions for a sender (empty if none).
    pub async fn active_subscriptions_for(
        &self,
        source_phone: &str,
    ) -> Result<Vec<Subscription>, RelayError> {
        queries::subscriptions::active_for(&self.db, source_phone).await
    }

    /// Fetch a subscription by id.
    pub async fn subscription(&self, id: &str) -> Result<Option<Subscription>, RelayError> {
        queries::subscriptions::get(&self.db, id).await
    }

    /// Revoke a subscription by id.
    pub async fn revoke(&self, id: &str) -> Result<(), RelayError> {
        if queries::subscriptions::revoke(&self.db, id).await? {
            Ok(())
        } else {
            Err(RelayError::NotFound)
        }
    }

    /// Revoke one named subscription of a sender, or all of them.
    /// Returns the number revoked; zero is not an error.
    pub async fn revoke_by_name(
        &self,
        source_phone: &str,
        name: Option<&str>,
    ) -> Result<usize, RelayError> {
        queries::subscriptions::revoke_by_name(&self.db, source_phone, name).await
    }

    /// `(pending, active, revoked)` totals for operator reporting.
    pub async fn counts(&self) -> Result<(i64, i64, i64), RelayError> {
        queries::subscriptions::counts(&self.db).await
    }

    // --- Event ledger ---

    /// Record an event identity. Returns `true` only the first time a key is
    /// seen; the write happens before any delivery attempt.
    pub async fn record_event(&self, event: &MediaEvent) -> Result<bool, RelayError> {
        queries::events::record(&self.db, event).await
    }

    /// Whether an identity key is already in the ledger.
    pub async fn is_seen(&self, key: &str) -> Result<bool, RelayError> {
        queries::events::is_seen(&self.db, key).await
    }

    /// Events not yet in a terminal state (redelivery candidates).
    pub async fn unresolved_events(&self) -> Result<Vec<MediaEvent>, RelayError> {
        queries::events::unresolved(&self.db).await
    }

    /// Advance an event's ledger state.
    pub async fn set_event_state(&self, key: &str, state: EventState) -> Result<(), RelayError> {
        queries::events::set_state(&self.db, key, state).await
    }

    /// Current ledger state of an event.
    pub async fn event_state(&self, key: &str) -> Result<Option<EventState>, RelayError> {
        queries::events::get_state(&self.db, key).await
    }

    // --- Delivery records ---

    /// Ensure one pending delivery row per resolved destination.
    pub async fn init_deliveries(
        &self,
        event_key: &str,
        subscription_ids: &[String],
    ) -> Result<(), RelayError> {
        queries::deliveries::init(&self.db, event_key, subscription_ids).await
    }

    /// Delivery rows still awaiting success for an event.
    pub async fn pending_deliveries(
        &self,
        event_key: &str,
    ) -> Result<Vec<DeliveryRecord>, RelayError> {
        queries::deliveries::pending_for(&self.db, event_key).await
    }

    /// All delivery rows for an event.
    pub async fn delivery_records(
        &self,
        event_key: &str,
    ) -> Result<Vec<DeliveryRecord>, RelayError> {
        queries::deliveries::records_for(&self.db, event_key).await
    }

    /// Record the outcome of one delivery attempt.
    pub async fn record_delivery_attempt(
        &self,
        event_key: &str,
        subscription_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), RelayError> {
        queries::deliveries::record_attempt(&self.db, event_key, subscription_id, status).await
    }

    /// Whether every destination of the event has succeeded.
    pub async fn all_delivered(&self, event_key: &str) -> Result<bool, RelayError> {
        queries::deliveries::all_delivered(&self.db, event_key).await
    }

    /// Whether the event has a terminally failed destination.
    pub async fn any_delivery_failed(&self, event_key: &str) -> Result<bool, RelayError> {
        queries::deliveries::any_failed(&self.db, event_key).await
    }

    /// Checkpoint and release the database.
    pub async fn close(&self) -> Result<(), RelayError> {
        self.db.close().await
    }
}
