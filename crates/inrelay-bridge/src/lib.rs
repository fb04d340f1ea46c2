// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription & dispatch engine for the inrelay bridge.
//!
//! Wires the detector, acknowledgment monitor, routing resolver, and
//! dispatcher into a single polling loop:
//!
//! detector -> routing resolver (reads the subscription store) -> dispatcher
//! -> source file deleted on terminal success. Inbound texts branch off to
//! the acknowledgment monitor, which promotes pending subscriptions.

pub mod commands;
pub mod detector;
pub mod dispatch;
pub mod routing;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use inrelay_core::{MediaEvent, RelayError};
use inrelay_storage::SubscriptionStore;

pub use commands::{AckMonitor, Command, parse_command};
pub use detector::Detector;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use routing::{CATCH_ALL_ID, RouteDecision, resolve};

/// The main polling loop: one logical detector task that fans dispatch out
/// into per-event tasks.
///
/// Dispatch runs concurrently with subsequent detection cycles; the shared
/// in-flight set keeps a cycle from re-invoking dispatch for an identity a
/// previous cycle is still delivering.
pub struct BridgeLoop {
    detector: Detector,
    dispatcher: Arc<Dispatcher>,
    store: SubscriptionStore,
    poll_interval: std::time::Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl BridgeLoop {
    pub fn new(
        detector: Detector,
        dispatcher: Arc<Dispatcher>,
        store: SubscriptionStore,
        poll_interval: std::time::Duration,
    ) -> Self {
        Self {
            detector,
            dispatcher,
            store,
            poll_interval,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Initialize the detector (see [`Detector::bootstrap`]).
    pub async fn bootstrap(&mut self, boot_dump: i64) -> Result<(), RelayError> {
        self.detector.bootstrap(boot_dump).await
    }

    /// Run until cancelled.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "bridge loop running"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = cancel.cancelled() => {
                    info!("bridge loop shutting down");
                    break;
                }
            }
        }
    }

    /// One detection pass plus dispatch fan-out. Public so integration tests
    /// (and operators via `status`) can drive the loop deterministically.
    pub async fn run_cycle(&mut self) {
        // Detection: a failure aborts the whole cycle; nothing partial is
        // committed and the next interval retries.
        let fresh = match self.detector.poll_cycle().await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "poll cycle aborted");
                return;
            }
        };

        // Redelivery candidates: ledger events that never reached a terminal
        // state (crash recovery, earlier partial failures).
        let mut batch = fresh;
        match self.store.unresolved_events().await {
            Ok(unresolved) => {
                let fresh_keys: HashSet<String> = batch.iter().map(|e| e.key.clone()).collect();
                batch.extend(
                    unresolved
                        .into_iter()
                        .filter(|e| !fresh_keys.contains(&e.key)),
                );
            }
            Err(e) => warn!(error = %e, "failed to load unresolved events"),
        }

        for event in batch {
            self.spawn_dispatch(event).await;
        }
    }

    async fn spawn_dispatch(&self, event: MediaEvent) {
        {
            let mut guard = self.in_flight.lock().await;
            if !guard.insert(event.key.clone()) {
                // Still dispatching from an earlier cycle.
                return;
            }
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            let key = event.key.clone();
            match dispatcher.dispatch_event(&event).await {
                Ok(outcome) => info!(key = key.as_str(), ?outcome, "dispatch finished"),
                Err(e) => warn!(key = key.as_str(), error = %e, "dispatch errored"),
            }
            in_flight.lock().await.remove(&key);
        });
    }

    /// Wait until no dispatch task is in flight. Test/shutdown helper.
    pub async fn drain(&self) {
        loop {
            if self.in_flight.lock().await.is_empty() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}
