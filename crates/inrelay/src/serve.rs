// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `inrelay serve` command implementation.
//!
//! Wires the subscription store, messenger reader, delivery backends,
//! provisioning API, and bridge loop together, then runs until SIGINT or
//! SIGTERM.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use inrelay_bridge::{AckMonitor, BridgeLoop, Detector, Dispatcher};
use inrelay_config::RelayConfig;
use inrelay_core::{DeliveryBackend, Destination, MediaPayload, RelayError};
use inrelay_messenger::{MediaLocator, MessengerDb};
use inrelay_provision::{ProvisionState, ServerConfig};
use inrelay_smtp::SmtpBackend;
use inrelay_storage::SubscriptionStore;
use inrelay_webhook::WebhookBackend;

use crate::shutdown;

/// Stand-in email backend used when SMTP is not configured. Provisioning
/// rejects new email destinations in this mode; any legacy ones fail
/// permanently instead of retrying forever.
struct EmailDisabled;

#[async_trait]
impl DeliveryBackend for EmailDisabled {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(
        &self,
        _payload: &MediaPayload,
        _destination: &Destination,
    ) -> Result<(), RelayError> {
        Err(RelayError::PermanentDelivery {
            message: "email delivery is disabled (smtp not configured)".into(),
        })
    }
}

/// Runs the `inrelay serve` command.
pub async fn run_serve(config: RelayConfig) -> Result<(), RelayError> {
    init_tracing(&config.bridge.log_level);
    info!("starting inrelay serve");

    // The messenger surface is mandatory for the daemon.
    let messenger_db = config.messenger.db_path.as_deref().ok_or_else(|| {
        RelayError::Config("messenger.db_path must be set before `inrelay serve`".into())
    })?;
    let media_root = config.messenger.media_root.as_deref().ok_or_else(|| {
        RelayError::Config("messenger.media_root must be set before `inrelay serve`".into())
    })?;
    if !Path::new(messenger_db).is_file() {
        return Err(RelayError::Config(format!(
            "messenger database not found: {messenger_db}"
        )));
    }
    if !Path::new(media_root).is_dir() {
        return Err(RelayError::Config(format!(
            "messenger media root not found: {media_root}"
        )));
    }

    if config.provision.enabled {
        match &config.provision.secret {
            None => warn!(
                "provisioning endpoint has no secret configured; \
                 anyone who can reach it can request subscriptions"
            ),
            Some(secret) if secret.len() < 16 => {
                warn!("provision.secret is weak (< 16 chars) -- set a stronger value")
            }
            _ => {}
        }
    }

    // Relay-owned state.
    let store = SubscriptionStore::open(&config.storage.database_path).await?;
    info!(
        database = config.storage.database_path.as_str(),
        "subscription store opened"
    );

    // Delivery backends.
    let webhook: Arc<dyn DeliveryBackend> = Arc::new(WebhookBackend::new(&config.delivery)?);
    let email: Arc<dyn DeliveryBackend> = if config.smtp.is_configured() {
        info!(
            host = config.smtp.host.as_deref().unwrap_or_default(),
            port = config.smtp.port,
            "smtp relay configured"
        );
        Arc::new(SmtpBackend::new(&config.smtp, &config.delivery)?)
    } else {
        info!("smtp not configured; email destinations disabled");
        Arc::new(EmailDisabled)
    };

    // Messenger surface + bridge loop.
    let messenger = MessengerDb::open(messenger_db).await?;
    let locator = MediaLocator::new(media_root, config.messenger.media_exts.clone());
    let detector = Detector::new(
        messenger,
        locator,
        store.clone(),
        AckMonitor::new(store.clone()),
        config.bridge.tail_limit,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        webhook,
        email,
        config.delivery.clone(),
        config.routing.clone(),
    ));
    let mut bridge = BridgeLoop::new(
        detector,
        dispatcher,
        store.clone(),
        Duration::from_secs(config.bridge.poll_interval_secs),
    );
    bridge.bootstrap(config.bridge.boot_dump).await?;

    // Install signal handler.
    let cancel = shutdown::install_signal_handler();

    // Provisioning API task.
    let provision_handle = if config.provision.enabled {
        let server_config = ServerConfig {
            bind: config.provision.bind.clone(),
            port: config.provision.port,
            secret: config.provision.secret.clone(),
        };
        let listener = inrelay_provision::bind(&server_config).await?;
        let state = ProvisionState {
            store: store.clone(),
            email_enabled: config.smtp.is_configured(),
            start_time: std::time::Instant::now(),
        };
        let server_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                result = inrelay_provision::serve_on(listener, &server_config, state) => {
                    if let Err(e) = result {
                        error!(error = %e, "provisioning server exited");
                    }
                }
                _ = server_cancel.cancelled() => {
                    info!("provisioning server shutting down");
                }
            }
        }))
    } else {
        info!("provisioning API disabled by configuration");
        None
    };

    // Main loop blocks until a shutdown signal.
    bridge.run(cancel).await;

    // Let in-flight dispatch tasks finish before releasing the store.
    bridge.drain().await;
    if let Some(handle) = provision_handle {
        handle.abort();
    }
    store.close().await?;

    info!("inrelay serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("inrelay={log_level},warn")));

    // try_init: `status` after a failed `serve` in the same process (and
    // tests) must not panic on double initialization.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serve_refuses_to_start_without_messenger_paths() {
        let config = RelayConfig::default();
        let result = run_serve(config).await;
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[tokio::test]
    async fn disabled_email_backend_fails_permanently() {
        let backend = EmailDisabled;
        let payload = MediaPayload {
            file_path: std::path::PathBuf::from("/x.jpg"),
            filename: "x.jpg".into(),
            mime_type: "image/jpeg".into(),
            caption: String::new(),
            idempotency_key: "msg:1:att:a".into(),
            source_phone: "+1".into(),
            message_id: 1,
            thread_id: 1,
            attachment_id: "a".into(),
            sent_time: 0,
            latitude: None,
            longitude: None,
            altitude: None,
        };
        let result = backend
            .deliver(
                &payload,
                &Destination::Email {
                    addresses: vec!["a@example.org".into()],
                },
            )
            .await;
        assert!(matches!(result, Err(RelayError::PermanentDelivery { .. })));
    }
}
