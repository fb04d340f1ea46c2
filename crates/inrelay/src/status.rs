// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `inrelay status` command implementation.
//!
//! Probes the provisioning health endpoint for daemon liveness and reads
//! subscription counts straight from the relay database. Falls back
//! gracefully when the daemon is not running.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use inrelay_config::RelayConfig;
use inrelay_core::RelayError;
use inrelay_storage::SubscriptionStore;

/// Health endpoint response from the provisioning API.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub uptime_secs: Option<u64>,
    pub pending_subscriptions: i64,
    pub active_subscriptions: i64,
    pub revoked_subscriptions: i64,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Run the `inrelay status` command.
pub async fn run_status(config: &RelayConfig, json: bool) -> Result<(), RelayError> {
    let url = format!(
        "http://{}:{}/health",
        config.provision.bind, config.provision.port
    );
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| RelayError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => resp.json::<HealthResponse>().await.ok(),
        _ => None,
    };

    // Subscription counts come straight from the database; WAL mode allows
    // this read while the daemon holds the writer.
    let store = SubscriptionStore::open(&config.storage.database_path).await?;
    let (pending, active, revoked) = store.counts().await?;
    store.close().await?;

    if json {
        let response = StatusResponse {
            running: health.is_some(),
            status: health
                .as_ref()
                .map(|h| h.status.clone())
                .unwrap_or_else(|| "not running".to_string()),
            uptime_secs: health.as_ref().map(|h| h.uptime_secs),
            pending_subscriptions: pending,
            active_subscriptions: active,
            revoked_subscriptions: revoked,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }

    match health {
        Some(h) => {
            println!("inrelay: {} (up {})", h.status, format_uptime(h.uptime_secs));
        }
        None => {
            println!("inrelay: not running (no daemon at {url})");
        }
    }
    println!("subscriptions: {active} active, {pending} pending, {revoked} revoked");
    Ok(())
}
