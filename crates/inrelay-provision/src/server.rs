// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provisioning HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use inrelay_core::RelayError;
use inrelay_storage::SubscriptionStore;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct ProvisionState {
    /// Single-writer subscription store.
    pub store: SubscriptionStore,
    /// Whether email destinations can be provisioned (SMTP configured).
    pub email_enabled: bool,
    /// Process start time for uptime reporting.
    pub start_time: std::time::Instant,
}

/// Provisioning server configuration (mirrors ProvisionConfig from
/// inrelay-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Bearer secret; `None` leaves the endpoint open.
    pub secret: Option<String>,
}

/// Build the provisioning router.
///
/// - `GET /health` is public.
/// - `POST /provision` goes through the bearer middleware.
pub fn router(config: &ServerConfig, state: ProvisionState) -> Router {
    let auth_state = AuthConfig {
        secret: config.secret.clone(),
    };

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/provision", post(handlers::post_provision))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// Bind the configured address. Exposed separately so callers (and tests)
/// can learn the bound port before serving.
pub async fn bind(config: &ServerConfig) -> Result<tokio::net::TcpListener, RelayError> {
    let addr = format!("{}:{}", config.bind, config.port);
    tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RelayError::Config(format!("failed to bind provisioning API to {addr}: {e}")))
}

/// Serve the provisioning API on an already-bound listener until the task is
/// cancelled or the server errors.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    config: &ServerConfig,
    state: ProvisionState,
) -> Result<(), RelayError> {
    let app = router(config, state);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("provisioning API listening on {addr}");
    }
    axum::serve(listener, app)
        .await
        .map_err(|e| RelayError::Internal(format!("provisioning server error: {e}")))
}
