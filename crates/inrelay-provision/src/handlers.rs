// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the provisioning API.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use inrelay_core::{Destination, RelayError};

use crate::server::ProvisionState;

/// Request body for POST /provision.
#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    /// Subscription label; becomes the caption routing word and part of the
    /// SMS command.
    pub name: String,
    /// Phone number whose media should be relayed.
    pub source_phone: String,
    /// "webhook" or "email".
    pub destination_kind: String,
    #[serde(default)]
    pub destination_params: DestinationParams,
}

/// Kind-specific destination fields; unused ones stay empty.
#[derive(Debug, Default, Deserialize)]
pub struct DestinationParams {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
}

/// Response body for POST /provision.
#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    /// Subscription id.
    pub id: String,
    /// Single-use acknowledgment token.
    pub ack_token: String,
    /// The literal text the source phone must send to activate.
    pub instructions: String,
    /// False when an existing (phone, name) record was reset instead.
    pub created: bool,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body; `error` is a machine-readable snake_case reason.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn build_destination(req: &ProvisionRequest) -> Result<Destination, RelayError> {
    match req.destination_kind.as_str() {
        "webhook" => Ok(Destination::Webhook {
            url: req.destination_params.url.clone().unwrap_or_default(),
            bearer_token: req
                .destination_params
                .bearer_token
                .clone()
                .unwrap_or_default(),
        }),
        "email" => Ok(Destination::Email {
            addresses: req.destination_params.addresses.clone().unwrap_or_default(),
        }),
        _ => Err(RelayError::validation("unknown_destination_kind")),
    }
}

/// POST /provision
///
/// Creates (or resets) a pending subscription and returns the acknowledgment
/// command the end user must send from the source phone.
pub async fn post_provision(
    State(state): State<ProvisionState>,
    Json(body): Json<ProvisionRequest>,
) -> Response {
    let destination = match build_destination(&body) {
        Ok(dest) => dest,
        Err(e) => return validation_response(e),
    };

    // Email destinations are useless without a configured SMTP relay;
    // reject up front rather than at first dispatch.
    if matches!(destination, Destination::Email { .. }) && !state.email_enabled {
        return validation_response(RelayError::validation("email_not_configured"));
    }

    match state
        .store
        .create_pending(&body.name, &body.source_phone, destination)
        .await
    {
        Ok(provisioned) => {
            info!(
                source_phone = body.source_phone.as_str(),
                name = body.name.as_str(),
                created = provisioned.created,
                "provisioning request accepted"
            );
            let status = if provisioned.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let response = ProvisionResponse {
                id: provisioned.subscription.id.clone(),
                ack_token: provisioned.subscription.ack_token.clone(),
                instructions: provisioned.subscription.ack_command(),
                created: provisioned.created,
            };
            (status, Json(response)).into_response()
        }
        Err(e @ RelayError::Validation { .. }) => validation_response(e),
        Err(e) => {
            error!(error = %e, "provisioning request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn validation_response(e: RelayError) -> Response {
    let reason = match e {
        RelayError::Validation { reason } => reason,
        other => other.to_string(),
    };
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: reason }),
    )
        .into_response()
}

/// GET /health
///
/// Unauthenticated liveness probe.
pub async fn get_health(State(state): State<ProvisionState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
