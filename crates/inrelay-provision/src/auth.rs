// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token middleware for the provisioning endpoint.
//!
//! When a secret is configured, `POST /provision` requires
//! `Authorization: Bearer <secret>`. Without one the endpoint stays open:
//! callers are assumed to be trusted operators, which is the documented
//! trust boundary of the provisioning surface.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Authentication configuration for the provisioning API.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected bearer secret. `None` disables the check.
    pub secret: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Middleware validating the provisioning bearer secret.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(ref expected) = auth.secret else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => {
            tracing::debug!("provisioning request rejected: bad or missing bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
