// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matrix-style webhook delivery backend.
//!
//! Posts one JSON document per media item, authenticated with the
//! subscription's bearer token and carrying an `Idempotency-Key` header so
//! receivers can dedupe at-least-once redelivery. Receivers that already
//! processed the key answer 409, which counts as success.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use tracing::{debug, info, warn};

use inrelay_config::model::DeliveryConfig;
use inrelay_core::{DeliveryBackend, Destination, MediaPayload, RelayError};

/// Webhook payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Embed the file as base64 (default; works across hosts).
    Base64,
    /// Send a `file://` reference for receivers co-located with the media
    /// directory.
    FileUrl,
}

impl ForwardMode {
    fn from_config(mode: &str) -> Self {
        match mode {
            "file_url" => ForwardMode::FileUrl,
            _ => ForwardMode::Base64,
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookBody {
    filename: String,
    mimetype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_b64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    caption: String,
}

/// Webhook implementation of [`DeliveryBackend`].
pub struct WebhookBackend {
    client: reqwest::Client,
    forward_mode: ForwardMode,
    timeout: std::time::Duration,
}

impl WebhookBackend {
    /// Build the backend with the configured send timeout and payload mode.
    pub fn new(config: &DeliveryConfig) -> Result<Self, RelayError> {
        let timeout = std::time::Duration::from_secs(config.http_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            forward_mode: ForwardMode::from_config(&config.forward_mode),
            timeout,
        })
    }

    async fn build_body(&self, payload: &MediaPayload) -> Result<WebhookBody, RelayError> {
        let (data_b64, url) = match self.forward_mode {
            ForwardMode::Base64 => {
                let raw = tokio::fs::read(&payload.file_path).await.map_err(|e| {
                    // The file can disappear between resolution and read
                    // (messenger cleanup); let the next cycle re-decide.
                    RelayError::TransientDelivery {
                        message: format!(
                            "failed to read {}: {e}",
                            payload.file_path.display()
                        ),
                        source: Some(Box::new(e)),
                    }
                })?;
                (Some(BASE64.encode(raw)), None)
            }
            ForwardMode::FileUrl => (
                None,
                Some(format!("file://{}", payload.file_path.display())),
            ),
        };
        Ok(WebhookBody {
            filename: payload.filename.clone(),
            mimetype: payload.mime_type.clone(),
            data_b64,
            url,
            caption: payload.caption.clone(),
        })
    }
}

#[async_trait]
impl DeliveryBackend for WebhookBackend {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(
        &self,
        payload: &MediaPayload,
        destination: &Destination,
    ) -> Result<(), RelayError> {
        let Destination::Webhook { url, bearer_token } = destination else {
            return Err(RelayError::Internal(format!(
                "webhook backend handed a {} destination",
                destination.kind()
            )));
        };

        let body = self.build_body(payload).await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(bearer_token)
            .header("Idempotency-Key", &payload.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    RelayError::TransientDelivery {
                        message: format!("POST {url} failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {
                info!(
                    status = status.as_u16(),
                    url = url.as_str(),
                    key = payload.idempotency_key.as_str(),
                    "webhook delivered"
                );
                Ok(())
            }
            409 => {
                // Receiver already has this idempotency key.
                debug!(url = url.as_str(), "webhook 409 duplicate, treating as delivered");
                Ok(())
            }
            401 | 403 => {
                warn!(status = status.as_u16(), url = url.as_str(), "webhook auth rejected");
                Err(RelayError::DeliveryUnauthorized {
                    status: status.as_u16(),
                })
            }
            _ => Err(RelayError::TransientDelivery {
                message: format!("POST {url} returned {status}"),
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(file_path: PathBuf) -> MediaPayload {
        MediaPayload {
            file_path,
            filename: "att-1.jpg".into(),
            mime_type: "image/jpeg".into(),
            caption: "look at this".into(),
            idempotency_key: "msg:7:att:att-1".into(),
            source_phone: "+1555".into(),
            message_id: 7,
            thread_id: 1,
            attachment_id: "att-1".into(),
            sent_time: 1_700_000_000,
            latitude: None,
            longitude: None,
            altitude: None,
        }
    }

    fn config(timeout_secs: u64, mode: &str) -> DeliveryConfig {
        DeliveryConfig {
            forward_mode: mode.into(),
            http_timeout_secs: timeout_secs,
            ..DeliveryConfig::default()
        }
    }

    fn webhook_dest(server: &MockServer) -> Destination {
        Destination::Webhook {
            url: format!("{}/hook", server.uri()),
            bearer_token: "secret-token".into(),
        }
    }

    #[tokio::test]
    async fn posts_base64_body_with_auth_and_idempotency_headers() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("att-1.jpg");
        std::fs::write(&file, b"jpeg-bytes").unwrap();

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("authorization", "Bearer secret-token"))
            .and(header("idempotency-key", "msg:7:att:att-1"))
            .and(body_partial_json(serde_json::json!({
                "filename": "att-1.jpg",
                "mimetype": "image/jpeg",
                "data_b64": BASE64.encode(b"jpeg-bytes"),
                "caption": "look at this",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let backend = WebhookBackend::new(&config(5, "base64")).unwrap();
        backend
            .deliver(&payload(file), &webhook_dest(&server))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn file_url_mode_references_instead_of_embedding() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "url": "file:///media/high/att-1.jpg",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        // file_url mode never reads the file, so a nonexistent path is fine.
        let backend = WebhookBackend::new(&config(5, "file_url")).unwrap();
        backend
            .deliver(
                &payload(PathBuf::from("/media/high/att-1.jpg")),
                &webhook_dest(&server),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_409_counts_as_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let backend = WebhookBackend::new(&config(5, "file_url")).unwrap();
        let result = backend
            .deliver(&payload(PathBuf::from("/x.jpg")), &webhook_dest(&server))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn auth_failure_is_unauthorized_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = WebhookBackend::new(&config(5, "file_url")).unwrap();
        let result = backend
            .deliver(&payload(PathBuf::from("/x.jpg")), &webhook_dest(&server))
            .await;
        match result {
            Err(RelayError::DeliveryUnauthorized { status }) => assert_eq!(status, 401),
            other => panic!("expected DeliveryUnauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = WebhookBackend::new(&config(5, "file_url")).unwrap();
        let err = backend
            .deliver(&payload(PathBuf::from("/x.jpg")), &webhook_dest(&server))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "503 should be retryable, got {err:?}");
    }

    #[tokio::test]
    async fn slow_receiver_times_out_as_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let backend = WebhookBackend::new(&config(1, "file_url")).unwrap();
        let err = backend
            .deliver(&payload(PathBuf::from("/x.jpg")), &webhook_dest(&server))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "timeout should be retryable, got {err:?}");
    }

    #[tokio::test]
    async fn missing_file_in_base64_mode_is_transient() {
        let server = MockServer::start().await;
        let backend = WebhookBackend::new(&config(5, "base64")).unwrap();
        let err = backend
            .deliver(
                &payload(PathBuf::from("/nonexistent/file.jpg")),
                &webhook_dest(&server),
            )
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn email_destination_is_rejected() {
        let backend = WebhookBackend::new(&config(5, "base64")).unwrap();
        let result = backend
            .deliver(
                &payload(PathBuf::from("/x.jpg")),
                &Destination::Email {
                    addresses: vec!["a@example.org".into()],
                },
            )
            .await;
        assert!(matches!(result, Err(RelayError::Internal(_))));
    }
}
