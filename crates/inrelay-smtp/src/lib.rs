// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email delivery backend via SMTP.
//!
//! Sends one message per media item with the file attached and a plain-text
//! body carrying sender, caption, location (with an OpenStreetMap link), and
//! provenance. Messages from the same messenger thread share References
//! headers so mail clients group them into a conversation.

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use inrelay_config::model::{DeliveryConfig, SmtpConfig};
use inrelay_core::{DeliveryBackend, Destination, MediaPayload, RelayError};

const MAP_ZOOM: u32 = 14;
// OpenTopoMap layer code.
const MAP_LAYER: &str = "P";

/// SMTP implementation of [`DeliveryBackend`].
pub struct SmtpBackend {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    max_attach_bytes: u64,
}

impl SmtpBackend {
    /// Build the backend from the SMTP and delivery sections of the config.
    ///
    /// Fails with [`RelayError::Config`] when `smtp.host`/`smtp.from` are
    /// missing; callers should only construct the backend when
    /// [`SmtpConfig::is_configured`] holds.
    pub fn new(smtp: &SmtpConfig, delivery: &DeliveryConfig) -> Result<Self, RelayError> {
        let host = smtp
            .host
            .as_deref()
            .ok_or_else(|| RelayError::Config("smtp.host is required for email delivery".into()))?;
        let from = smtp
            .from
            .as_deref()
            .ok_or_else(|| RelayError::Config("smtp.from is required for email delivery".into()))?
            .parse::<Mailbox>()
            .map_err(|e| RelayError::Config(format!("smtp.from is not a valid mailbox: {e}")))?;

        let mut builder = if smtp.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| RelayError::Config(format!("invalid smtp.host `{host}`: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        builder = builder
            .port(smtp.port)
            .timeout(Some(std::time::Duration::from_secs(
                delivery.http_timeout_secs,
            )));
        if let (Some(user), Some(pass)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            max_attach_bytes: delivery.max_attach_mb * 1024 * 1024,
        })
    }
}

/// `[InReach] <phone> • <local time> • <filename>`
fn subject(payload: &MediaPayload) -> String {
    format!(
        "[InReach] {} \u{2022} {} \u{2022} {}",
        payload.source_phone,
        format_sent_local(payload.sent_time),
        payload.filename
    )
}

fn format_sent_local(sent_time: i64) -> String {
    match Local.timestamp_opt(sent_time, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => sent_time.to_string(),
    }
}

/// OpenStreetMap link centered on the reported position.
fn osm_url(lat: f64, lon: f64) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={lat:.6}&mlon={lon:.6}\
         #map={MAP_ZOOM}/{lat:.6}/{lon:.6}&layers={MAP_LAYER}"
    )
}

fn body_text(payload: &MediaPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "From: {}",
        if payload.source_phone.is_empty() {
            "(unknown)"
        } else {
            &payload.source_phone
        }
    ));
    lines.push(format!(
        "Caption: {}",
        if payload.caption.is_empty() {
            "(empty)"
        } else {
            &payload.caption
        }
    ));
    if let (Some(lat), Some(lon)) = (payload.latitude, payload.longitude) {
        lines.push(format!("Location: {lat:.6}, {lon:.6}"));
        lines.push(format!("Map: {}", osm_url(lat, lon)));
    }
    if let Some(alt) = payload.altitude {
        lines.push(format!("Altitude: {alt:.1} m"));
    }
    lines.push(format!("Sent: {}", format_sent_local(payload.sent_time)));
    lines.push(format!("Message ID: {}", payload.message_id));
    lines.push(format!("Attachment: {}", payload.filename));
    lines.push(
        "Note: the messenger may delay secondary attachments. \
         Send one file per message for best results."
            .to_string(),
    );
    lines.join("\n")
}

fn message_id(payload: &MediaPayload, domain: &str) -> String {
    format!(
        "<inreach-{}-{}@{}>",
        payload.message_id, payload.attachment_id, domain
    )
}

fn thread_ref(payload: &MediaPayload, domain: &str) -> String {
    format!("<inreach-thread-{}@{}>", payload.thread_id, domain)
}

#[async_trait]
impl DeliveryBackend for SmtpBackend {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(
        &self,
        payload: &MediaPayload,
        destination: &Destination,
    ) -> Result<(), RelayError> {
        let Destination::Email { addresses } = destination else {
            return Err(RelayError::Internal(format!(
                "email backend handed a {} destination",
                destination.kind()
            )));
        };

        // Size guard before touching the wire: oversized attachments will
        // never go through, so retrying is pointless.
        let size = tokio::fs::metadata(&payload.file_path)
            .await
            .map(|m| m.len())
            .map_err(|e| RelayError::TransientDelivery {
                message: format!("failed to stat {}: {e}", payload.file_path.display()),
                source: Some(Box::new(e)),
            })?;
        if size > self.max_attach_bytes {
            warn!(
                file = %payload.file_path.display(),
                size,
                limit = self.max_attach_bytes,
                "attachment exceeds size limit, not sending"
            );
            return Err(RelayError::PermanentDelivery {
                message: format!(
                    "attachment {} is {size} bytes, over the {} byte limit",
                    payload.filename, self.max_attach_bytes
                ),
            });
        }

        let raw = tokio::fs::read(&payload.file_path).await.map_err(|e| {
            RelayError::TransientDelivery {
                message: format!("failed to read {}: {e}", payload.file_path.display()),
                source: Some(Box::new(e)),
            }
        })?;

        let content_type = ContentType::parse(&payload.mime_type)
            .or_else(|_| ContentType::parse("application/octet-stream"))
            .map_err(|e| RelayError::Internal(format!("invalid content type: {e}")))?;
        let attachment =
            Attachment::new(payload.filename.clone()).body(raw, content_type);

        let domain = self.from.email.domain();
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(payload))
            .message_id(Some(message_id(payload, domain)))
            .in_reply_to(thread_ref(payload, domain))
            .references(thread_ref(payload, domain));
        for addr in addresses {
            let mailbox = addr.parse::<Mailbox>().map_err(|e| {
                RelayError::PermanentDelivery {
                    message: format!("invalid recipient `{addr}`: {e}"),
                }
            })?;
            builder = builder.to(mailbox);
        }

        let email = builder
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body_text(payload)))
                    .singlepart(attachment),
            )
            .map_err(|e| RelayError::Internal(format!("failed to build email: {e}")))?;

        match self.transport.send(email).await {
            Ok(_) => {
                info!(
                    recipients = addresses.len(),
                    message_id = payload.message_id,
                    file = payload.filename.as_str(),
                    "email delivered"
                );
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(RelayError::PermanentDelivery {
                message: format!("SMTP rejected message: {e}"),
            }),
            Err(e) => Err(RelayError::TransientDelivery {
                message: format!("SMTP send failed: {e}"),
                source: Some(Box::new(e)),
            }),
        }
    }
}
