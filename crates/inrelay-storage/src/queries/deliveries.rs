// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-destination delivery state for multi-target fan-out.
//!
//! One row per `(event, subscription)` pair. Selective retry depends on these
//! rows: a redelivery cycle only re-attempts rows that are not `delivered`,
//! so subscribers who already received an item are never sent it twice.

use std::str::FromStr;

use inrelay_core::{DeliveryRecord, DeliveryStatus, RelayError};
use rusqlite::params;

use crate::database::Database;

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveryRecord> {
    let status_str: String = row.get(2)?;
    let status = DeliveryStatus::from_str(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(DeliveryRecord {
        event_key: row.get(0)?,
        subscription_id: row.get(1)?,
        status,
        attempts: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Ensure a pending row exists for each resolved destination of an event.
///
/// Rows already present (from an earlier cycle) keep their status, so a
/// destination that succeeded before the crash stays `delivered`.
pub async fn init(
    db: &Database,
    event_key: &str,
    subscription_ids: &[String],
) -> Result<(), RelayError> {
    let event_key = event_key.to_string();
    let subscription_ids = subscription_ids.to_vec();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            for sub_id in &subscription_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO deliveries (event_key, subscription_id)
                     VALUES (?1, ?2)",
                    params![event_key, sub_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All delivery rows for an event.
pub async fn records_for(db: &Database, event_key: &str) -> Result<Vec<DeliveryRecord>, RelayError> {
    let event_key = event_key.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<DeliveryRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT event_key, subscription_id, status, attempts, updated_at
                 FROM deliveries WHERE event_key = ?1 ORDER BY subscription_id ASC",
            )?;
            let rows = stmt.query_map(params![event_key], record_from_row)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Rows still awaiting delivery for an event (excludes `delivered` and the
/// terminally `failed`).
pub async fn pending_for(db: &Database, event_key: &str) -> Result<Vec<DeliveryRecord>, RelayError> {
    let event_key = event_key.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<DeliveryRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT event_key, subscription_id, status, attempts, updated_at
                 FROM deliveries WHERE event_key = ?1 AND status = 'pending'
                 ORDER BY subscription_id ASC",
            )?;
            let rows = stmt.query_map(params![event_key], record_from_row)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the outcome of one delivery attempt: bumps the attempt counter and
/// sets the new status.
pub async fn record_attempt(
    db: &Database,
    event_key: &str,
    subscription_id: &str,
    status: DeliveryStatus,
) -> Result<(), RelayError> {
    let event_key = event_key.to_string();
    let subscription_id = subscription_id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE deliveries
                 SET status = ?1, attempts = attempts + 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE event_key = ?2 AND subscription_id = ?3",
                params![status, event_key, subscription_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether every delivery row for the event reports success. False when the
/// event has no rows at all.
pub async fn all_delivered(db: &Database, event_key: &str) -> Result<bool, RelayError> {
    let event_key = event_key.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let (total, delivered): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'delivered')
                 FROM deliveries WHERE event_key = ?1",
                params![event_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(total > 0 && total == delivered)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether the event has at least one terminally failed destination.
pub async fn any_failed(db: &Database, event_key: &str) -> Result<bool, RelayError> {
    let event_key = event_key.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let failed: i64 = conn.query_row(
                "SELECT COUNT(*) FROM deliveries
                 WHERE event_key = ?1 AND status = 'failed'",
                params![event_key],
                |row| row.get(0),
            )?;
            Ok(failed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
