// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription CRUD and the atomic pending -> active transition.

use std::str::FromStr;

use inrelay_core::{Destination, RelayError, Subscription, SubscriptionStatus};
use rusqlite::params;

use crate::database::Database;

const SUB_COLUMNS: &str =
    "id, name, source_phone, destination, ack_token, status, created_at, activated_at";

fn subscription_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
    let destination_json: String = row.get(3)?;
    let destination: Destination = serde_json::from_str(&destination_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status_str: String = row.get(5)?;
    let status = SubscriptionStatus::from_str(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Subscription {
        id: row.get(0)?,
        name: row.get(1)?,
        source_phone: row.get(2)?,
        destination,
        ack_token: row.get(4)?,
        status,
        created_at: row.get(6)?,
        activated_at: row.get(7)?,
    })
}

/// Insert a pending subscription, or reset an existing `(source_phone, name)`
/// record back to pending with the new token and destination.
///
/// The existing record keeps its id so external holders of the id stay valid.
/// Returns the stored subscription and whether it was newly created.
pub async fn upsert_pending(
    db: &Database,
    sub: &Subscription,
) -> Result<(Subscription, bool), RelayError> {
    let sub = sub.clone();
    db.connection()
        .call(move |conn| -> Result<(Subscription, bool), rusqlite::Error> {
            let tx = conn.transaction()?;
            let name_key = sub.name.to_lowercase();
            let destination_json = serde_json::to_string(&sub.destination).map_err(|e| {
                rusqlite::Error::ToSqlConversionFailure(Box::new(e))
            })?;

            let updated = tx.execute(
                "UPDATE subscriptions
                 SET name = ?1, destination = ?2, ack_token = ?3,
                     status = 'pending', activated_at = NULL
                 WHERE source_phone = ?4 AND name_key = ?5",
                params![sub.name, destination_json, sub.ack_token, sub.source_phone, name_key],
            )?;
            let created = updated == 0;
            if created {
                tx.execute(
                    "INSERT INTO subscriptions
                     (id, name, name_key, source_phone, destination, ack_token, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
                    params![
                        sub.id,
                        sub.name,
                        name_key,
                        sub.source_phone,
                        destination_json,
                        sub.ack_token,
                        sub.created_at,
                    ],
                )?;
            }

            let stored = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {SUB_COLUMNS} FROM subscriptions
                     WHERE source_phone = ?1 AND name_key = ?2"
                ))?;
                stmt.query_row(params![sub.source_phone, name_key], subscription_from_row)?
            };
            tx.commit()?;
            Ok((stored, created))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Atomically consume an ack token: the single UPDATE succeeds only for a
/// still-pending subscription whose `(source_phone, name, token)` all match.
///
/// Returns `None` when nothing matched; callers must not learn which field
/// was wrong.
pub async fn activate(
    db: &Database,
    source_phone: &str,
    name: &str,
    token: &str,
) -> Result<Option<Subscription>, RelayError> {
    let source_phone = source_phone.to_string();
    let name_key = name.to_lowercase();
    let token = token.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Subscription>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE subscriptions
                 SET status = 'active',
                     activated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE source_phone = ?1 AND name_key = ?2 AND ack_token = ?3
                   AND status = 'pending'",
                params![source_phone, name_key, token],
            )?;
            let result = if changed == 1 {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {SUB_COLUMNS} FROM subscriptions
                     WHERE source_phone = ?1 AND name_key = ?2"
                ))?;
                Some(stmt.query_row(params![source_phone, name_key], subscription_from_row)?)
            } else {
                None
            };
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All active subscriptions for a sender.
pub async fn active_for(
    db: &Database,
    source_phone: &str,
) -> Result<Vec<Subscription>, RelayError> {
    let source_phone = source_phone.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Subscription>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUB_COLUMNS} FROM subscriptions
                 WHERE source_phone = ?1 AND status = 'active'
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![source_phone], subscription_from_row)?;
            let mut subs = Vec::new();
            for row in rows {
                subs.push(row?);
            }
            Ok(subs)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a subscription by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<Subscription>, RelayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Subscription>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUB_COLUMNS} FROM subscriptions WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], subscription_from_row) {
                Ok(sub) => Ok(Some(sub)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Revoke a subscription by id. Returns whether a row was affected.
pub async fn revoke(db: &Database, id: &str) -> Result<bool, RelayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE subscriptions SET status = 'revoked' WHERE id = ?1",
                params![id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Revoke one named subscription of a sender, or all of them when `name` is
/// `None`. Returns the number of rows revoked.
pub async fn revoke_by_name(
    db: &Database,
    source_phone: &str,
    name: Option<&str>,
) -> Result<usize, RelayError> {
    let source_phone = source_phone.to_string();
    let name_key = name.map(|n| n.to_lowercase());
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let changed = match &name_key {
                Some(key) => conn.execute(
                    "UPDATE subscriptions SET status = 'revoked'
                     WHERE source_phone = ?1 AND name_key = ?2 AND status != 'revoked'",
                    params![source_phone, key],
                )?,
                None => conn.execute(
                    "UPDATE subscriptions SET status = 'revoked'
                     WHERE source_phone = ?1 AND status != 'revoked'",
                    params![source_phone],
                )?,
            };
            Ok(changed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Subscription counts by status, for operator reporting.
pub async fn counts(db: &Database) -> Result<(i64, i64, i64), RelayError> {
    db.connection()
        .call(|conn| -> Result<(i64, i64, i64), rusqlite::Error> {
            conn.query_row(
                "SELECT
                    COUNT(*) FILTER (WHERE status = 'pending'),
                    COUNT(*) FILTER (WHERE status = 'active'),
                    COUNT(*) FILTER (WHERE status = 'revoked')
                 FROM subscriptions",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}
