// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seen-events ledger operations.
//!
//! The ledger is append-only on the identity key: `record` inserts at most
//! once per key and re-polls are idempotent. Rows are written BEFORE delivery
//! is attempted so a crash-restart biases toward at-least-once.

use std::path::PathBuf;
use std::str::FromStr;

use inrelay_core::{EventState, MediaEvent, RelayError};
use rusqlite::params;

use crate::database::Database;

const EVENT_COLUMNS: &str = "key, message_id, thread_id, attachment_id, source_phone, caption, \
                             file_path, sent_time, first_seen_at, latitude, longitude, altitude";

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaEvent> {
    let file_path: String = row.get(6)?;
    Ok(MediaEvent {
        key: row.get(0)?,
        message_id: row.get(1)?,
        thread_id: row.get(2)?,
        attachment_id: row.get(3)?,
        source_phone: row.get(4)?,
        caption: row.get(5)?,
        file_path: PathBuf::from(file_path),
        sent_time: row.get(7)?,
        first_seen_at: row.get(8)?,
        latitude: row.get(9)?,
        longitude: row.get(10)?,
        altitude: row.get(11)?,
    })
}

/// Record an event in the ledger. Returns `true` if the key was new,
/// `false` if it was already seen (the existing row is left untouched).
pub async fn record(db: &Database, event: &MediaEvent) -> Result<bool, RelayError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO events
                 (key, message_id, thread_id, attachment_id, source_phone, caption,
                  file_path, sent_time, first_seen_at, latitude, longitude, altitude)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    event.key,
                    event.message_id,
                    event.thread_id,
                    event.attachment_id,
                    event.source_phone,
                    event.caption,
                    event.file_path.to_string_lossy(),
                    event.sent_time,
                    event.first_seen_at,
                    event.latitude,
                    event.longitude,
                    event.altitude,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether an identity key is already in the ledger.
pub async fn is_seen(db: &Database, key: &str) -> Result<bool, RelayError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM events WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Advance an event to a (possibly terminal) state.
pub async fn set_state(db: &Database, key: &str, state: EventState) -> Result<(), RelayError> {
    let key = key.to_string();
    let state = state.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE events SET state = ?1 WHERE key = ?2",
                params![state, key],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Current state of an event, if recorded.
pub async fn get_state(db: &Database, key: &str) -> Result<Option<EventState>, RelayError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<EventState>, rusqlite::Error> {
            match conn.query_row(
                "SELECT state FROM events WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            ) {
                Ok(s) => {
                    let state = EventState::from_str(&s).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            0,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(Some(state))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Events that have not reached a terminal state, oldest first. These are
/// the redelivery candidates reconsidered on every poll cycle.
pub async fn unresolved(db: &Database) -> Result<Vec<MediaEvent>, RelayError> {
    db.connection()
        .call(|conn| -> Result<Vec<MediaEvent>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE state = 'pending' ORDER BY message_id ASC"
            ))?;
            let rows = stmt.query_map([], event_from_row)?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_event(message_id: i64) -> MediaEvent {
        MediaEvent {
            key: MediaEvent::key_for(message_id),
            message_id,
            thread_id: 1,
            attachment_id: format!("att-{message_id}"),
            source_phone: "+1555".into(),
            caption: "cabin hello".into(),
            file_path: PathBuf::from(format!("/media/high/att-{message_id}.jpg")),
            sent_time: 1_700_000_000,
            first_seen_at: "2026-01-01T00:00:00.000Z".into(),
            latitude: Some(61.0),
            longitude: Some(8.0),
            altitude: None,
        }
    }

    #[tokio::test]
    async fn record_is_idempotent_on_key() {
        let (db, _dir) = setup_db().await;
        let event = make_event(1);

        assert!(record(&db, &event).await.unwrap());
        assert!(is_seen(&db, "msg:1").await.unwrap());

        // A stale listing re-offers the same identity: no new row, original
        // row untouched.
        let mut replay = make_event(1);
        replay.caption = "different caption".into();
        assert!(!record(&db, &replay).await.unwrap());

        let events = unresolved(&db).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].caption, "cabin hello");
    }

    #[tokio::test]
    async fn unseen_key_reports_false() {
        let (db, _dir) = setup_db().await;
        assert!(!is_seen(&db, "msg:99").await.unwrap());
    }

    #[tokio::test]
    async fn state_transitions_remove_from_unresolved() {
        let (db, _dir) = setup_db().await;
        record(&db, &make_event(1)).await.unwrap();
        record(&db, &make_event(2)).await.unwrap();
        record(&db, &make_event(3)).await.unwrap();

        set_state(&db, "msg:1", EventState::Delivered).await.unwrap();
        set_state(&db, "msg:3", EventState::Failed).await.unwrap();

        let unresolved_events = unresolved(&db).await.unwrap();
        assert_eq!(unresolved_events.len(), 1);
        assert_eq!(unresolved_events[0].key, "msg:2");

        assert_eq!(
            get_state(&db, "msg:1").await.unwrap(),
            Some(EventState::Delivered)
        );
        assert_eq!(get_state(&db, "msg:404").await.unwrap(), None);
    }

    #[tokio::test]
    async fn location_columns_round_trip() {
        let (db, _dir) = setup_db().await;
        record(&db, &make_event(7)).await.unwrap();
        let events = unresolved(&db).await.unwrap();
        assert_eq!(events[0].latitude, Some(61.0));
        assert_eq!(events[0].longitude, Some(8.0));
        assert_eq!(events[0].altitude, None);
    }
}
