// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only view of the messenger app's message database.
//!
//! The messenger process owns this database and writes to it concurrently;
//! the relay opens it strictly read-only with dirty reads allowed, tailing
//! new rows by ascending message id. Failures here abort the current poll
//! cycle ([`RelayError::DetectorIo`]) and are retried on the next interval.

use inrelay_core::RelayError;
use rusqlite::OpenFlags;

/// One row of the messenger's `message` table, as the relay sees it.
#[derive(Debug, Clone)]
pub struct MessengerMessage {
    pub id: i64,
    /// Message text; doubles as the media caption.
    pub text: String,
    pub thread_id: i64,
    /// Unix seconds (the messenger sometimes reports milliseconds; callers
    /// normalize via [`MessengerMessage::sent_time_secs`]).
    pub sent_time: i64,
    /// Attachment id, if the message carries media.
    pub media_attachment_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

impl MessengerMessage {
    /// Send time in unix seconds regardless of the unit the messenger used.
    pub fn sent_time_secs(&self) -> i64 {
        if self.sent_time > 1_000_000_000_000 {
            self.sent_time / 1000
        } else {
            self.sent_time
        }
    }
}

/// The attachment column is INTEGER in some messenger builds and TEXT in
/// others; normalize either to a string id.
fn opt_string(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    use rusqlite::types::ValueRef;
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => {
            let s = String::from_utf8_lossy(t).into_owned();
            if s.is_empty() { None } else { Some(s) }
        }
        ValueRef::Blob(_) => None,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessengerMessage> {
    Ok(MessengerMessage {
        id: row.get(0)?,
        text: row.get(1)?,
        thread_id: row.get(2)?,
        sent_time: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        media_attachment_id: opt_string(row, 4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        altitude: row.get(7)?,
    })
}

const MESSAGE_COLUMNS: &str = "m.id, COALESCE(m.text, ''), m.message_thread_id, m.sent_time, \
                               m.media_attachment_id, m.latitude, m.longitude, m.altitude";

/// Read-only handle to the messenger database.
#[derive(Clone)]
pub struct MessengerDb {
    conn: tokio_rusqlite::Connection,
}

impl MessengerDb {
    /// Open the messenger database read-only.
    pub async fn open(path: &str) -> Result<Self, RelayError> {
        let conn = tokio_rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .await
        .map_err(|e| RelayError::DetectorIo {
            source: Box::new(e),
        })?;

        conn.call(|conn| -> Result<(), rusqlite::Error> {
            // The messenger writes while we read; tolerate its WAL activity.
            conn.execute_batch(
                "PRAGMA read_uncommitted = 1;
                 PRAGMA busy_timeout = 2500;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_io_err)?;

        Ok(Self { conn })
    }

    /// Highest message id currently in the database (0 when empty).
    pub async fn max_message_id(&self) -> Result<i64, RelayError> {
        self.conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT IFNULL(MAX(id), 0) FROM message", [], |row| {
                    row.get(0)
                })
            })
            .await
            .map_err(map_io_err)
    }

    /// Messages with id greater than `last_id`, ascending, bounded by
    /// `limit`.
    pub async fn messages_after(
        &self,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<MessengerMessage>, RelayError> {
        self.conn
            .call(move |conn| -> Result<Vec<MessengerMessage>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM message m
                     WHERE m.id > ?1 ORDER BY m.id ASC LIMIT ?2"
                ))?;
                let rows = stmt.query_map([last_id, limit], message_from_row)?;
                let mut messages = Vec::new();
                for row in rows {
                    messages.push(row?);
                }
                Ok(messages)
            })
            .await
            .map_err(map_io_err)
    }

    /// The most recent `n` messages, oldest first. Used for the startup boot
    /// dump.
    pub async fn last_messages(&self, n: i64) -> Result<Vec<MessengerMessage>, RelayError> {
        self.conn
            .call(move |conn| -> Result<Vec<MessengerMessage>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM message m
                     ORDER BY m.id DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map([n], message_from_row)?;
                let mut messages = Vec::new();
                for row in rows {
                    messages.push(row?);
                }
                messages.reverse();
                Ok(messages)
            })
            .await
            .map_err(map_io_err)
    }

    /// Phone number (MSISDN) behind a message thread; empty when unknown.
    pub async fn thread_phone(&self, thread_id: i64) -> Result<String, RelayError> {
        self.conn
            .call(move |conn| -> Result<String, rusqlite::Error> {
                match conn.query_row(
                    "SELECT addresses FROM message_thread WHERE id = ?1",
                    [thread_id],
                    |row| row.get::<_, Option<String>>(0),
                ) {
                    Ok(addr) => Ok(addr.unwrap_or_default()),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(String::new()),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_io_err)
    }

    /// File id recorded for an attachment, preferring the largest variant.
    /// The messenger fills this in asynchronously, so `None` is common right
    /// after arrival.
    pub async fn attachment_file_id(
        &self,
        attachment_id: &str,
    ) -> Result<Option<String>, RelayError> {
        let attachment_id = attachment_id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                match conn.query_row(
                    "SELECT COALESCE(mf.file_id, '')
                     FROM media_attachment_record mr
                     LEFT JOIN media_attachment_file mf
                       ON mf.attachment_id = mr.attachment_id
                     WHERE mr.attachment_id = ?1
                     ORDER BY IFNULL(mf.fileSize, 0) DESC
                     LIMIT 1",
                    [attachment_id],
                    |row| row.get::<_, String>(0),
                ) {
                    Ok(file_id) if file_id.is_empty() => Ok(None),
                    Ok(file_id) => Ok(Some(file_id)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_io_err)
    }
}

fn map_io_err(e: tokio_rusqlite::Error) -> RelayError {
    RelayError::DetectorIo {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn build_fixture(path: &std::path::Path) {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE message (
                 id INTEGER PRIMARY KEY,
                 text TEXT,
                 message_thread_id INTEGER,
                 sent_time INTEGER,
                 media_attachment_id TEXT,
                 latitude REAL, longitude REAL, altitude REAL
             );
             CREATE TABLE message_thread (id INTEGER PRIMARY KEY, addresses TEXT);
             CREATE TABLE media_attachment_record (attachment_id TEXT, media_type TEXT);
             CREATE TABLE media_attachment_file (attachment_id TEXT, file_id TEXT, fileSize INTEGER);

             INSERT INTO message_thread VALUES (1, '+1555');
             INSERT INTO message VALUES
                 (1, 'hello', 1, 1700000000, NULL, NULL, NULL, NULL),
                 (2, 'cabin pic', 1, 1700000100000, 'att-2', 61.5, 8.25, 1400.0),
                 (3, '', 1, 1700000200, NULL, NULL, NULL, NULL);
             INSERT INTO media_attachment_record VALUES ('att-2', 'image');
             INSERT INTO media_attachment_file VALUES
                 ('att-2', 'file-small', 100),
                 ('att-2', 'file-big', 5000);",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn tails_messages_after_id() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        build_fixture(&db_path);

        let db = MessengerDb::open(db_path.to_str().unwrap()).await.unwrap();
        assert_eq!(db.max_message_id().await.unwrap(), 3);

        let messages = db.messages_after(1, 200).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, 2);
        assert_eq!(messages[0].media_attachment_id.as_deref(), Some("att-2"));
        assert_eq!(messages[0].latitude, Some(61.5));
        assert_eq!(messages[1].id, 3);
        assert!(messages[1].media_attachment_id.is_none());

        // Millisecond sent_time normalizes to seconds.
        assert_eq!(messages[0].sent_time_secs(), 1_700_000_100);
        let all = db.messages_after(0, 200).await.unwrap();
        assert_eq!(all[0].sent_time_secs(), 1_700_000_000);
    }

    #[tokio::test]
    async fn tail_limit_bounds_the_batch() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        build_fixture(&db_path);

        let db = MessengerDb::open(db_path.to_str().unwrap()).await.unwrap();
        let messages = db.messages_after(0, 2).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, 2);
    }

    #[tokio::test]
    async fn thread_phone_lookup() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        build_fixture(&db_path);

        let db = MessengerDb::open(db_path.to_str().unwrap()).await.unwrap();
        assert_eq!(db.thread_phone(1).await.unwrap(), "+1555");
        assert_eq!(db.thread_phone(99).await.unwrap(), "");
    }

    #[tokio::test]
    async fn attachment_file_id_prefers_largest() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        build_fixture(&db_path);

        let db = MessengerDb::open(db_path.to_str().unwrap()).await.unwrap();
        assert_eq!(
            db.attachment_file_id("att-2").await.unwrap().as_deref(),
            Some("file-big")
        );
        assert!(db.attachment_file_id("att-unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn boot_dump_returns_oldest_first() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        build_fixture(&db_path);

        let db = MessengerDb::open(db_path.to_str().unwrap()).await.unwrap();
        let last = db.last_messages(2).await.unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].id, 2);
        assert_eq!(last[1].id, 3);
    }

    #[tokio::test]
    async fn database_is_opened_read_only() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        build_fixture(&db_path);

        let db = MessengerDb::open(db_path.to_str().unwrap()).await.unwrap();
        let result = db
            .conn
            .call(|conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM message", [])
            })
            .await;
        assert!(result.is_err(), "writes through the relay handle must fail");
    }

    #[tokio::test]
    async fn missing_database_is_a_detector_error() {
        let result = MessengerDb::open("/nonexistent/messages.db").await;
        assert!(matches!(result, Err(RelayError::DetectorIo { .. })));
    }

    #[tokio::test]
    async fn integer_attachment_ids_normalize_to_strings() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE message (
                 id INTEGER PRIMARY KEY, text TEXT, message_thread_id INTEGER,
                 sent_time INTEGER, media_attachment_id INTEGER,
                 latitude REAL, longitude REAL, altitude REAL
             );
             INSERT INTO message VALUES (1, 'x', 1, 0, 42, NULL, NULL, NULL);",
        )
        .unwrap();
        drop(conn);

        let db = MessengerDb::open(db_path.to_str().unwrap()).await.unwrap();
        let messages = db.messages_after(0, 10).await.unwrap();
        assert_eq!(messages[0].media_attachment_id.as_deref(), Some("42"));
    }
}
