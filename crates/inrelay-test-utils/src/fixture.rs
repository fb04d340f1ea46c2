// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builder for a fake messenger database and media directory.
//!
//! Reproduces the slice of the messenger's schema the relay reads: the
//! `message` / `message_thread` tables and the attachment lookup tables,
//! plus the on-disk `high/preview/low/audio` media layout.

use std::path::{Path, PathBuf};

/// A messenger database + media tree rooted in a caller-owned directory.
pub struct MessengerFixture {
    pub db_path: PathBuf,
    pub media_root: PathBuf,
}

impl MessengerFixture {
    /// Create the schema and an empty media tree under `dir`.
    pub fn new(dir: &Path) -> Self {
        let db_path = dir.join("messages.db");
        let media_root = dir.join("media");
        for sub in ["high", "preview", "low", "audio"] {
            std::fs::create_dir_all(media_root.join(sub)).expect("create media dirs");
        }

        let conn = rusqlite::Connection::open(&db_path).expect("open fixture db");
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
             CREATE TABLE media_attachment_file (attachment_id TEXT, file_id TEXT, fileSize INTEGER);",
        )
        .expect("create fixture schema");

        Self {
            db_path,
            media_root,
        }
    }

    fn conn(&self) -> rusqlite::Connection {
        rusqlite::Connection::open(&self.db_path).expect("open fixture db")
    }

    /// Register a thread (sender phone number).
    pub fn insert_thread(&self, thread_id: i64, phone: &str) {
        self.conn()
            .execute(
                "INSERT INTO message_thread (id, addresses) VALUES (?1, ?2)",
                rusqlite::params![thread_id, phone],
            )
            .expect("insert thread");
    }

    /// Insert a plain text message (no media).
    pub fn insert_text(&self, id: i64, thread_id: i64, text: &str, sent_time: i64) {
        self.conn()
            .execute(
                "INSERT INTO message (id, text, message_thread_id, sent_time)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, text, thread_id, sent_time],
            )
            .expect("insert text message");
    }

    /// Insert a media message with an attachment record.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_media(
        &self,
        id: i64,
        thread_id: i64,
        caption: &str,
        attachment_id: &str,
        sent_time: i64,
        latitude: Option<f64>,
        longitude: Option<f64>,
        altitude: Option<f64>,
    ) {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO message
             (id, text, message_thread_id, sent_time, media_attachment_id,
              latitude, longitude, altitude)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id, caption, thread_id, sent_time, attachment_id, latitude, longitude, altitude
            ],
        )
        .expect("insert media message");
        conn.execute(
            "INSERT INTO media_attachment_record (attachment_id, media_type)
             VALUES (?1, 'image')",
            rusqlite::params![attachment_id],
        )
        .expect("insert attachment record");
    }

    /// Register the downloaded file id for an attachment.
    pub fn set_file_id(&self, attachment_id: &str, file_id: &str, size: i64) {
        self.conn()
            .execute(
                "INSERT INTO media_attachment_file (attachment_id, file_id, fileSize)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![attachment_id, file_id, size],
            )
            .expect("insert attachment file");
    }

    /// Write a media file into a quality subdirectory, returning its path.
    pub fn write_media_file(&self, quality: &str, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.media_root.join(quality).join(name);
        std::fs::write(&path, bytes).expect("write media file");
        path
    }
}
