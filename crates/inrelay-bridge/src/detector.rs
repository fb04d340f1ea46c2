// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media event detector: tails the messenger database and turns stable,
//! unseen media files into [`MediaEvent`]s.
//!
//! The detector is a polling state machine. Text rows feed the acknowledgment
//! monitor; media rows are parked until their file is on disk with a size
//! unchanged across two successive polls (the messenger writes files
//! incrementally, and a file must never be dispatched mid-write). Every
//! emitted event is written to the ledger BEFORE the caller dispatches it, so
//! a crash-restart errs toward at-least-once delivery.

use std::collections::HashMap;

use tracing::{debug, info};

use inrelay_core::{InboundText, MediaEvent, RelayError};
use inrelay_messenger::{MediaLocator, MessengerDb, MessengerMessage};
use inrelay_storage::SubscriptionStore;

use crate::commands::AckMonitor;

struct PendingMedia {
    message: MessengerMessage,
    source_phone: String,
    attachment_id: String,
    file_id: Option<String>,
    /// Size observed on the previous poll; a repeat observation means the
    /// file is stable.
    last_size: Option<u64>,
}

/// Polls the messenger store for new messages.
pub struct Detector {
    messenger: MessengerDb,
    locator: MediaLocator,
    store: SubscriptionStore,
    ack: AckMonitor,
    tail_limit: i64,
    last_id: i64,
    pending: HashMap<String, PendingMedia>,
}

impl Detector {
    pub fn new(
        messenger: MessengerDb,
        locator: MediaLocator,
        store: SubscriptionStore,
        ack: AckMonitor,
        tail_limit: i64,
    ) -> Self {
        Self {
            messenger,
            locator,
            store,
            ack,
            tail_limit,
            last_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Initialize `last_id` to the current maximum so history before the
    /// relay started is never bridged, and optionally log the most recent
    /// messages for operator orientation.
    pub async fn bootstrap(&mut self, boot_dump: i64) -> Result<(), RelayError> {
        self.last_id = self.messenger.max_message_id().await?;
        info!(last_id = self.last_id, "detector bootstrapped");

        if boot_dump > 0 {
            for message in self.messenger.last_messages(boot_dump).await? {
                let phone = self.messenger.thread_phone(message.thread_id).await?;
                info!(
                    id = message.id,
                    source_phone = phone.as_str(),
                    media = message.media_attachment_id.is_some(),
                    text = message.text.as_str(),
                    "[boot]"
                );
            }
        }
        Ok(())
    }

    /// Number of media messages awaiting a stable file.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Run one poll cycle; returns newly detected (ledger-recorded) events.
    ///
    /// Any error aborts the cycle: rows whose handling did not complete keep
    /// their position (`last_id` is only advanced past fully handled rows)
    /// and are re-read next interval.
    pub async fn poll_cycle(&mut self) -> Result<Vec<MediaEvent>, RelayError> {
        let rows = self
            .messenger
            .messages_after(self.last_id, self.tail_limit)
            .await?;

        for row in rows {
            let phone = self.messenger.thread_phone(row.thread_id).await?;
            match &row.media_attachment_id {
                Some(attachment_id) => {
                    let key = MediaEvent::key_for(row.id);
                    if !self.store.is_seen(&key).await?
                        && !self.pending.contains_key(attachment_id)
                    {
                        let file_id = self.messenger.attachment_file_id(attachment_id).await?;
                        debug!(
                            id = row.id,
                            attachment = attachment_id.as_str(),
                            file_id = file_id.as_deref().unwrap_or("<none>"),
                            "media message parked until file is stable"
                        );
                        self.pending.insert(
                            attachment_id.clone(),
                            PendingMedia {
                                attachment_id: attachment_id.clone(),
                                source_phone: phone,
                                file_id,
                                last_size: None,
                                message: row.clone(),
                            },
                        );
                    }
                }
                None => {
                    self.ack
                        .handle_text(&InboundText {
                            source_phone: phone,
                            body: row.text.clone(),
                            received_at: row.sent_time_secs(),
                        })
                        .await?;
                }
            }
            self.last_id = self.last_id.max(row.id);
        }

        self.scan_pending().await
    }

    /// Re-probe parked media for files that have appeared and stabilized.
    async fn scan_pending(&mut self) -> Result<Vec<MediaEvent>, RelayError> {
        let mut ready = Vec::new();
        let attachments: Vec<String> = self.pending.keys().cloned().collect();

        for attachment_id in attachments {
            // The messenger fills in the file id asynchronously; re-query
            // while it is still unknown.
            let known_file_id = self
                .pending
                .get(&attachment_id)
                .and_then(|e| e.file_id.clone());
            let file_id = match known_file_id {
                Some(id) => Some(id),
                None => {
                    let id = self.messenger.attachment_file_id(&attachment_id).await?;
                    if let Some(entry) = self.pending.get_mut(&attachment_id) {
                        entry.file_id = id.clone();
                    }
                    id
                }
            };

            let mut ids: Vec<&str> = Vec::new();
            if let Some(id) = &file_id {
                ids.push(id.as_str());
            }
            ids.push(attachment_id.as_str());
            let Some(path) = self.locator.find(&ids) else {
                continue;
            };

            let size = MediaLocator::file_size(&path);
            let stable = size.is_some()
                && self
                    .pending
                    .get(&attachment_id)
                    .is_some_and(|e| e.last_size == size);
            if !stable {
                if let Some(entry) = self.pending.get_mut(&attachment_id) {
                    entry.last_size = size;
                }
                continue;
            }

            if let Some(entry) = self.pending.get(&attachment_id) {
                let event = build_event(entry, path);
                // Ledger write precedes dispatch; on error the entry stays
                // parked and is retried next cycle.
                let newly_recorded = self.store.record_event(&event).await?;
                self.pending.remove(&attachment_id);
                if newly_recorded {
                    info!(
                        key = event.key.as_str(),
                        source_phone = event.source_phone.as_str(),
                        file = %event.file_path.display(),
                        "media event detected"
                    );
                    ready.push(event);
                }
            }
        }

        Ok(ready)
    }
}

fn build_event(entry: &PendingMedia, path: std::path::PathBuf) -> MediaEvent {
    MediaEvent {
        key: MediaEvent::key_for(entry.message.id),
        message_id: entry.message.id,
        thread_id: entry.message.thread_id,
        attachment_id: entry.attachment_id.clone(),
        source_phone: entry.source_phone.clone(),
        caption: entry.message.text.clone(),
        file_path: path,
        sent_time: entry.message.sent_time_secs(),
        first_seen_at: chrono::Utc::now().to_rfc3339(),
        latitude: entry.message.latitude,
        longitude: entry.message.longitude,
        altitude: entry.message.altitude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inrelay_test_utils::MessengerFixture;
    use tempfile::tempdir;

    struct Rig {
        detector: Detector,
        fixture: MessengerFixture,
        store: SubscriptionStore,
        _dir: tempfile::TempDir,
    }

    async fn rig() -> Rig {
        let dir = tempdir().unwrap();
        let fixture = MessengerFixture::new(dir.path());
        let store = SubscriptionStore::open(dir.path().join("relay.db").to_str().unwrap())
            .await
            .unwrap();
        let messenger = MessengerDb::open(fixture.db_path.to_str().unwrap())
            .await
            .unwrap();
        let locator = MediaLocator::new(
            fixture.media_root.clone(),
            vec!["jpg".into(), "png".into(), "m4a".into()],
        );
        let detector = Detector::new(
            messenger,
            locator,
            store.clone(),
            AckMonitor::new(store.clone()),
            200,
        );
        Rig {
            detector,
            fixture,
            store,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn media_is_emitted_once_file_size_is_stable() {
        let mut r = rig().await;
        r.fixture.insert_thread(1, "+1555");
        r.fixture
            .insert_media(1, 1, "cabin hi", "att-1", 1_700_000_000, Some(61.0), Some(8.0), None);
        r.fixture.set_file_id("att-1", "file-1", 4);
        r.fixture.write_media_file("high", "file-1.jpg", b"1234");

        // Cycle 1: file found, size recorded, nothing emitted yet.
        assert!(r.detector.poll_cycle().await.unwrap().is_empty());
        assert_eq!(r.detector.pending_len(), 1);

        // Cycle 2: size unchanged, event emitted and ledger-recorded.
        let events = r.detector.poll_cycle().await.unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.key, "msg:1");
        assert_eq!(event.source_phone, "+1555");
        assert_eq!(event.caption, "cabin hi");
        assert_eq!(event.attachment_id, "att-1");
        assert!(event.file_path.ends_with("high/file-1.jpg"));
        assert_eq!(event.latitude, Some(61.0));
        assert!(r.store.is_seen("msg:1").await.unwrap());
        assert_eq!(r.detector.pending_len(), 0);
    }

    #[tokio::test]
    async fn growing_file_is_not_dispatched_mid_write() {
        let mut r = rig().await;
        r.fixture.insert_thread(1, "+1555");
        r.fixture
            .insert_media(1, 1, "", "att-1", 1_700_000_000, None, None, None);
        let path = r.fixture.write_media_file("high", "att-1.jpg", b"12");

        assert!(r.detector.poll_cycle().await.unwrap().is_empty());

        // The messenger is still appending.
        std::fs::write(&path, b"123456").unwrap();
        assert!(
            r.detector.poll_cycle().await.unwrap().is_empty(),
            "changed size must reset the stability window"
        );

        let events = r.detector.poll_cycle().await.unwrap();
        assert_eq!(events.len(), 1, "stable size across two polls emits");
    }

    #[tokio::test]
    async fn file_arriving_late_is_parked_until_present() {
        let mut r = rig().await;
        r.fixture.insert_thread(1, "+1555");
        r.fixture
            .insert_media(1, 1, "", "att-1", 1_700_000_000, None, None, None);

        // No file on disk yet.
        assert!(r.detector.poll_cycle().await.unwrap().is_empty());
        assert!(r.detector.poll_cycle().await.unwrap().is_empty());
        assert_eq!(r.detector.pending_len(), 1);

        r.fixture.write_media_file("preview", "att-1.png", b"bytes");
        assert!(r.detector.poll_cycle().await.unwrap().is_empty());
        let events = r.detector.poll_cycle().await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].file_path.ends_with("preview/att-1.png"));
    }

    #[tokio::test]
    async fn seen_identities_are_never_re_emitted() {
        let mut r = rig().await;
        r.fixture.insert_thread(1, "+1555");
        r.fixture
            .insert_media(1, 1, "", "att-1", 1_700_000_000, None, None, None);
        r.fixture.write_media_file("high", "att-1.jpg", b"bytes");

        r.detector.poll_cycle().await.unwrap();
        let events = r.detector.poll_cycle().await.unwrap();
        assert_eq!(events.len(), 1);

        // A fresh detector over the same stores (crash-restart) re-reads the
        // row but the ledger suppresses re-emission.
        let messenger = MessengerDb::open(r.fixture.db_path.to_str().unwrap())
            .await
            .unwrap();
        let locator = MediaLocator::new(r.fixture.media_root.clone(), vec!["jpg".into()]);
        let mut restarted = Detector::new(
            messenger,
            locator,
            r.store.clone(),
            AckMonitor::new(r.store.clone()),
            200,
        );
        assert!(restarted.poll_cycle().await.unwrap().is_empty());
        assert!(restarted.poll_cycle().await.unwrap().is_empty());
        assert_eq!(restarted.pending_len(), 0);
    }

    #[tokio::test]
    async fn text_rows_feed_the_ack_monitor() {
        let mut r = rig().await;
        r.fixture.insert_thread(1, "+1555");

        let provisioned = r
            .store
            .create_pending(
                "cabin",
                "+1555",
                inrelay_core::Destination::Webhook {
                    url: "https://example.org/hook".into(),
                    bearer_token: "tok".into(),
                },
            )
            .await
            .unwrap();
        let token = provisioned.subscription.ack_token;

        r.fixture
            .insert_text(1, 1, &format!("sub cabin {token}"), 1_700_000_000);
        r.detector.poll_cycle().await.unwrap();

        let active = r.store.active_subscriptions_for("+1555").await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_skips_pre_existing_messages() {
        let mut r = rig().await;
        r.fixture.insert_thread(1, "+1555");
        r.fixture
            .insert_media(1, 1, "old", "att-1", 1_700_000_000, None, None, None);
        r.fixture.write_media_file("high", "att-1.jpg", b"old-bytes");

        r.detector.bootstrap(0).await.unwrap();
        assert!(r.detector.poll_cycle().await.unwrap().is_empty());
        assert!(r.detector.poll_cycle().await.unwrap().is_empty());

        // Only messages after bootstrap are bridged.
        r.fixture
            .insert_media(2, 1, "new", "att-2", 1_700_000_100, None, None, None);
        r.fixture.write_media_file("high", "att-2.jpg", b"new-bytes");
        r.detector.poll_cycle().await.unwrap();
        let events = r.detector.poll_cycle().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].caption, "new");
    }

    #[tokio::test]
    async fn file_id_preferred_over_attachment_id_on_disk() {
        let mut r = rig().await;
        r.fixture.insert_thread(1, "+1555");
        r.fixture
            .insert_media(1, 1, "", "att-1", 1_700_000_000, None, None, None);
        r.fixture.set_file_id("att-1", "file-1", 6);
        r.fixture.write_media_file("high", "file-1.jpg", b"abcdef");
        // A stray file under the attachment id also exists; file id wins.
        r.fixture.write_media_file("low", "att-1.jpg", b"x");

        r.detector.poll_cycle().await.unwrap();
        let events = r.detector.poll_cycle().await.unwrap();
        assert!(events[0].file_path.ends_with("high/file-1.jpg"));
    }
}
