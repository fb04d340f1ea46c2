// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media file resolution against the messenger's on-disk layout.
//!
//! The messenger stores attachment files as `<root>/<quality>/<id>.<ext>`
//! where the id may be either the file id or the attachment id, depending on
//! how far its own download pipeline has progressed.

use std::path::{Path, PathBuf};

/// Quality subdirectories probed in preference order. The bare root is last:
/// some messenger builds skip the quality tiers for audio notes.
const SEARCH_ROOTS: [&str; 5] = ["high", "preview", "low", "audio", ""];

/// Resolves attachment ids to media file paths.
#[derive(Debug, Clone)]
pub struct MediaLocator {
    root: PathBuf,
    exts: Vec<String>,
}

impl MediaLocator {
    pub fn new(root: impl Into<PathBuf>, exts: Vec<String>) -> Self {
        Self {
            root: root.into(),
            exts,
        }
    }

    /// Probe every candidate id against every quality root and extension,
    /// returning the first existing file. Ids are tried in order, so callers
    /// pass the file id (preferred) before the attachment id.
    pub fn find(&self, ids: &[&str]) -> Option<PathBuf> {
        for id in ids.iter().filter(|id| !id.is_empty()) {
            for sub in SEARCH_ROOTS {
                let dir = if sub.is_empty() {
                    self.root.clone()
                } else {
                    self.root.join(sub)
                };
                for ext in &self.exts {
                    let candidate = dir.join(format!("{id}.{ext}"));
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Current size of a file, if it exists.
    pub fn file_size(path: &Path) -> Option<u64> {
        std::fs::metadata(path).ok().map(|m| m.len())
    }
}
