// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only messenger app integration for the inrelay bridge.
//!
//! The messenger app is an opaque external producer: it writes messages into
//! its own SQLite database and media files into a directory tree. This crate
//! exposes exactly the surface the detector needs (tailing new message rows
//! and resolving attachment ids to on-disk files) without ever writing to
//! either.

pub mod db;
pub mod media;

pub use db::{MessengerDb, MessengerMessage};
pub use media::MediaLocator;
