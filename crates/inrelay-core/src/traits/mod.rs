// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for pluggable delivery backends.

pub mod backend;

pub use backend::{DeliveryBackend, MediaPayload};
