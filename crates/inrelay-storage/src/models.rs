// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `inrelay-core::types` for use across
//! crate boundaries. This module re-exports them for convenience within the
//! storage crate.

pub use inrelay_core::types::{
    DeliveryRecord, DeliveryStatus, Destination, EventState, MediaEvent, Subscription,
    SubscriptionStatus,
};
