// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the inrelay media bridge.
//!
//! This crate provides the shared error type, domain types (subscriptions,
//! media events, destinations), input validation, and the delivery backend
//! trait implemented by the webhook and SMTP crates.

pub mod error;
pub mod traits;
pub mod types;
pub mod validate;

// Re-export key items at crate root for ergonomic imports.
pub use error::RelayError;
pub use traits::{DeliveryBackend, MediaPayload};
pub use types::{
    DeliveryRecord, DeliveryStatus, Destination, EventState, InboundText, MediaEvent,
    Subscription, SubscriptionStatus,
};
