// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP provisioning API for inrelay subscriptions.
//!
//! External tooling (e.g. a chat-room plugin) POSTs subscription requests
//! here; the response carries the acknowledgment command the subscribed-to
//! phone must send back over SMS to activate the relay. See
//! [`server::router`] for the route layout.

pub mod auth;
pub mod handlers;
pub mod server;

pub use server::{ProvisionState, ServerConfig, bind, router, serve_on};
