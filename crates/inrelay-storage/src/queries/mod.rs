// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes `&Database` and runs its work on
//! the single writer thread via `connection().call()`.

pub mod deliveries;
pub mod events;
pub mod subscriptions;
