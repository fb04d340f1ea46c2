// SPDX-FileCopyrightText: 2026 Inrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles for the inrelay workspace.

pub mod fixture;
pub mod mock_backend;

pub use fixture::MessengerFixture;
pub use mock_backend::MockBackend;
