// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sandbox module - isolated execution backends for analysis phases.

pub mod mock;
pub mod podman;
mod traits;

pub use mock::{MockSandboxFactory, MockStep};
pub use podman::{PodmanConfig, PodmanSandboxFactory};
pub use traits::*;
