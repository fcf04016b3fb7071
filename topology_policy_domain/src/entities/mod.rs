// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

pub mod grant;
pub mod node;
pub mod supply;

pub use grant::{ColdStartTimerHandle, Grant, GrantState};
pub use node::{Node, NodeKind};
pub use supply::{CpuAllocation, Supply};
