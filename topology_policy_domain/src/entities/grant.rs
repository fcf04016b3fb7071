// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Grant
//!
//! A committed allocation binding one container to a pool's resources
//! (§3). Lifecycle: `created` by `Supply::allocate_*` → `applied` by the
//! Placer → optionally `expanded` upward on memory pressure →
//! `cold-start-complete` → `released`.

use crate::value_objects::{ContainerId, CpuClass, CpuSet, MemTier, MemoryTypeMask, MilliCpu, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Opaque handle to a running cold-start timer. The domain crate does not
/// know about `tokio`; the engine crate's event machinery owns the actual
/// task and uses this id to look it up for cancellation (§9 "Timer
/// callbacks").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColdStartTimerHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantState {
    Created,
    Applied,
    ColdStartComplete,
    Released,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub container_id: ContainerId,
    pub cpu_node: NodeId,
    pub memory_node: NodeId,
    pub exclusive: CpuSet,
    /// True if `exclusive` was carved from `isolated` rather than
    /// `sharable` — needed to restore it to the right set on release.
    pub exclusive_from_isolated: bool,
    pub cpu_class: CpuClass,
    pub fraction: MilliCpu,
    pub memory_type: MemoryTypeMask,
    pub memset: CpuSet,
    pub memory_allocated: BTreeMap<MemTier, u64>,
    pub cold_start: Duration,
    pub cold_start_timer: Option<ColdStartTimerHandle>,
    pub state: GrantState,
    /// Name of the CPU pool the grant was (re-)placed against, retained so
    /// a subsequent restore-by-replacement can pass it as `hint_pool_name`
    /// (§4.7).
    pub cpu_pool_name: String,
    pub memory_pool_name: String,
}

impl Grant {
    pub fn is_zero_grant(&self) -> bool {
        self.exclusive.is_empty() && self.fraction == MilliCpu::ZERO && self.memory_allocated.is_empty()
    }

    pub fn has_shared_portion(&self) -> bool {
        self.fraction != MilliCpu::ZERO
    }

    pub fn in_cold_start(&self) -> bool {
        self.cold_start_timer.is_some()
    }
}
