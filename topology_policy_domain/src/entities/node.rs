// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Node
//!
//! Represents one level of the hardware hierarchy (§3). `Socket`/`Die`/
//! `Numa`/`Virtual` share nearly all behavior; their differences are
//! confined to how capacity is discovered and how hints score against them,
//! so they are modeled as a tagged variant (`NodeKind`) with a shared
//! header rather than a class hierarchy (§9 "Polymorphic node kinds").

use crate::entities::supply::Supply;
use crate::value_objects::{MemTier, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Synthetic root created when the machine has more than one socket.
    Virtual,
    Socket { socket_id: u32 },
    Die { socket_id: u32, die_id: u32 },
    Numa { numa_id: u32 },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Virtual => "virtual",
            NodeKind::Socket { .. } => "socket",
            NodeKind::Die { .. } => "die",
            NodeKind::Numa { .. } => "numa",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub depth: u32,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Physical NUMA ids attached to this node (empty except at/under Numa
    /// nodes, populated at discovery).
    pub numas: Vec<u32>,
    pub capacity: Supply,
    pub free: Supply,
    pub mem_controllers: std::collections::BTreeMap<MemTier, BTreeSet<u32>>,
}

impl Node {
    pub fn mem_controllers_for(&self, tier: MemTier) -> &BTreeSet<u32> {
        static EMPTY: once_cell::sync::Lazy<BTreeSet<u32>> = once_cell::sync::Lazy::new(BTreeSet::new);
        self.mem_controllers.get(&tier).unwrap_or(&EMPTY)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The full memory-controller id set across the tiers named by `mask`.
    pub fn memset_for(&self, mask: crate::value_objects::MemoryTypeMask) -> crate::value_objects::CpuSet {
        let mut out = crate::value_objects::CpuSet::new();
        for tier in mask.tiers() {
            for id in self.mem_controllers_for(tier) {
                out.insert(*id);
            }
        }
        out
    }

    /// Union of `isolated`, `reserved`, and `sharable` — this node's full
    /// logical CPU set, used by hint scoring's `cpu_hint`.
    pub fn full_cpuset(&self) -> crate::value_objects::CpuSet {
        let mut out = self.capacity.isolated.union(&self.capacity.reserved);
        out.union_with(&self.capacity.sharable);
        out
    }

    pub fn socket_id(&self) -> Option<u32> {
        match self.kind {
            NodeKind::Socket { socket_id } | NodeKind::Die { socket_id, .. } => Some(socket_id),
            _ => None,
        }
    }
}
