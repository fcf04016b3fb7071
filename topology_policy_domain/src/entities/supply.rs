// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Supply
//!
//! Per-pool allocatable CPU and memory state (§4.1). A `Supply` knows how to
//! account for allocations made *at its own node*; propagating the effect of
//! an exclusive-CPU grant to ancestors/descendants, and of a memory grant's
//! extra reservation to descendants, is the tree's job
//! ([`crate::aggregates::pool_tree::PoolTree`]) since it requires visibility
//! across nodes that a single `Supply` does not have.

use crate::entities::grant::Grant;
use crate::error::{PlacementError, Result};
use crate::request::Request;
use crate::value_objects::{ContainerId, CpuClass, CpuSet, MemTier, MilliCpu};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What `allocate_cpu` actually took, before a `Grant` is assembled around
/// it.
#[derive(Debug, Clone, Default)]
pub struct CpuAllocation {
    pub exclusive: CpuSet,
    pub fraction: MilliCpu,
    pub class: CpuClass,
    /// Set when a `Reserved` request had to fall back to `Normal` because
    /// allocatable reserved capacity was insufficient — the caller logs this
    /// (domain code does not depend on a logging crate).
    pub reserved_fallback: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Supply {
    pub isolated: CpuSet,
    pub reserved: CpuSet,
    pub sharable: CpuSet,
    pub granted_reserved: MilliCpu,
    pub granted_shared: MilliCpu,
    pub mem: BTreeMap<MemTier, u64>,
    pub granted_mem: BTreeMap<MemTier, u64>,
    /// Per-tier footprint of grants anchored in an ancestor whose subtree
    /// passes through this node (§4.1 "extra memory reservation").
    pub extra_reservations: BTreeMap<ContainerId, BTreeMap<MemTier, u64>>,
}

impl Supply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union cpusets, sum counters and per-tier memory. Used during tree
    /// bottom-up discovery at non-leaves (§4.2 step 7).
    pub fn cumulate(&mut self, other: &Supply) {
        self.isolated.union_with(&other.isolated);
        self.reserved.union_with(&other.reserved);
        self.sharable.union_with(&other.sharable);
        self.granted_reserved += other.granted_reserved;
        self.granted_shared += other.granted_shared;
        for (tier, bytes) in &other.mem {
            *self.mem.entry(*tier).or_default() += bytes;
        }
        for (tier, bytes) in &other.granted_mem {
            *self.granted_mem.entry(*tier).or_default() += bytes;
        }
    }

    /// `Σ over descendants extra_reservations[tier]`, used by expansion and
    /// by the effective-free-memory view.
    pub fn total_extra_reservation(&self, tier: MemTier) -> u64 {
        self.extra_reservations
            .values()
            .filter_map(|per_tier| per_tier.get(&tier))
            .sum()
    }

    pub fn total_extra_reservation_all_tiers(&self) -> u64 {
        MemTier::ALL.iter().map(|t| self.total_extra_reservation(*t)).sum()
    }

    /// Effective free memory at this node once other grants' extra
    /// reservations are subtracted (§4.1, consulted by expansion checks).
    pub fn effective_free(&self, tier: MemTier) -> i64 {
        let free = *self.mem.get(&tier).unwrap_or(&0) as i64;
        free - self.total_extra_reservation(tier) as i64
    }

    pub fn effective_free_all_tiers(&self) -> i64 {
        let free: u64 = self.mem.values().sum();
        free as i64 - self.total_extra_reservation_all_tiers() as i64
    }

    /// Allocatable shared milli-CPU at *this* node alone, ignoring
    /// ancestors. §3: `1000·|sharable| − granted_shared`.
    pub fn local_allocatable_shared(&self) -> MilliCpu {
        MilliCpu::from_cpus(self.sharable.len() as u32) - self.granted_shared
    }

    pub fn local_allocatable_reserved(&self) -> MilliCpu {
        MilliCpu::from_cpus(self.reserved.len() as u32) - self.granted_reserved
    }

    /// `min` over this node and all ancestors of the local allocatable
    /// shared milli-CPU (§3). `ancestors` is ordered node-to-root.
    pub fn ancestor_adjusted_allocatable_shared(&self, ancestors: &[&Supply]) -> MilliCpu {
        let mut bound = self.local_allocatable_shared();
        for a in ancestors {
            bound = bound.min(a.local_allocatable_shared());
        }
        bound
    }

    /// §4.1 `allocate_cpu`. `ancestors` is this node's ancestor chain
    /// (node-to-root) needed for the ancestor-adjusted shared bound; it does
    /// *not* include `self`.
    pub fn allocate_cpu(&mut self, req: &Request, ancestors: &[&Supply]) -> Result<CpuAllocation> {
        let mut exclusive = CpuSet::new();

        if req.full > 0 {
            if req.isolate && self.isolated.len() as u32 >= req.full {
                exclusive = self.isolated.take(req.full as usize);
            } else {
                let adjusted = self.ancestor_adjusted_allocatable_shared(ancestors);
                if adjusted > MilliCpu::from_cpus(req.full) {
                    exclusive = self.sharable.take(req.full as usize);
                } else {
                    return Err(PlacementError::insufficient_cpu(format!(
                        "need {} exclusive cpus, none available (isolated={}, adjusted shared={})",
                        req.full,
                        self.isolated.len(),
                        adjusted
                    )));
                }
            }
        }

        let mut class = req.cpu_class;
        let mut fraction = req.fraction;
        let mut reserved_fallback = false;
        if matches!(class, CpuClass::Reserved) {
            // Exclusive-reserved is not supported: fold full Reserved CPUs
            // into a fractional share.
            if !exclusive.is_empty() {
                fraction += MilliCpu::from_cpus(exclusive.len() as u32);
                exclusive = CpuSet::new();
            }
            if self.local_allocatable_reserved() < fraction {
                class = CpuClass::Normal;
                reserved_fallback = true;
            }
        }

        match class {
            CpuClass::Reserved => self.granted_reserved += fraction,
            CpuClass::Normal => self.granted_shared += fraction,
        }

        Ok(CpuAllocation {
            exclusive,
            fraction,
            class,
            reserved_fallback,
        })
    }

    /// §4.1 `allocate_memory`. Iterates tiers in the fixed order
    /// `[Pmem, Dram, Hbm]`, honoring `req.memory_type`.
    pub fn allocate_memory(&mut self, req: &Request) -> Result<BTreeMap<MemTier, u64>> {
        let mut remaining = req.memory_request_bytes;
        let mut taken: BTreeMap<MemTier, u64> = BTreeMap::new();

        for tier in req.memory_type.tiers() {
            if remaining == 0 {
                break;
            }
            let available = *self.mem.get(&tier).unwrap_or(&0);
            let take = remaining.min(available);
            if take > 0 {
                taken.insert(tier, take);
                remaining -= take;
            }
            if tier == MemTier::Pmem && !req.cold_start.is_zero() && remaining > 0 {
                return Err(PlacementError::InsufficientPMEMForColdStart(format!(
                    "cold-start request of {} bytes exceeds available PMEM ({} bytes)",
                    req.memory_request_bytes, available
                )));
            }
        }

        if remaining > 0 {
            // Roll back: nothing has been debited from self.mem yet, only
            // `taken` was computed, so there is nothing to undo here.
            return Err(PlacementError::insufficient_memory(format!(
                "{remaining} bytes unmet after exhausting allowed tiers"
            )));
        }

        for (tier, bytes) in &taken {
            *self.mem.get_mut(tier).unwrap() -= bytes;
            *self.granted_mem.entry(*tier).or_default() += bytes;
        }

        Ok(taken)
    }

    /// Used by grant expansion: release the grant's memory from its current
    /// node (elsewhere), then charge the same per-tier footprint here,
    /// verbatim.
    pub fn reallocate_memory(&mut self, per_tier: &BTreeMap<MemTier, u64>) -> Result<()> {
        for (tier, bytes) in per_tier {
            let available = *self.mem.get(tier).unwrap_or(&0);
            if available < *bytes {
                return Err(PlacementError::insufficient_memory(format!(
                    "cannot reallocate {bytes} bytes of {tier} here, only {available} free"
                )));
            }
        }
        for (tier, bytes) in per_tier {
            *self.mem.get_mut(tier).unwrap() -= bytes;
            *self.granted_mem.entry(*tier).or_default() += bytes;
        }
        Ok(())
    }

    pub fn release_cpu(&mut self, grant: &Grant) {
        self.sharable.union_with(&grant.exclusive);
        match grant.cpu_class {
            CpuClass::Reserved => self.granted_reserved -= grant.fraction,
            CpuClass::Normal => self.granted_shared -= grant.fraction,
        }
    }

    /// Reverses the debits from `allocate_memory`/`reallocate_memory`.
    /// Also clears this grant's extra-reservation entry (its subtree
    /// bookkeeping is released separately via
    /// [`Supply::release_extra_memory_reservation`] at the tree level).
    pub fn release_memory(&mut self, grant: &Grant) {
        for (tier, bytes) in &grant.memory_allocated {
            *self.mem.entry(*tier).or_default() += bytes;
            if let Some(g) = self.granted_mem.get_mut(tier) {
                *g = g.saturating_sub(*bytes);
            }
        }
        self.extra_reservations.remove(&grant.container_id);
    }

    /// §4.1 `account_allocate`/`account_release` at a node that is *not*
    /// the grant's own node: subtract (or re-add) the grant's exclusive
    /// cpuset from this node's `isolated`/`sharable` view, whichever it came
    /// from.
    pub fn account_allocate(&mut self, exclusive: &CpuSet) {
        self.isolated.subtract_with(exclusive);
        self.sharable.subtract_with(exclusive);
    }

    pub fn account_release(&mut self, exclusive: &CpuSet, originally_isolated: bool) {
        if originally_isolated {
            self.isolated.union_with(exclusive);
        } else {
            self.sharable.union_with(exclusive);
        }
    }

    pub fn set_extra_memory_reservation(&mut self, container_id: &ContainerId, per_tier: &BTreeMap<MemTier, u64>) {
        self.extra_reservations.insert(container_id.clone(), per_tier.clone());
    }

    pub fn release_extra_memory_reservation(&mut self, container_id: &ContainerId) {
        self.extra_reservations.remove(container_id);
    }

    /// Partition invariant (§8 property 1): `isolated`, `reserved`,
    /// `sharable` are pairwise disjoint.
    pub fn check_partition_invariant(&self) -> bool {
        self.isolated.is_disjoint(&self.reserved)
            && self.isolated.is_disjoint(&self.sharable)
            && self.reserved.is_disjoint(&self.sharable)
    }
}
