// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Grant lifecycle (§4.6)
//!
//! On `ContainerStarted`, a grant whose request carried a non-zero
//! `cold_start` duration has its memset narrowed to PMEM controllers only
//! and a one-shot timer scheduled; on `ColdStartDone` the memset widens
//! back to the full set its [`MemoryTypeMask`] allows. Separately,
//! `expand_memset` walks the ancestor chain looking for the first pool
//! with room when a grant's current memory node runs out, since a sibling
//! NUMA node's free DRAM is not usable without widening the memset beyond
//! the originally granted node.

use crate::infrastructure::events::ColdStartScheduler;
use topology_policy_domain::aggregates::PoolTree;
use topology_policy_domain::entities::{Grant, GrantState};
use topology_policy_domain::error::{PlacementError, Result};
use topology_policy_domain::value_objects::{MemTier, NodeId};

/// §4.6 "Cold start" step 1: narrow the grant's memset to the node's PMEM
/// controllers only. Returns `false` (and leaves the grant untouched) if
/// the grant did not ask for a cold start.
pub fn narrow_to_pmem(tree: &PoolTree, grant: &mut Grant) -> bool {
    if grant.cold_start.is_zero() {
        return false;
    }
    grant.memset = tree.node(grant.memory_node).mem_controllers_for(MemTier::Pmem).iter().copied().collect();
    true
}

/// §4.6 "Cold start" step 3: schedules the one-shot timer and records its
/// handle on the grant.
pub fn start_cold_start(grant: &mut Grant, scheduler: &ColdStartScheduler) {
    let handle = scheduler.schedule(grant.container_id.clone(), grant.cold_start);
    grant.cold_start_timer = Some(handle);
}

/// §4.6 "On `ColdStartDone`" steps 2-3: `restore_memset` widens the grant
/// back to the memory node's full controller set for its declared memory
/// type, then the timer handle is cleared.
pub fn complete_cold_start(tree: &mut PoolTree, grant: &mut Grant) -> Result<()> {
    grant.memset = tree.node(grant.memory_node).memset_for(grant.memory_type);
    grant.cold_start_timer = None;
    grant.state = GrantState::ColdStartComplete;
    Ok(())
}

/// §4.6 `expand_memset`: grows a grant's memory footprint by `extra_bytes`
/// of `tier`, walking from the grant's own node up through ancestors until
/// one has room. The grant's full per-tier footprint is then recorded as
/// an "extra reservation" on every descendant of the chosen ancestor (§4.1
/// `set_extra_memory_reservation`), so their effective-free view accounts
/// for memory actually anchored above them.
pub fn expand_memset(tree: &mut PoolTree, grant: &mut Grant, tier: MemTier, extra_bytes: u64) -> Result<()> {
    if extra_bytes == 0 {
        return Ok(());
    }

    let mut candidates = vec![grant.memory_node];
    candidates.extend(tree.ancestors(grant.memory_node));

    for candidate in candidates {
        let free = tree.node(candidate).free.effective_free(tier);
        if free >= extra_bytes as i64 {
            let supply = &mut tree.node_mut(candidate).free;
            *supply.mem.get_mut(&tier).expect("tier present after feasibility check") -= extra_bytes;
            *supply.granted_mem.entry(tier).or_default() += extra_bytes;

            *grant.memory_allocated.entry(tier).or_default() += extra_bytes;
            let mut memset = grant.memset.clone();
            for id in tree.node(candidate).mem_controllers_for(tier) {
                memset.insert(*id);
            }
            grant.memset = memset;

            let reservation = grant.memory_allocated.clone();
            for descendant in tree.descendants(candidate) {
                tree.node_mut(descendant)
                    .free
                    .set_extra_memory_reservation(&grant.container_id, &reservation);
            }

            tracing::info!(
                container = %grant.container_id,
                tier = ?tier,
                bytes = extra_bytes,
                pool = %tree.node(candidate).name,
                "expanded grant memory footprint"
            );
            return Ok(());
        }
    }

    Err(PlacementError::CannotExpand(grant.container_id.0.clone()))
}

/// §4.6 step 4: a grant's memory must follow its `exclusive` cpuset if
/// online topology changes move those specific cpu ids to a different
/// node entirely (rare; restore-by-replacement usually handles this at
/// restart instead). Left as a `NodeId`-returning lookup so the engine can
/// decide whether a move is actually necessary before paying for one.
pub fn grant_home(grant: &Grant) -> NodeId {
    grant.cpu_node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::events::StopFlag;
    use std::time::Duration;
    use topology_policy_domain::aggregates::{DiscoveredDie, DiscoveredNuma, DiscoveredSocket, DiscoveredTopology};
    use topology_policy_domain::entities::Supply;
    use topology_policy_domain::value_objects::{ContainerId, CpuClass, CpuSet, MemoryTypeMask};

    fn tree_with_pmem_and_dram() -> PoolTree {
        let mut supply = Supply::new();
        supply.sharable = CpuSet::from_ids([0, 1, 2, 3]);
        supply.mem.insert(MemTier::Pmem, 1024);
        supply.mem.insert(MemTier::Dram, 4096);
        let topo = DiscoveredTopology {
            sockets: vec![DiscoveredSocket {
                socket_id: 0,
                dies: vec![DiscoveredDie {
                    die_id: 0,
                    numas: vec![DiscoveredNuma { numa_id: 0, capacity: supply }],
                }],
            }],
        };
        PoolTree::build(&topo)
    }

    fn bare_grant() -> Grant {
        Grant {
            container_id: ContainerId("c1".to_string()),
            cpu_node: NodeId(0),
            memory_node: NodeId(0),
            exclusive: CpuSet::new(),
            exclusive_from_isolated: false,
            cpu_class: CpuClass::Normal,
            fraction: Default::default(),
            memory_type: MemoryTypeMask::ALL,
            memset: CpuSet::new(),
            memory_allocated: [(MemTier::Pmem, 512)].into_iter().collect(),
            cold_start: Duration::from_secs(5),
            cold_start_timer: None,
            state: GrantState::Applied,
            cpu_pool_name: "numa0".to_string(),
            memory_pool_name: "numa0".to_string(),
        }
    }

    #[test]
    fn schedules_and_completes_cold_start() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let scheduler = ColdStartScheduler::new(tx, StopFlag::new());
        let mut grant = bare_grant();
        start_cold_start(&mut grant, &scheduler);
        assert!(grant.cold_start_timer.is_some());

        let mut tree = tree_with_pmem_and_dram();
        complete_cold_start(&mut tree, &mut grant).unwrap();
        assert!(grant.cold_start_timer.is_none());
        assert_eq!(grant.state, GrantState::ColdStartComplete);
    }

    #[test]
    fn narrows_to_pmem_then_widens_on_cold_start_done() {
        let mut tree = tree_with_pmem_and_dram();
        // The synthetic adapter leaves controller-id sets empty by default;
        // give this node real ids so narrowing/widening is observable.
        tree.node_mut(NodeId(0)).mem_controllers.insert(MemTier::Pmem, [10].into_iter().collect());
        tree.node_mut(NodeId(0)).mem_controllers.insert(MemTier::Dram, [20].into_iter().collect());

        let mut grant = bare_grant();
        grant.memory_type = MemoryTypeMask::ALL;
        grant.memset = tree.node(NodeId(0)).memset_for(MemoryTypeMask::ALL);
        assert!(grant.memset.contains(10) && grant.memset.contains(20));

        assert!(narrow_to_pmem(&tree, &mut grant));
        assert_eq!(grant.memset, CpuSet::from_ids([10]));

        complete_cold_start(&mut tree, &mut grant).unwrap();
        assert_eq!(grant.memset, CpuSet::from_ids([10, 20]));
        assert_eq!(grant.state, GrantState::ColdStartComplete);
    }

    #[test]
    fn narrow_to_pmem_is_noop_without_cold_start() {
        let tree = tree_with_pmem_and_dram();
        let mut grant = bare_grant();
        grant.cold_start = Duration::ZERO;
        let original = grant.memset.clone();
        assert!(!narrow_to_pmem(&tree, &mut grant));
        assert_eq!(grant.memset, original);
    }

    #[test]
    fn expand_memset_pulls_from_dram() {
        let mut tree = tree_with_pmem_and_dram();
        let mut grant = bare_grant();
        expand_memset(&mut tree, &mut grant, MemTier::Dram, 1024).unwrap();
        assert_eq!(grant.memory_allocated.get(&MemTier::Dram), Some(&1024));
    }

    #[test]
    fn expand_memset_records_reservation_on_descendants() {
        // Two NUMA nodes under one socket: the socket is the only ancestor
        // with room, so the reservation must land on both NUMA descendants.
        let mut numa0 = Supply::new();
        numa0.mem.insert(MemTier::Dram, 100); // too little on its own; must climb to the socket
        let mut numa1 = Supply::new();
        numa1.mem.insert(MemTier::Dram, 512);
        let topo = DiscoveredTopology {
            sockets: vec![DiscoveredSocket {
                socket_id: 0,
                dies: vec![DiscoveredDie {
                    die_id: 0,
                    numas: vec![
                        DiscoveredNuma { numa_id: 0, capacity: numa0 },
                        DiscoveredNuma { numa_id: 1, capacity: numa1 },
                    ],
                }],
            }],
        };
        let mut tree = PoolTree::build(&topo);
        let socket_id = tree.root();
        let numa0_id = tree.iter().find(|n| n.numas == vec![0]).unwrap().id;
        let numa1_id = tree.iter().find(|n| n.numas == vec![1]).unwrap().id;

        let mut grant = bare_grant();
        grant.memory_node = numa0_id;
        grant.memory_allocated = [(MemTier::Dram, 512)].into_iter().collect();

        expand_memset(&mut tree, &mut grant, MemTier::Dram, 200).unwrap();

        assert_eq!(grant.memory_node, numa0_id, "expand only moves the memory charge, not the grant's node field here");
        assert!(tree.node(numa0_id).free.extra_reservations.contains_key(&grant.container_id));
        assert!(tree.node(numa1_id).free.extra_reservations.contains_key(&grant.container_id));
        assert!(!tree.node(socket_id).free.extra_reservations.contains_key(&grant.container_id));
    }
}
