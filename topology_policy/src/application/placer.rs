// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Placer (§4.5)
//!
//! Picks the best pool for a [`Request`] by scoring every candidate node in
//! the tree (§4.4) and committing the winner's allocation. CPU accounting at
//! ancestors/descendants of the chosen node is a view correction, not a
//! capacity check — the chosen node's own `Supply` is the source of truth,
//! same split of responsibility the domain crate's `Supply` doc comment
//! describes for the tree.

use std::collections::BTreeMap;
use topology_policy_domain::aggregates::PoolTree;
use topology_policy_domain::entities::{Grant, GrantState, Supply};
use topology_policy_domain::error::{PlacementError, Result};
use topology_policy_domain::request::Request;
use topology_policy_domain::score::Score;
use topology_policy_domain::value_objects::{ContainerId, MemTier, MilliCpu, NodeId};

/// §4.5 `allocate_pool`: scores every node, optionally moves `hint_pool_name`
/// to the front of the ranking when it is still feasible (step 5), then
/// commits the first candidate in order whose CPU+memory allocation actually
/// succeeds (step 6) — a per-pool fit failure tries the next candidate
/// rather than failing the whole request. Returns the resulting [`Grant`]
/// (still in [`GrantState::Created`] — [`apply_grant`] moves it to
/// `Applied`).
pub fn allocate_pool(
    tree: &mut PoolTree,
    container_id: &ContainerId,
    request: &Request,
    grants: &BTreeMap<ContainerId, Grant>,
    affinities: &BTreeMap<NodeId, i32>,
    hint_pool_name: Option<&str>,
) -> Result<Grant> {
    let mut ranked = rank_pools(tree, request, grants, affinities);
    if ranked.is_empty() || ranked[0].1.is_infeasible() {
        return Err(PlacementError::insufficient_cpu("no pool in the tree can satisfy the request"));
    }

    if let Some(hint) = hint_pool_name {
        if let Some(pos) = ranked
            .iter()
            .position(|(id, score)| !score.is_infeasible() && tree.node(*id).name == hint)
        {
            let candidate = ranked.remove(pos);
            ranked.insert(0, candidate);
        }
    }

    let mut last_fit_error = None;
    for (candidate, score) in &ranked {
        if score.is_infeasible() {
            break;
        }
        match try_allocate_at(tree, container_id, request, *candidate) {
            Ok(grant) => return Ok(grant),
            Err(e) if e.is_per_pool_fit_failure() => {
                last_fit_error = Some(e);
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_fit_error.unwrap_or_else(|| PlacementError::insufficient_cpu("no feasible pool could fit the request")))
}

/// Commits CPU and memory allocation at a single already-scored node.
fn try_allocate_at(tree: &mut PoolTree, container_id: &ContainerId, request: &Request, chosen: NodeId) -> Result<Grant> {
    let ancestors = tree.ancestors(chosen);
    let ancestor_supplies: Vec<&Supply> = ancestors.iter().map(|id| &tree.node(*id).free).collect();
    let allocation = tree.node_mut(chosen).free.allocate_cpu(request, &ancestor_supplies)?;

    let memory_allocated = match tree.node_mut(chosen).free.allocate_memory(request) {
        Ok(m) => m,
        Err(e) => {
            // Roll back the CPU debit taken above before surfacing the error.
            undo_cpu_allocation(tree, chosen, &allocation.exclusive, allocation.class, allocation.fraction);
            return Err(e);
        }
    };

    let exclusive_from_isolated = request.isolate && !allocation.exclusive.is_empty();
    propagate_exclusive_allocate(tree, chosen, &allocation.exclusive);
    propagate_memory_debit(tree, chosen, &memory_allocated);

    let memset = tree.node(chosen).memset_for(request.memory_type);

    Ok(Grant {
        container_id: container_id.clone(),
        cpu_node: chosen,
        memory_node: chosen,
        exclusive: allocation.exclusive,
        exclusive_from_isolated,
        cpu_class: allocation.class,
        fraction: allocation.fraction,
        memory_type: request.memory_type,
        memset,
        memory_allocated,
        cold_start: request.cold_start,
        cold_start_timer: None,
        state: GrantState::Created,
        cpu_pool_name: tree.node(chosen).name.clone(),
        memory_pool_name: tree.node(chosen).name.clone(),
    })
}

/// §4.5 `apply_grant`: marks a freshly created grant as applied. Writing
/// the cpuset to the container runtime is the caller's job (via
/// [`topology_policy_domain::services::CpusetWriter`]) since that is an I/O
/// boundary the domain crate does not cross.
pub fn apply_grant(grant: &mut Grant) {
    grant.state = GrantState::Applied;
}

/// §4.5 `release_pool`: reverses a grant's CPU and memory accounting
/// everywhere it was charged, including the extra-memory-reservation
/// bookkeeping `expand_memset` left on every descendant of the grant's
/// memory node.
pub fn release_pool(tree: &mut PoolTree, grant: &Grant) {
    tree.node_mut(grant.cpu_node).free.release_cpu(grant);
    tree.node_mut(grant.memory_node).free.release_memory(grant);
    propagate_exclusive_release(tree, grant.cpu_node, &grant.exclusive, grant.exclusive_from_isolated);
    propagate_memory_credit(tree, grant.memory_node, &grant.memory_allocated);
    for descendant in tree.descendants(grant.memory_node) {
        tree.node_mut(descendant).free.release_extra_memory_reservation(&grant.container_id);
    }
}

/// §4.5 `update_shared_allocations`: recomputes the ancestor-adjusted
/// shared bound is implicit in `Supply::ancestor_adjusted_allocatable_shared`,
/// but online topology changes (isolated cpus toggled by the system
/// adapter) move individual ids between `isolated` and `sharable` without
/// touching `granted_shared`/`granted_reserved`. This walks the tree and
/// re-derives each node's `sharable`/`isolated` partition from the freshly
/// discovered sets, leaving grant counters untouched.
pub fn update_shared_allocations(tree: &mut PoolTree, discovered_isolated: &topology_policy_domain::value_objects::CpuSet) {
    for node in 0..tree.len() {
        let id = NodeId(node as u32);
        let full = tree.node(id).full_cpuset();
        let new_isolated = topology_policy_domain::value_objects::CpuSet::from_ids(
            full.iter().filter(|cpu| discovered_isolated.contains(*cpu)),
        );
        if new_isolated.len() == full.len() || new_isolated.len() == tree.node(id).free.isolated.len() {
            continue;
        }
        let reserved = tree.node(id).capacity.reserved.clone();
        let new_sharable = full.difference(&new_isolated).difference(&reserved);
        let supply = &mut tree.node_mut(id).free;
        supply.isolated = new_isolated;
        supply.sharable = new_sharable;
    }
}

/// §4.4: scores every node that can at least physically hold the request's
/// memory footprint, then sorts the candidates best-first via
/// [`Score::better_than`]. Infeasible candidates sort after every feasible
/// one but are still returned, so a caller checking `ranked[0]` can tell
/// "no pool fits" apart from "tree is empty".
fn rank_pools(
    tree: &PoolTree,
    request: &Request,
    grants: &BTreeMap<ContainerId, Grant>,
    affinities: &BTreeMap<NodeId, i32>,
) -> Vec<(NodeId, Score)> {
    let prefers_shared = !request.isolate;
    let has_topology_hints = !request.topology_hints.is_empty();

    let mut scored: Vec<(NodeId, Score)> = Vec::new();
    for node in tree.iter() {
        if !memory_fits(tree, node.id, request) {
            continue;
        }
        let ancestors = tree.ancestors(node.id);
        let ancestor_supplies: Vec<&Supply> = ancestors.iter().map(|id| &tree.node(*id).free).collect();
        let free = &node.free;

        let isolated_after = MilliCpu::from_cpus(free.isolated.len() as u32)
            - if request.isolate {
                MilliCpu::from_cpus(request.full)
            } else {
                MilliCpu::ZERO
            };
        let adjusted_shared = free.ancestor_adjusted_allocatable_shared(&ancestor_supplies);
        let requested_shared = request.fraction
            + if !request.isolate {
                MilliCpu::from_cpus(request.full)
            } else {
                MilliCpu::ZERO
            };
        let shared_after = adjusted_shared - requested_shared;
        let reserved_after = free.local_allocatable_reserved() - request.fraction;

        let hints: BTreeMap<String, f64> = request
            .topology_hints
            .iter()
            .map(|(provider, hint)| (provider.clone(), tree.hint_score(node.id, hint)))
            .collect();

        let colocated = grants
            .values()
            .filter(|g| g.cpu_node == node.id && g.cpu_class == request.cpu_class)
            .count() as u32;
        let affinity = affinities.get(&node.id).copied().unwrap_or(0) as f64;

        let score = Score {
            isolated: isolated_after,
            reserved: reserved_after,
            shared: shared_after,
            colocated,
            hints,
            affinity,
            wants_isolated: request.isolate,
            prefers_shared,
            has_topology_hints,
            depth: node.depth,
            node_id: node.id.0,
        };

        scored.push((node.id, score));
    }

    scored.sort_by(|(_, a), (_, b)| {
        if a.better_than(b) {
            std::cmp::Ordering::Less
        } else if b.better_than(a) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
    scored
}

fn memory_fits(tree: &PoolTree, id: NodeId, request: &Request) -> bool {
    if request.memory_request_bytes == 0 {
        return true;
    }
    let node = tree.node(id);
    let available: i64 = request
        .memory_type
        .tiers()
        .map(|tier| node.free.effective_free(tier))
        .sum();
    available >= request.memory_request_bytes as i64
}

fn undo_cpu_allocation(
    tree: &mut PoolTree,
    chosen: NodeId,
    exclusive: &topology_policy_domain::value_objects::CpuSet,
    class: topology_policy_domain::value_objects::CpuClass,
    fraction: MilliCpu,
) {
    use topology_policy_domain::value_objects::CpuClass;
    let supply = &mut tree.node_mut(chosen).free;
    supply.sharable.union_with(exclusive);
    match class {
        CpuClass::Reserved => supply.granted_reserved -= fraction,
        CpuClass::Normal => supply.granted_shared -= fraction,
    }
}

fn propagate_exclusive_allocate(tree: &mut PoolTree, chosen: NodeId, exclusive: &topology_policy_domain::value_objects::CpuSet) {
    if exclusive.is_empty() {
        return;
    }
    for other in related_nodes(tree, chosen) {
        tree.node_mut(other).free.account_allocate(exclusive);
    }
}

fn propagate_exclusive_release(
    tree: &mut PoolTree,
    chosen: NodeId,
    exclusive: &topology_policy_domain::value_objects::CpuSet,
    originally_isolated: bool,
) {
    if exclusive.is_empty() {
        return;
    }
    for other in related_nodes(tree, chosen) {
        tree.node_mut(other).free.account_release(exclusive, originally_isolated);
    }
}

fn propagate_memory_debit(tree: &mut PoolTree, chosen: NodeId, taken: &BTreeMap<MemTier, u64>) {
    for ancestor in tree.ancestors(chosen) {
        let supply = &mut tree.node_mut(ancestor).free;
        for (tier, bytes) in taken {
            if let Some(m) = supply.mem.get_mut(tier) {
                *m = m.saturating_sub(*bytes);
            }
            *supply.granted_mem.entry(*tier).or_default() += bytes;
        }
    }
}

fn propagate_memory_credit(tree: &mut PoolTree, chosen: NodeId, taken: &BTreeMap<MemTier, u64>) {
    for ancestor in tree.ancestors(chosen) {
        let supply = &mut tree.node_mut(ancestor).free;
        for (tier, bytes) in taken {
            *supply.mem.entry(*tier).or_default() += bytes;
            if let Some(g) = supply.granted_mem.get_mut(tier) {
                *g = g.saturating_sub(*bytes);
            }
        }
    }
}

/// Every node that is an ancestor or a descendant of `chosen` (never
/// `chosen` itself): the set of nodes whose cumulated `free` view needs a
/// correction when `chosen`'s own state changes.
fn related_nodes(tree: &PoolTree, chosen: NodeId) -> Vec<NodeId> {
    let mut out = tree.ancestors(chosen);
    for node in tree.iter() {
        if node.id != chosen && tree.ancestors(node.id).contains(&chosen) {
            out.push(node.id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_policy_domain::aggregates::{DiscoveredDie, DiscoveredNuma, DiscoveredSocket, DiscoveredTopology};
    use topology_policy_domain::value_objects::{CpuClass, CpuSet, MemoryTypeMask};

    fn numa(id: u32, cpus: &[u32], dram: u64) -> DiscoveredNuma {
        let mut supply = Supply::new();
        supply.sharable = CpuSet::from_ids(cpus.iter().copied());
        supply.mem.insert(MemTier::Dram, dram);
        DiscoveredNuma { numa_id: id, capacity: supply }
    }

    fn single_socket_tree() -> PoolTree {
        let topo = DiscoveredTopology {
            sockets: vec![DiscoveredSocket {
                socket_id: 0,
                dies: vec![DiscoveredDie {
                    die_id: 0,
                    numas: vec![numa(0, &[0, 1, 2, 3], 8 * 1024 * 1024 * 1024)],
                }],
            }],
        };
        PoolTree::build(&topo)
    }

    fn guaranteed_request(full: u32, fraction: i64, isolate: bool) -> Request {
        Request {
            full,
            fraction: MilliCpu(fraction),
            isolate,
            cpu_class: CpuClass::Normal,
            memory_request_bytes: 0,
            memory_limit_bytes: 0,
            memory_type: MemoryTypeMask::ALL,
            cold_start: std::time::Duration::ZERO,
            topology_hints: Default::default(),
        }
    }

    #[test]
    fn allocates_exclusive_cpus_from_sharable() {
        let mut tree = single_socket_tree();
        let request = guaranteed_request(2, 0, true);
        let grant = allocate_pool(
            &mut tree,
            &ContainerId("c1".to_string()),
            &request,
            &BTreeMap::new(),
            &BTreeMap::new(),
            None,
        )
        .unwrap();
        assert_eq!(grant.exclusive.len(), 2);
        assert_eq!(tree.node(tree.root()).free.sharable.len(), 2);
    }

    #[test]
    fn release_restores_capacity() {
        let mut tree = single_socket_tree();
        let request = guaranteed_request(2, 0, true);
        let grant = allocate_pool(
            &mut tree,
            &ContainerId("c1".to_string()),
            &request,
            &BTreeMap::new(),
            &BTreeMap::new(),
            None,
        )
        .unwrap();
        release_pool(&mut tree, &grant);
        assert_eq!(tree.node(tree.root()).free.sharable.len(), 4);
    }

    #[test]
    fn insufficient_cpu_is_rejected() {
        let mut tree = single_socket_tree();
        let request = guaranteed_request(10, 0, true);
        let result = allocate_pool(
            &mut tree,
            &ContainerId("c1".to_string()),
            &request,
            &BTreeMap::new(),
            &BTreeMap::new(),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn hint_pool_name_wins_when_feasible() {
        let topo = DiscoveredTopology {
            sockets: vec![DiscoveredSocket {
                socket_id: 0,
                dies: vec![DiscoveredDie {
                    die_id: 0,
                    numas: vec![
                        numa(0, &[0, 1, 2, 3], 8 * 1024 * 1024 * 1024),
                        numa(1, &[4, 5, 6, 7], 8 * 1024 * 1024 * 1024),
                    ],
                }],
            }],
        };
        let mut tree = PoolTree::build(&topo);
        let numa1 = tree.iter().find(|n| n.name == "numa1").unwrap().id;
        let hint_name = tree.node(numa1).name.clone();

        let request = guaranteed_request(2, 0, true);
        let grant = allocate_pool(
            &mut tree,
            &ContainerId("c1".to_string()),
            &request,
            &BTreeMap::new(),
            &BTreeMap::new(),
            Some(&hint_name),
        )
        .unwrap();
        assert_eq!(grant.cpu_pool_name, hint_name);
    }
}
