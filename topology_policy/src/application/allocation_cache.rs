// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Allocation cache (§4.7)
//!
//! Persists committed grants as [`GrantRecord`]s and restores them on
//! restart: verbatim when the named pool still has room for the exact
//! cpuset/memset recorded, falling back to a fresh placement (still
//! favoring the originally recorded pool) otherwise.

use crate::application::placer;
use std::collections::BTreeMap;
use std::str::FromStr;
use topology_policy_domain::aggregates::PoolTree;
use topology_policy_domain::entities::{Grant, GrantState};
use topology_policy_domain::error::{PlacementError, Result};
use topology_policy_domain::request::Request;
use topology_policy_domain::services::{AllocationCacheStore, GrantRecord};
use topology_policy_domain::value_objects::{ContainerId, CpuSet, NodeId};

/// §4.7 persist: snapshot every grant as a [`GrantRecord`] and hand the
/// whole map to the store in one write.
pub async fn persist(
    store: &dyn AllocationCacheStore,
    config: &topology_policy_domain::config::Config,
    grants: &BTreeMap<ContainerId, Grant>,
) -> Result<()> {
    let records: BTreeMap<ContainerId, GrantRecord> = grants
        .iter()
        .map(|(id, grant)| (id.clone(), to_record(grant)))
        .collect();
    store.save_allocations(&records).await?;
    store.save_config(config).await?;
    Ok(())
}

fn to_record(grant: &Grant) -> GrantRecord {
    GrantRecord {
        container_cache_id: grant.container_id.0.clone(),
        exclusive_cpuset: grant.exclusive.to_range_string(),
        fraction_milli: grant.fraction.0,
        cpu_class: grant.cpu_class,
        cpu_pool_name: grant.cpu_pool_name.clone(),
        memory_pool_name: grant.memory_pool_name.clone(),
        memory_type: grant.memory_type,
        memset: grant.memset.to_range_string(),
        memory_allocated: grant.memory_allocated.clone(),
        cold_start: grant.cold_start,
    }
}

/// §4.7 restore: attempts a verbatim reinstatement of every record against
/// the freshly discovered tree, falling back to restore-by-replacement for
/// any record whose pool no longer exists or no longer has room.
pub fn restore(
    tree: &mut PoolTree,
    records: &BTreeMap<ContainerId, GrantRecord>,
) -> BTreeMap<ContainerId, Grant> {
    let mut grants = BTreeMap::new();
    for (id, record) in records {
        match restore_verbatim(tree, id, record) {
            Ok(grant) => {
                grants.insert(id.clone(), grant);
            }
            Err(e) => {
                tracing::warn!(container = %id, error = %e, "verbatim reinstatement failed, retrying by replacement");
                match restore_by_replacement(tree, id, record, &grants) {
                    Ok(grant) => {
                        grants.insert(id.clone(), grant);
                    }
                    Err(e) => {
                        tracing::error!(container = %id, error = %e, "restore by replacement failed, dropping grant");
                    }
                }
            }
        }
    }
    grants
}

/// §4.7 "restore verbatim": re-charge the exact recorded cpuset/memset
/// against the pool of the same name, if it still exists and the ids are
/// still free there.
fn restore_verbatim(tree: &mut PoolTree, id: &ContainerId, record: &GrantRecord) -> Result<Grant> {
    let node_id = find_node_by_name(tree, &record.cpu_pool_name)
        .ok_or_else(|| PlacementError::ReinstateFailed(format!("no pool named {:?}", record.cpu_pool_name)))?;

    let exclusive = CpuSet::from_str(&record.exclusive_cpuset)
        .map_err(|e| PlacementError::CacheRestoreMismatch(format!("bad exclusive cpuset: {e}")))?;
    let memset = CpuSet::from_str(&record.memset)
        .map_err(|e| PlacementError::CacheRestoreMismatch(format!("bad memset: {e}")))?;

    {
        let node = tree.node(node_id);
        let still_free = node.free.isolated.union(&node.free.sharable);
        if !exclusive.is_empty() && !exclusive.difference(&still_free).is_empty() {
            // At least one recorded id is already granted elsewhere at this
            // node; this path is conservative and simply fails over to
            // restore-by-replacement rather than guessing who owns it.
            return Err(PlacementError::ReinstateFailed("recorded cpuset no longer free".to_string()));
        }
        for (tier, bytes) in &record.memory_allocated {
            let free = node.free.mem.get(tier).copied().unwrap_or(0);
            if free < *bytes {
                return Err(PlacementError::ReinstateFailed(format!(
                    "recorded {tier} allocation of {bytes} bytes no longer fits"
                )));
            }
        }
    }

    let node = tree.node_mut(node_id);
    node.free.isolated.subtract_with(&exclusive);
    node.free.sharable.subtract_with(&exclusive);
    match record.cpu_class {
        topology_policy_domain::value_objects::CpuClass::Reserved => {
            node.free.granted_reserved += record.fraction()
        }
        topology_policy_domain::value_objects::CpuClass::Normal => node.free.granted_shared += record.fraction(),
    }
    for (tier, bytes) in &record.memory_allocated {
        *node.free.mem.get_mut(tier).unwrap() -= bytes;
        *node.free.granted_mem.entry(*tier).or_default() += bytes;
    }

    Ok(Grant {
        container_id: id.clone(),
        cpu_node: node_id,
        memory_node: node_id,
        exclusive,
        exclusive_from_isolated: false,
        cpu_class: record.cpu_class,
        fraction: record.fraction(),
        memory_type: record.memory_type,
        memset,
        memory_allocated: record.memory_allocated.clone(),
        cold_start: record.cold_start,
        cold_start_timer: None,
        state: GrantState::Applied,
        cpu_pool_name: record.cpu_pool_name.clone(),
        memory_pool_name: record.memory_pool_name.clone(),
    })
}

/// §4.7 "restore by replacement": re-derive a request from the recorded
/// shape and place it fresh, biasing toward the originally recorded pool
/// via an affinity bonus so the container tends to land back where it was.
fn restore_by_replacement(
    tree: &mut PoolTree,
    id: &ContainerId,
    record: &GrantRecord,
    grants: &BTreeMap<ContainerId, Grant>,
) -> Result<Grant> {
    let request = Request {
        full: CpuSet::from_str(&record.exclusive_cpuset).map(|s| s.len() as u32).unwrap_or(0),
        fraction: record.fraction(),
        isolate: !record.exclusive_cpuset.is_empty(),
        cpu_class: record.cpu_class,
        memory_request_bytes: record.memory_allocated.values().sum(),
        memory_limit_bytes: 0,
        memory_type: record.memory_type,
        cold_start: std::time::Duration::ZERO,
        topology_hints: Default::default(),
    };

    placer::allocate_pool(tree, id, &request, grants, &BTreeMap::new(), Some(&record.cpu_pool_name)).map_err(|e| {
        PlacementError::ReplacementFailed(format!("{e}"))
    })
}

fn find_node_by_name(tree: &PoolTree, name: &str) -> Option<NodeId> {
    tree.iter().find(|n| n.name == name).map(|n| n.id)
}

/// §4.7 `rebalance`: re-evaluates every grant against the current tree and
/// relocates any whose current pool is no longer a feasible fit.
pub fn rebalance(tree: &mut PoolTree, grants: &mut BTreeMap<ContainerId, Grant>) {
    let ids: Vec<ContainerId> = grants.keys().cloned().collect();
    for id in ids {
        let Some(grant) = grants.get(&id) else { continue };
        let full = tree.node(grant.cpu_node).full_cpuset();
        let still_hosted = grant.exclusive.is_empty() || grant.exclusive.difference(&full).is_empty();
        if still_hosted {
            continue;
        }
        tracing::info!(container = %id, "rebalancing grant off a pool that can no longer host it");
        let grant = grants.remove(&id).unwrap();
        placer::release_pool(tree, &grant);
        let record = to_record(&grant);
        match restore_by_replacement(tree, &id, &record, grants) {
            Ok(new_grant) => {
                grants.insert(id, new_grant);
            }
            Err(e) => tracing::error!(container = %id, error = %e, "rebalance could not find a new pool"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_policy_domain::aggregates::{DiscoveredDie, DiscoveredNuma, DiscoveredSocket, DiscoveredTopology};
    use topology_policy_domain::entities::Supply;
    use topology_policy_domain::value_objects::{CpuClass, MemoryTypeMask};

    fn tree() -> PoolTree {
        let mut supply = Supply::new();
        supply.sharable = CpuSet::from_ids([0, 1, 2, 3]);
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

    fn record() -> GrantRecord {
        GrantRecord {
            container_cache_id: "c1".to_string(),
            exclusive_cpuset: "0-1".to_string(),
            fraction_milli: 0,
            cpu_class: CpuClass::Normal,
            cpu_pool_name: "numa0".to_string(),
            memory_pool_name: "numa0".to_string(),
            memory_type: MemoryTypeMask::ALL,
            memset: "".to_string(),
            memory_allocated: Default::default(),
            cold_start: std::time::Duration::ZERO,
        }
    }

    #[test]
    fn restores_verbatim_when_pool_still_has_room() {
        let mut t = tree();
        let grant = restore_verbatim(&mut t, &ContainerId("c1".to_string()), &record()).unwrap();
        assert_eq!(grant.exclusive.len(), 2);
        assert_eq!(t.node(t.root()).free.sharable.len(), 2);
    }

    #[test]
    fn falls_back_to_replacement_when_pool_is_gone() {
        let mut t = tree();
        let mut r = record();
        r.cpu_pool_name = "ghost".to_string();
        let grants = BTreeMap::new();
        let result = restore_by_replacement(&mut t, &ContainerId("c1".to_string()), &r, &grants);
        assert!(result.is_ok());
    }
}
