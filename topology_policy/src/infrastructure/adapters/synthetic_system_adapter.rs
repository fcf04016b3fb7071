// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Synthetic system adapter (§4.12)
//!
//! Hardware enumeration via sysfs is out of scope (§1); this adapter
//! builds a [`DiscoveredTopology`] from a declarative description instead,
//! for tests, demos, and any deployment that already knows its own
//! topology (e.g. from a config map) rather than discovering it live.

use async_trait::async_trait;
use topology_policy_domain::aggregates::DiscoveredTopology;
use topology_policy_domain::error::Result;
use topology_policy_domain::services::SystemAdapter;
use topology_policy_domain::value_objects::CpuSet;

pub struct SyntheticSystemAdapter {
    topology: DiscoveredTopology,
    isolated_cpus: CpuSet,
    has_movable_pmem: bool,
}

impl SyntheticSystemAdapter {
    pub fn new(topology: DiscoveredTopology, isolated_cpus: CpuSet, has_movable_pmem: bool) -> Self {
        Self {
            topology,
            isolated_cpus,
            has_movable_pmem,
        }
    }
}

#[async_trait]
impl SystemAdapter for SyntheticSystemAdapter {
    async fn discover_topology(&self) -> Result<DiscoveredTopology> {
        Ok(self.topology.clone())
    }

    async fn isolated_cpus(&self) -> Result<CpuSet> {
        Ok(self.isolated_cpus.clone())
    }

    async fn has_movable_pmem(&self) -> Result<bool> {
        Ok(self.has_movable_pmem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_policy_domain::aggregates::{DiscoveredDie, DiscoveredNuma, DiscoveredSocket};
    use topology_policy_domain::entities::Supply;

    #[tokio::test]
    async fn returns_the_configured_topology_verbatim() {
        let mut supply = Supply::new();
        supply.sharable = CpuSet::from_ids([0, 1]);
        let topo = DiscoveredTopology {
            sockets: vec![DiscoveredSocket {
                socket_id: 0,
                dies: vec![DiscoveredDie {
                    die_id: 0,
                    numas: vec![DiscoveredNuma { numa_id: 0, capacity: supply }],
                }],
            }],
        };
        let adapter = SyntheticSystemAdapter::new(topo, CpuSet::new(), true);
        let discovered = adapter.discover_topology().await.unwrap();
        assert_eq!(discovered.sockets.len(), 1);
        assert!(adapter.has_movable_pmem().await.unwrap());
    }
}
