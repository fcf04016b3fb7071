// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-memory pod/container cache
//!
//! A test-double implementation of [`ContainerCache`] (§6). The real
//! collaborator talks to the container runtime interface; this one is a
//! plain in-memory map, the way the teacher's infrastructure adapters
//! pair a concrete implementation with the domain-defined port trait.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use topology_policy_domain::error::{PlacementError, Result};
use topology_policy_domain::request::ContainerMeta;
use topology_policy_domain::services::{AffinityExpr, ContainerCache};
use topology_policy_domain::value_objects::{ContainerId, CpuSet, PodId};

#[derive(Default)]
struct State {
    meta: BTreeMap<ContainerId, ContainerMeta>,
    pod: BTreeMap<ContainerId, PodId>,
    affinities: BTreeMap<ContainerId, Vec<AffinityExpr>>,
    last_cpus: BTreeMap<ContainerId, CpuSet>,
    last_mems: BTreeMap<ContainerId, CpuSet>,
    last_shares: BTreeMap<ContainerId, u64>,
}

#[derive(Default)]
pub struct InMemoryContainerCache {
    state: RwLock<State>,
}

impl InMemoryContainerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ContainerId, pod: PodId, meta: ContainerMeta) {
        let mut state = self.state.write();
        state.pod.insert(id.clone(), pod);
        state.meta.insert(id, meta);
    }

    pub fn set_affinities(&self, id: ContainerId, expr: Vec<AffinityExpr>) {
        self.state.write().affinities.insert(id, expr);
    }

    pub fn last_written_cpus(&self, id: &ContainerId) -> Option<CpuSet> {
        self.state.read().last_cpus.get(id).cloned()
    }
}

#[async_trait]
impl ContainerCache for InMemoryContainerCache {
    async fn container_meta(&self, id: &ContainerId) -> Result<ContainerMeta> {
        self.state
            .read()
            .meta
            .get(id)
            .cloned()
            .ok_or_else(|| PlacementError::ContainerNotFound(id.0.clone()))
    }

    async fn pod_of(&self, id: &ContainerId) -> Result<PodId> {
        self.state
            .read()
            .pod
            .get(id)
            .cloned()
            .ok_or_else(|| PlacementError::ContainerNotFound(id.0.clone()))
    }

    async fn containers_in_pod(&self, pod: &PodId) -> Result<Vec<ContainerId>> {
        Ok(self
            .state
            .read()
            .pod
            .iter()
            .filter(|(_, p)| *p == pod)
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn affinities(&self, id: &ContainerId) -> Result<Vec<AffinityExpr>> {
        Ok(self.state.read().affinities.get(id).cloned().unwrap_or_default())
    }

    async fn evaluate_affinity(
        &self,
        self_id: &ContainerId,
        expr: &AffinityExpr,
    ) -> Result<BTreeMap<ContainerId, i32>> {
        // Test double: every other registered container matches with the
        // expression's weight. Real adapters evaluate label/annotation
        // predicates against `expr.scope`/`expr.match_expr`.
        let state = self.state.read();
        Ok(state
            .meta
            .keys()
            .filter(|id| *id != self_id)
            .map(|id| (id.clone(), expr.weight))
            .collect())
    }

    async fn set_cpuset_cpus(&self, id: &ContainerId, cpus: &CpuSet) -> Result<()> {
        self.state.write().last_cpus.insert(id.clone(), cpus.clone());
        Ok(())
    }

    async fn set_cpuset_mems(&self, id: &ContainerId, mems: &CpuSet) -> Result<()> {
        self.state.write().last_mems.insert(id.clone(), mems.clone());
        Ok(())
    }

    async fn set_cpu_shares(&self, id: &ContainerId, shares: u64) -> Result<()> {
        self.state.write().last_shares.insert(id.clone(), shares);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_policy_domain::request::ExplicitBool;
    use topology_policy_domain::value_objects::QosClass;

    fn meta() -> ContainerMeta {
        ContainerMeta {
            namespace: "default".to_string(),
            qos: QosClass::Guaranteed,
            cpu_request_milli: 1000,
            memory_request_bytes: 0,
            memory_limit_bytes: 0,
            topology_hints: Default::default(),
            prefer_isolated: ExplicitBool::unset(true),
            prefer_shared: ExplicitBool::unset(false),
            memory_type: None,
            cold_start: None,
            avx512: false,
        }
    }

    #[tokio::test]
    async fn registered_container_is_retrievable() {
        let cache = InMemoryContainerCache::new();
        cache.register(ContainerId("a".to_string()), PodId("p".to_string()), meta());
        let got = cache.container_meta(&ContainerId("a".to_string())).await.unwrap();
        assert_eq!(got.namespace, "default");
    }

    #[tokio::test]
    async fn missing_container_is_an_error() {
        let cache = InMemoryContainerCache::new();
        assert!(cache.container_meta(&ContainerId("ghost".to_string())).await.is_err());
    }
}
