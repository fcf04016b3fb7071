// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pod/Container cache port
//!
//! The pod/container cache is an external collaborator (§1, §6): it feeds
//! container metadata into [`crate::request::ContainerMeta`] and receives
//! the engine's final cpuset/shares writes back. Modeled as a single async
//! port the way the teacher's infrastructure-facing services are.

use crate::request::ContainerMeta;
use crate::value_objects::{ContainerId, CpuSet, PodId};
use async_trait::async_trait;

/// One explicit affinity declaration (§4.8): `scope`/`match_expr` are
/// label or annotation predicates the cache itself knows how to evaluate;
/// the engine only consumes the resulting per-container weight.
#[derive(Debug, Clone)]
pub struct AffinityExpr {
    pub scope: String,
    pub match_expr: String,
    pub weight: i32,
}

#[async_trait]
pub trait ContainerCache: Send + Sync {
    /// Container metadata, with annotations already resolved through the
    /// container → pod → bare → default priority (§4.3 last paragraph).
    async fn container_meta(&self, id: &ContainerId) -> crate::error::Result<ContainerMeta>;

    async fn pod_of(&self, id: &ContainerId) -> crate::error::Result<PodId>;

    /// All containers currently believed to belong to the same pod,
    /// consulted by the implicit pod-colocation affinity rule (§4.8).
    async fn containers_in_pod(&self, pod: &PodId) -> crate::error::Result<Vec<ContainerId>>;

    /// Explicit affinity declarations for a container (§4.8 "Explicit").
    async fn affinities(&self, id: &ContainerId) -> crate::error::Result<Vec<AffinityExpr>>;

    /// Evaluates one affinity expression against the cache's current
    /// label/annotation state, returning a weight per matching container
    /// (excluding `self_id`, per §4.8).
    async fn evaluate_affinity(
        &self,
        self_id: &ContainerId,
        expr: &AffinityExpr,
    ) -> crate::error::Result<std::collections::BTreeMap<ContainerId, i32>>;

    async fn set_cpuset_cpus(&self, id: &ContainerId, cpus: &CpuSet) -> crate::error::Result<()>;

    async fn set_cpuset_mems(&self, id: &ContainerId, mems: &CpuSet) -> crate::error::Result<()>;

    async fn set_cpu_shares(&self, id: &ContainerId, shares: u64) -> crate::error::Result<()>;
}
