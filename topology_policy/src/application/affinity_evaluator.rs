// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # AffinityEvaluator (§4.8)
//!
//! Combines explicit, container-declared affinities with implicit
//! engine-registered rules (pod colocation, AVX-512 anti-affinity) into a
//! per-pool weight map the Placer feeds into [`topology_policy_domain::Score`]
//! at tuple position 2.

use std::collections::BTreeMap;
use std::sync::Arc;
use topology_policy_domain::config::Config;
use topology_policy_domain::entities::Grant;
use topology_policy_domain::error::Result;
use topology_policy_domain::request::ContainerMeta;
use topology_policy_domain::services::ContainerCache;
use topology_policy_domain::value_objects::{ContainerId, NodeId};

pub const POD_COLOCATION_WEIGHT: i32 = 10;
pub const AVX512_ANTI_AFFINITY_WEIGHT: i32 = -5;

pub struct AffinityEvaluator {
    container_cache: Arc<dyn ContainerCache>,
    config: Arc<Config>,
}

impl AffinityEvaluator {
    pub fn new(container_cache: Arc<dyn ContainerCache>, config: Arc<Config>) -> Self {
        Self { container_cache, config }
    }

    /// §4.8 `calculate_pool_affinities`: per-node weight for placing
    /// `container_id`, derived from every other container's existing
    /// grant.
    pub async fn calculate_pool_affinities(
        &self,
        container_id: &ContainerId,
        meta: &ContainerMeta,
        grants: &BTreeMap<ContainerId, Grant>,
    ) -> Result<BTreeMap<NodeId, i32>> {
        let weights = self.per_container_weights(container_id, meta).await?;

        let mut pool_weights: BTreeMap<NodeId, i32> = BTreeMap::new();
        for (other_id, weight) in &weights {
            if let Some(grant) = grants.get(other_id) {
                *pool_weights.entry(grant.cpu_node).or_insert(0) += weight;
            }
        }
        Ok(pool_weights)
    }

    /// Per-other-container signed weight, explicit affinities if the
    /// container declares any, else the implicit rules (§4.8).
    async fn per_container_weights(
        &self,
        container_id: &ContainerId,
        meta: &ContainerMeta,
    ) -> Result<BTreeMap<ContainerId, i32>> {
        let explicit = self.container_cache.affinities(container_id).await?;
        if !explicit.is_empty() {
            let mut out: BTreeMap<ContainerId, i32> = BTreeMap::new();
            for expr in &explicit {
                let matches = self.container_cache.evaluate_affinity(container_id, expr).await?;
                for (other, weight) in matches {
                    if &other == container_id {
                        continue;
                    }
                    *out.entry(other).or_insert(0) += weight;
                }
            }
            out.remove(container_id);
            return Ok(out);
        }

        let mut out: BTreeMap<ContainerId, i32> = BTreeMap::new();
        if self.config.colocate_pods {
            let pod = self.container_cache.pod_of(container_id).await?;
            for sibling in self.container_cache.containers_in_pod(&pod).await? {
                if &sibling != container_id {
                    *out.entry(sibling).or_insert(0) += POD_COLOCATION_WEIGHT;
                }
            }
        }
        if self.config.anti_affinity_avx512 && meta.avx512 {
            // Implicit anti-affinity needs visibility into which other
            // containers are themselves AVX-512 workloads; the container
            // cache is the only collaborator that knows that, so this
            // rule is expressed as an affinity expression it can
            // evaluate rather than as a closed-form formula here.
            let expr = topology_policy_domain::services::AffinityExpr {
                scope: "avx512".to_string(),
                match_expr: "avx512=true".to_string(),
                weight: AVX512_ANTI_AFFINITY_WEIGHT,
            };
            let matches = self.container_cache.evaluate_affinity(container_id, &expr).await?;
            for (other, weight) in matches {
                if &other != container_id {
                    *out.entry(other).or_insert(0) += weight;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::in_memory_container_cache::InMemoryContainerCache;
    use topology_policy_domain::request::ExplicitBool;
    use topology_policy_domain::value_objects::{PodId, QosClass};

    fn meta(namespace: &str) -> ContainerMeta {
        ContainerMeta {
            namespace: namespace.to_string(),
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
    async fn pod_colocation_weight_applies_to_siblings() {
        let cache = Arc::new(InMemoryContainerCache::new());
        cache.register(
            ContainerId("a".to_string()),
            PodId("pod1".to_string()),
            meta("default"),
        );
        cache.register(
            ContainerId("b".to_string()),
            PodId("pod1".to_string()),
            meta("default"),
        );
        let config = Arc::new(Config {
            colocate_pods: true,
            ..Config::default()
        });
        let evaluator = AffinityEvaluator::new(cache, config);
        let weights = evaluator
            .per_container_weights(&ContainerId("a".to_string()), &meta("default"))
            .await
            .unwrap();
        assert_eq!(weights.get(&ContainerId("b".to_string())), Some(&POD_COLOCATION_WEIGHT));
    }
}
