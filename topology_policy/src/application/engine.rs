// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Engine (§4.9, §6)
//!
//! The façade every adapter calls into. Single-threaded cooperative
//! concurrency (§5): every public method takes `&mut self`, so the
//! bootstrap crate is responsible for never calling two of them
//! concurrently from separate tasks — the one exception is the cold-start
//! timer, which only ever posts an [`EngineEvent`] rather than touching
//! engine state directly.

use crate::application::affinity_evaluator::AffinityEvaluator;
use crate::application::{allocation_cache, grant_lifecycle, placer};
use crate::infrastructure::events::{ColdStartScheduler, EngineEvent, StopFlag};
use crate::infrastructure::metrics::EngineMetrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use topology_policy_domain::aggregates::PoolTree;
use topology_policy_domain::config::Config;
use topology_policy_domain::entities::Grant;
use topology_policy_domain::error::Result;
use topology_policy_domain::services::{AllocationCacheStore, ContainerCache, CpusetWriter, SystemAdapter};
use topology_policy_domain::value_objects::{ContainerId, MilliCpu};

/// A point-in-time view of engine state for diagnostics (§6
/// `export_resource_data`/`introspect`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineSnapshot {
    pub pool_count: usize,
    pub grant_count: usize,
    pub grants: BTreeMap<ContainerId, GrantSummary>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GrantSummary {
    pub cpu_pool: String,
    pub memory_pool: String,
    pub exclusive_cpus: String,
    pub fraction_milli: i64,
    pub in_cold_start: bool,
}

pub struct Engine {
    tree: PoolTree,
    grants: BTreeMap<ContainerId, Grant>,
    config: Arc<Config>,
    container_cache: Arc<dyn ContainerCache>,
    cpuset_writer: Arc<dyn CpusetWriter>,
    allocation_store: Arc<dyn AllocationCacheStore>,
    affinity_evaluator: AffinityEvaluator,
    scheduler: ColdStartScheduler,
    stop: StopFlag,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    metrics: EngineMetrics,
}

impl Engine {
    pub async fn new(
        system_adapter: Arc<dyn SystemAdapter>,
        container_cache: Arc<dyn ContainerCache>,
        cpuset_writer: Arc<dyn CpusetWriter>,
        allocation_store: Arc<dyn AllocationCacheStore>,
        config: Arc<Config>,
    ) -> Result<Self> {
        let topology = system_adapter.discover_topology().await?;
        let mut tree = PoolTree::build(&topology);

        let isolated = system_adapter.isolated_cpus().await?;
        placer::update_shared_allocations(&mut tree, &isolated);

        let has_movable_pmem = system_adapter.has_movable_pmem().await?;
        if !has_movable_pmem {
            tracing::warn!("no movable PMEM zone discovered; cold start requests will be rejected at the PMEM-feasibility check");
        }

        let records = allocation_store.load_allocations().await.unwrap_or_default();
        let grants = allocation_cache::restore(&mut tree, &records);

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = StopFlag::new();
        let scheduler = ColdStartScheduler::new(tx, stop.clone());
        let affinity_evaluator = AffinityEvaluator::new(container_cache.clone(), config.clone());
        let metrics = EngineMetrics::new()?;

        Ok(Engine {
            tree,
            grants,
            config,
            container_cache,
            cpuset_writer,
            allocation_store,
            affinity_evaluator,
            scheduler,
            stop,
            events: rx,
            metrics,
        })
    }

    /// §6 `Start(add, del)`: places every container in `add` and releases
    /// every container in `del`, in that order, as the engine's very first
    /// reconciliation pass.
    pub async fn start(&mut self, add: &[ContainerId], del: &[ContainerId]) -> Result<()> {
        for id in add {
            self.allocate_resources(id).await?;
        }
        for id in del {
            self.release_resources(id).await?;
        }
        Ok(())
    }

    /// §4.9 `allocate_resources`: derive the request, score every pool,
    /// commit the winner, write it out, and schedule cold start if asked.
    pub async fn allocate_resources(&mut self, container_id: &ContainerId) -> Result<()> {
        let meta = self.container_cache.container_meta(container_id).await?;
        let request = topology_policy_domain::request::Request::derive(&meta, &self.config)?;
        if request.is_zero() {
            return Ok(());
        }

        let affinities = self
            .affinity_evaluator
            .calculate_pool_affinities(container_id, &meta, &self.grants)
            .await?;

        let mut grant = match placer::allocate_pool(&mut self.tree, container_id, &request, &self.grants, &affinities, None) {
            Ok(grant) => grant,
            Err(e) => {
                self.metrics.record_allocation_failure(e.category());
                return Err(e);
            }
        };
        placer::apply_grant(&mut grant);

        self.write_grant(container_id, &grant).await?;
        let pool = grant.cpu_pool_name.clone();
        self.grants.insert(container_id.clone(), grant);
        self.metrics.record_allocation();
        tracing::info!(container = %container_id, pool = %pool, "allocated resources");

        self.start_cold_start(container_id).await?;
        self.persist().await?;
        Ok(())
    }

    /// §4.6: narrows an already-stored grant's memset to PMEM-only and
    /// starts its cold-start timer, if its request asked for one. Driven by
    /// the `ContainerStarted` event, not inline allocation — the grant must
    /// already be committed before its runtime cpuset is narrowed.
    async fn start_cold_start(&mut self, container_id: &ContainerId) -> Result<()> {
        let narrowed = {
            let Some(grant) = self.grants.get_mut(container_id) else {
                return Ok(());
            };
            grant_lifecycle::narrow_to_pmem(&self.tree, grant)
        };
        if !narrowed {
            return Ok(());
        }

        let memset = self.grants.get(container_id).expect("just narrowed").memset.clone();
        self.cpuset_writer.write_cpuset_mems(container_id, &memset).await?;
        self.container_cache.set_cpuset_mems(container_id, &memset).await?;

        let grant = self.grants.get_mut(container_id).expect("just narrowed");
        grant_lifecycle::start_cold_start(grant, &self.scheduler);
        self.metrics.cold_start_began();
        tracing::info!(container = %container_id, "cold start begun, memset narrowed to PMEM");
        Ok(())
    }

    /// §4.9 `release_resources`.
    pub async fn release_resources(&mut self, container_id: &ContainerId) -> Result<()> {
        if let Some(grant) = self.grants.remove(container_id) {
            let pool = grant.cpu_pool_name.clone();
            placer::release_pool(&mut self.tree, &grant);
            self.metrics.record_release();
            tracing::info!(container = %container_id, pool = %pool, "released resources");
            self.persist().await?;
        }
        Ok(())
    }

    /// §4.9 `update_resources`: a no-op per the Non-goals — resource
    /// *limits* changing mid-life is out of scope; only add/remove are
    /// handled.
    pub fn update_resources(&self, _container_id: &ContainerId) {}

    /// §4.9 `rebalance`.
    pub fn rebalance(&mut self) {
        let started = std::time::Instant::now();
        allocation_cache::rebalance(&mut self.tree, &mut self.grants);
        self.metrics.record_rebalance(started.elapsed());
    }

    /// Drains and processes every pending [`EngineEvent`] without
    /// blocking; called from the bootstrap crate's select loop (§5).
    pub async fn drain_events(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await?;
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::ContainerStarted(id) => {
                self.start_cold_start(&id).await?;
            }
            EngineEvent::ColdStartDone(id, handle) => {
                let still_current = matches!(self.grants.get(&id), Some(g) if g.cold_start_timer == Some(handle));
                if !still_current {
                    // Grant was released or already completed; a late timer
                    // fire for a stale handle is a no-op.
                    return Ok(());
                }
                let memset = {
                    let grant = self.grants.get_mut(&id).expect("checked above");
                    grant_lifecycle::complete_cold_start(&mut self.tree, grant)?;
                    grant.memset.clone()
                };
                self.cpuset_writer.write_cpuset_mems(&id, &memset).await?;
                self.container_cache.set_cpuset_mems(&id, &memset).await?;
                self.metrics.cold_start_ended();
                tracing::info!(container = %id, "cold start complete, memset widened");
            }
        }
        Ok(())
    }

    /// §6 `export_resource_data`: a serializable snapshot for metrics/debug
    /// endpoints.
    pub fn export_resource_data(&self) -> EngineSnapshot {
        EngineSnapshot {
            pool_count: self.tree.len(),
            grant_count: self.grants.len(),
            grants: self
                .grants
                .iter()
                .map(|(id, g)| {
                    (
                        id.clone(),
                        GrantSummary {
                            cpu_pool: g.cpu_pool_name.clone(),
                            memory_pool: g.memory_pool_name.clone(),
                            exclusive_cpus: g.exclusive.to_range_string(),
                            fraction_milli: g.fraction.0,
                            in_cold_start: g.in_cold_start(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// §6 `introspect`: human-readable tree/grant dump for operators.
    pub fn introspect(&self) -> String {
        let snapshot = self.export_resource_data();
        format!(
            "{} pools, {} grants: {:#?}",
            snapshot.pool_count, snapshot.grant_count, snapshot.grants
        )
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    async fn write_grant(&self, container_id: &ContainerId, grant: &Grant) -> Result<()> {
        self.cpuset_writer.write_cpuset_cpus(container_id, &grant.exclusive).await?;
        self.cpuset_writer.write_cpuset_mems(container_id, &grant.memset).await?;
        if grant.fraction != MilliCpu::ZERO {
            self.cpuset_writer
                .write_cpu_shares(container_id, grant.fraction.0.max(0) as u64)
                .await?;
        }
        self.container_cache.set_cpuset_cpus(container_id, &grant.exclusive).await?;
        self.container_cache.set_cpuset_mems(container_id, &grant.memset).await?;
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        allocation_cache::persist(self.allocation_store.as_ref(), &self.config, &self.grants).await
    }
}
