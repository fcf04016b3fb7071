// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Composition root
//!
//! Wires the concrete adapters to the domain-defined ports and constructs
//! the [`Engine`]. Kept separate from [`crate::app_runner`] so the wiring
//! itself stays testable independent of the signal-handling/command-loop
//! machinery around it.

use crate::cli::Cli;
use anyhow::{Context, Result};
use std::sync::Arc;
use topology_policy::application::Engine;
use topology_policy::infrastructure::adapters::{
    FileAllocationStore, InMemoryContainerCache, LoggingCpusetWriter, SyntheticSystemAdapter,
};
use topology_policy_domain::aggregates::DiscoveredTopology;

/// Everything `app_runner` needs beyond the `Engine` itself: the
/// container cache is handed back so the command loop can `register`
/// containers before asking the engine to place them.
pub struct Composition {
    pub engine: Engine,
    pub container_cache: Arc<InMemoryContainerCache>,
}

pub async fn build(cli: &Cli) -> Result<Composition> {
    let config = topology_policy::infrastructure::config::load(cli.config.as_deref())
        .context("loading layered configuration")?;

    let topology_json = std::fs::read_to_string(&cli.topology)
        .with_context(|| format!("reading topology description at {}", cli.topology.display()))?;
    let topology: DiscoveredTopology =
        serde_json::from_str(&topology_json).context("parsing topology description as JSON")?;

    let isolated_cpus = topology_policy_domain::value_objects::CpuSet::new();
    let system_adapter = Arc::new(SyntheticSystemAdapter::new(topology, isolated_cpus, true));
    let container_cache = Arc::new(InMemoryContainerCache::new());
    let cpuset_writer = Arc::new(LoggingCpusetWriter::new());
    let allocation_store = Arc::new(FileAllocationStore::new(cli.allocations_dir.as_path()));

    let engine = Engine::new(
        system_adapter,
        container_cache.clone(),
        cpuset_writer,
        allocation_store,
        config,
    )
    .await
    .context("constructing engine")?;

    Ok(Composition { engine, container_cache })
}
