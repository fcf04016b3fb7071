// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application lifecycle
//!
//! Runs the engine as a small interactive daemon: a line-oriented command
//! loop (`register`/`add`/`del`/`rebalance`/`introspect`) races a signal
//! handler over `select!`, the same shape the shutdown coordinator's own
//! doc examples use. On shutdown, pending cold-start events are drained
//! one last time before the process exits.

use crate::cli::Cli;
use crate::composition_root;
use crate::exit_code::ExitCode;
use crate::shutdown::ShutdownCoordinator;
use crate::signals::create_signal_handler;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use topology_policy_domain::request::{ContainerMeta, ExplicitBool};
use topology_policy_domain::value_objects::{ContainerId, PodId, QosClass};

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let mut composition = composition_root::build(&cli).await?;

    let coordinator = ShutdownCoordinator::default();
    let signal_task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let handler = create_signal_handler();
            let coordinator_for_callback = coordinator.clone();
            handler
                .wait_for_signal(Box::new(move || coordinator_for_callback.initiate_shutdown()))
                .await;
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let token = coordinator.token();
    let mut cold_start_ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("shutdown signal received, stopping command loop");
                break;
            }
            _ = cold_start_ticker.tick() => {
                composition.engine.drain_events().await.context("draining cold-start events")?;
            }
            line = lines.next_line() => {
                match line.context("reading command from stdin")? {
                    Some(line) => {
                        if let Err(e) = dispatch(&mut composition, &line).await {
                            tracing::error!(error = %e, command = %line, "command failed");
                        }
                    }
                    None => {
                        tracing::info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    composition.engine.stop();
    composition.engine.drain_events().await.context("draining pending engine events")?;
    coordinator.complete_shutdown();
    signal_task.abort();

    Ok(ExitCode::Success)
}

async fn dispatch(composition: &mut composition_root::Composition, line: &str) -> Result<()> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("register") => {
            let id = parts.next().context("register needs <id>")?;
            let pod = parts.next().context("register needs <pod>")?;
            let qos = parts.next().unwrap_or("guaranteed");
            let cpu_milli: i64 = parts.next().unwrap_or("1000").parse().context("cpu_milli must be an integer")?;

            let qos = match qos {
                "guaranteed" => QosClass::Guaranteed,
                "burstable" => QosClass::Burstable,
                "besteffort" | "best-effort" => QosClass::BestEffort,
                other => anyhow::bail!("unknown QoS class: {other}"),
            };

            composition.container_cache.register(
                ContainerId(id.to_string()),
                PodId(pod.to_string()),
                ContainerMeta {
                    namespace: "default".to_string(),
                    qos,
                    cpu_request_milli: cpu_milli,
                    memory_request_bytes: 0,
                    memory_limit_bytes: 0,
                    topology_hints: Default::default(),
                    prefer_isolated: ExplicitBool::unset(true),
                    prefer_shared: ExplicitBool::unset(false),
                    memory_type: None,
                    cold_start: None,
                    avx512: false,
                },
            );
        }
        Some("add") => {
            let id = parts.next().context("add needs <id>")?;
            composition.engine.allocate_resources(&ContainerId(id.to_string())).await?;
        }
        Some("del") => {
            let id = parts.next().context("del needs <id>")?;
            composition.engine.release_resources(&ContainerId(id.to_string())).await?;
        }
        Some("rebalance") => {
            composition.engine.rebalance();
        }
        Some("introspect") => {
            println!("{}", composition.engine.introspect());
        }
        Some("") | None => {}
        Some(other) => anyhow::bail!("unknown command: {other}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_policy::infrastructure::adapters::{FileAllocationStore, InMemoryContainerCache, LoggingCpusetWriter, SyntheticSystemAdapter};
    use topology_policy_domain::aggregates::{DiscoveredDie, DiscoveredNuma, DiscoveredSocket, DiscoveredTopology};
    use topology_policy_domain::config::Config;
    use topology_policy_domain::entities::Supply;
    use topology_policy_domain::value_objects::{CpuSet, MemTier};

    async fn test_composition() -> composition_root::Composition {
        let mut supply = Supply::new();
        supply.sharable = CpuSet::from_ids([0, 1, 2, 3]);
        supply.mem.insert(MemTier::Dram, 1 << 30);
        let topology = DiscoveredTopology {
            sockets: vec![DiscoveredSocket {
                socket_id: 0,
                dies: vec![DiscoveredDie {
                    die_id: 0,
                    numas: vec![DiscoveredNuma { numa_id: 0, capacity: supply }],
                }],
            }],
        };

        let dir = std::env::temp_dir().join(format!("topology-policy-app-runner-test-{}", std::process::id()));
        let system_adapter = std::sync::Arc::new(SyntheticSystemAdapter::new(topology, CpuSet::new(), true));
        let container_cache = std::sync::Arc::new(InMemoryContainerCache::new());
        let cpuset_writer = std::sync::Arc::new(LoggingCpusetWriter::new());
        let allocation_store = std::sync::Arc::new(FileAllocationStore::new(dir));

        let engine = topology_policy::application::Engine::new(
            system_adapter,
            container_cache.clone(),
            cpuset_writer,
            allocation_store,
            std::sync::Arc::new(Config::default()),
        )
        .await
        .unwrap();

        composition_root::Composition { engine, container_cache }
    }

    #[tokio::test]
    async fn register_then_add_then_introspect_round_trips() {
        let mut composition = test_composition().await;

        dispatch(&mut composition, "register c1 p1 guaranteed 1000").await.unwrap();
        dispatch(&mut composition, "add c1").await.unwrap();

        let snapshot = composition.engine.export_resource_data();
        assert_eq!(snapshot.grant_count, 1);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let mut composition = test_composition().await;
        assert!(dispatch(&mut composition, "frobnicate").await.is_err());
    }

    #[tokio::test]
    async fn unknown_qos_is_rejected() {
        let mut composition = test_composition().await;
        assert!(dispatch(&mut composition, "register c1 p1 made-up 1000").await.is_err());
    }
}
