// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Topology Policy
//!
//! A topology-aware CPU and memory placement engine for containerized
//! workloads. Given a hardware pool tree (sockets, dies, NUMA nodes) and a
//! stream of container lifecycle events, it derives each container's
//! resource request, scores every candidate pool against it, and commits
//! the winning placement as a `cpuset`/memory-controller grant.
//!
//! ## Architecture
//!
//! Clean Architecture / DDD layering, same split as the domain crate this
//! one depends on:
//!
//! - **`topology_policy_domain`**: entities (`Node`, `Supply`, `Grant`),
//!   the `PoolTree` aggregate, the `Score` comparator, request derivation,
//!   and the port traits (`SystemAdapter`, `ContainerCache`, `CpusetWriter`,
//!   `AllocationCacheStore`) external collaborators implement.
//! - **`application`**: the `Engine` façade and the use cases it
//!   orchestrates — placement, cold-start lifecycle, allocation cache
//!   persistence/restore, and affinity scoring.
//! - **`infrastructure`**: port implementations (synthetic topology,
//!   in-memory container cache, logging cpuset writer, file-backed
//!   allocation store), layered configuration loading, structured logging,
//!   and Prometheus metrics.
//!
//! The engine is single-threaded cooperative (§5 in the design notes): all
//! public `Engine` methods take `&mut self`, and the only scheduled
//! asynchrony — the cold-start timer — communicates back through an event
//! channel rather than touching engine state directly.

pub mod application;
pub mod infrastructure;

pub use application::{AffinityEvaluator, Engine, EngineSnapshot, GrantSummary};
pub use infrastructure::{ColdStartScheduler, EngineEvent, EngineMetrics, StopFlag};

pub use topology_policy_domain::{
    aggregates::{DiscoveredDie, DiscoveredNuma, DiscoveredSocket, DiscoveredTopology, PoolTree},
    config::Config,
    entities::{ColdStartTimerHandle, Grant, GrantState, Node, NodeKind},
    error::{PlacementError, Result},
    request::{ContainerMeta, Request},
    score::Score,
};
