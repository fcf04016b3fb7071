// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Adapter port
//!
//! Hardware enumeration (sockets, dies, NUMA nodes, cpusets, memory tiers)
//! is an external collaborator (§1 "Out of scope"): the domain only needs
//! the result, shaped as a [`crate::aggregates::DiscoveredTopology`]. I/O
//! against sysfs is infrastructure's job, so this port is async the way
//! the teacher's `FileIOService` is.

use crate::aggregates::DiscoveredTopology;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SystemAdapter: Send + Sync {
    /// Enumerates sockets, dies, NUMA nodes, and their CPU/memory supply,
    /// classified by tier (§4.2 steps 1-5).
    async fn discover_topology(&self) -> Result<DiscoveredTopology>;

    /// The kernel-isolated (`isolcpus=`) cpuset, used to seed each NUMA
    /// node's `Supply::isolated`.
    async fn isolated_cpus(&self) -> Result<crate::value_objects::CpuSet>;

    /// Whether any movable PMEM zone exists; if `false`, cold-start is
    /// forcibly disabled at engine init (§4.3).
    async fn has_movable_pmem(&self) -> Result<bool>;
}
