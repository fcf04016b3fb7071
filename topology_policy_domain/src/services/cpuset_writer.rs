// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cpuset writer port
//!
//! Applying a grant's decision to the kernel (cgroup `cpuset.cpus`,
//! `cpuset.mems`, CPU shares) is out of scope (§1): this port captures
//! only the three writes the Placer issues in `apply_grant` (§4.5).

use crate::value_objects::{ContainerId, CpuSet};
use async_trait::async_trait;

#[async_trait]
pub trait CpusetWriter: Send + Sync {
    async fn write_cpuset_cpus(&self, id: &ContainerId, cpus: &CpuSet) -> crate::error::Result<()>;

    async fn write_cpuset_mems(&self, id: &ContainerId, mems: &CpuSet) -> crate::error::Result<()>;

    /// CPU shares proportional to the grant's fractional milli-CPU
    /// portion (§4.5 `apply_grant`).
    async fn write_cpu_shares(&self, id: &ContainerId, shares: u64) -> crate::error::Result<()>;
}
