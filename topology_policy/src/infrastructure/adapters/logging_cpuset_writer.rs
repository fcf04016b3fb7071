// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging cpuset writer
//!
//! Applying cgroup writes to the kernel is out of scope (§1); this
//! adapter logs what *would* be written at `info` level, the way the
//! teacher's `infrastructure::services::debug` passthrough stage stands
//! in for a real transform.

use async_trait::async_trait;
use topology_policy_domain::error::Result;
use topology_policy_domain::services::CpusetWriter;
use topology_policy_domain::value_objects::{ContainerId, CpuSet};

#[derive(Default)]
pub struct LoggingCpusetWriter;

impl LoggingCpusetWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CpusetWriter for LoggingCpusetWriter {
    async fn write_cpuset_cpus(&self, id: &ContainerId, cpus: &CpuSet) -> Result<()> {
        tracing::info!(container = %id, cpus = %cpus, "write cpuset.cpus");
        Ok(())
    }

    async fn write_cpuset_mems(&self, id: &ContainerId, mems: &CpuSet) -> Result<()> {
        tracing::info!(container = %id, mems = %mems, "write cpuset.mems");
        Ok(())
    }

    async fn write_cpu_shares(&self, id: &ContainerId, shares: u64) -> Result<()> {
        tracing::info!(container = %id, shares, "write cpu.shares");
        Ok(())
    }
}
