// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Allocation cache store port (§4.7, §6 "Persisted state")
//!
//! The external cache persists two keyed blobs: `allocations` and
//! `config`. [`GrantRecord`] is the compact, explicitly-schemed encoding
//! of a `Grant` the spec calls for — no reflective/generic serialization
//! (§9 "Reflection-based deep-copy/JSON"). Unknown fields are ignored on
//! decode by virtue of `serde`'s default behavior; a record missing a
//! required field simply fails to deserialize and the caller drops it
//! with a warning rather than treating the whole cache as corrupt.

use crate::config::Config;
use crate::value_objects::{ContainerId, CpuClass, MemTier, MemoryTypeMask, MilliCpu};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRecord {
    pub container_cache_id: String,
    /// Printed range form, e.g. `"0-3,6"` (§3 `CpuSet::to_range_string`).
    pub exclusive_cpuset: String,
    pub fraction_milli: i64,
    pub cpu_class: CpuClass,
    pub cpu_pool_name: String,
    pub memory_pool_name: String,
    pub memory_type: MemoryTypeMask,
    /// Printed range form of the memory-controller id set.
    pub memset: String,
    pub memory_allocated: BTreeMap<MemTier, u64>,
    #[serde(with = "duration_millis")]
    pub cold_start: Duration,
}

impl GrantRecord {
    pub fn fraction(&self) -> MilliCpu {
        MilliCpu(self.fraction_milli)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[async_trait]
pub trait AllocationCacheStore: Send + Sync {
    async fn load_allocations(&self) -> crate::error::Result<BTreeMap<ContainerId, GrantRecord>>;

    async fn save_allocations(&self, records: &BTreeMap<ContainerId, GrantRecord>) -> crate::error::Result<()>;

    async fn load_config(&self) -> crate::error::Result<Option<Config>>;

    async fn save_config(&self, config: &Config) -> crate::error::Result<()>;
}
