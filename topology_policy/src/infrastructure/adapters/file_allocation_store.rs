// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File-backed allocation cache store
//!
//! Persists the two keyed blobs named in §6 ("Persisted state") as
//! sibling JSON files. Unknown fields are ignored by `serde`'s default
//! behavior (§9 "Reflection-based deep-copy/JSON"); a record that fails
//! to deserialize is dropped rather than failing the whole load.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use topology_policy_domain::config::Config;
use topology_policy_domain::error::Result;
use topology_policy_domain::services::{AllocationCacheStore, GrantRecord};
use topology_policy_domain::value_objects::ContainerId;

pub struct FileAllocationStore {
    allocations_path: PathBuf,
    config_path: PathBuf,
}

impl FileAllocationStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        Self {
            allocations_path: directory.join("allocations.json"),
            config_path: directory.join("config.json"),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned + Default>(path: &PathBuf) -> Result<T> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl AllocationCacheStore for FileAllocationStore {
    async fn load_allocations(&self) -> Result<BTreeMap<ContainerId, GrantRecord>> {
        // Records are decoded one by one so a single malformed entry
        // (§4.7 "missing required fields") does not sink the whole file.
        let raw: BTreeMap<ContainerId, serde_json::Value> = Self::read_json(&self.allocations_path).await?;
        let mut out = BTreeMap::new();
        for (id, value) in raw {
            match serde_json::from_value::<GrantRecord>(value) {
                Ok(record) => {
                    out.insert(id, record);
                }
                Err(e) => tracing::warn!(container = %id, error = %e, "dropping malformed allocation record"),
            }
        }
        Ok(out)
    }

    async fn save_allocations(&self, records: &BTreeMap<ContainerId, GrantRecord>) -> Result<()> {
        Self::write_json(&self.allocations_path, records).await
    }

    async fn load_config(&self) -> Result<Option<Config>> {
        match tokio::fs::read(&self.config_path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        Self::write_json(&self.config_path, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology_policy_domain::value_objects::{CpuClass, MemoryTypeMask};

    #[tokio::test]
    async fn round_trips_allocations_through_disk() {
        let dir = tempfile_dir();
        let store = FileAllocationStore::new(&dir);
        let mut records = BTreeMap::new();
        records.insert(
            ContainerId("c1".to_string()),
            GrantRecord {
                container_cache_id: "c1".to_string(),
                exclusive_cpuset: "0-1".to_string(),
                fraction_milli: 0,
                cpu_class: CpuClass::Normal,
                cpu_pool_name: "numa0".to_string(),
                memory_pool_name: "numa0".to_string(),
                memory_type: MemoryTypeMask::ALL,
                memset: "0".to_string(),
                memory_allocated: Default::default(),
                cold_start: std::time::Duration::ZERO,
            },
        );
        store.save_allocations(&records).await.unwrap();
        let loaded = store.load_allocations().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&ContainerId("c1".to_string())].exclusive_cpuset, "0-1");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile_dir();
        let store = FileAllocationStore::new(&dir);
        let loaded = store.load_allocations().await.unwrap();
        assert!(loaded.is_empty());
    }

    fn tempfile_dir() -> PathBuf {
        static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let n = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut dir = std::env::temp_dir();
        dir.push(format!("topology-policy-test-{}-{n}", std::process::id()));
        dir
    }
}
