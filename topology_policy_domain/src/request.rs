// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Request and Preferences (§4.3)
//!
//! Derives a [`Request`] from container metadata: CPU class, the
//! full/fractional split, isolation preference, memory type, and cold-start
//! duration.

use crate::config::Config;
use crate::error::{PlacementError, Result};
use crate::value_objects::{CpuClass, MemoryTypeMask, MilliCpu, QosClass, TopologyHints, MILLI_PER_CPU};
use std::time::Duration;

/// Boolean preference with an explicitness flag — annotations distinguish
/// "not set" from "explicitly false", which several §4.3 rules depend on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitBool {
    pub value: bool,
    pub explicit: bool,
}

impl ExplicitBool {
    pub fn unset(default: bool) -> Self {
        ExplicitBool {
            value: default,
            explicit: false,
        }
    }

    pub fn set(value: bool) -> Self {
        ExplicitBool { value, explicit: true }
    }
}

/// Container metadata as assembled by the engine from the (external)
/// pod/container cache — already annotation-resolved (§4.3 last
/// paragraph's container→pod→bare→default priority is applied by the
/// caller via [`crate::services::container_cache::resolve_effective`]
/// before this struct is built).
#[derive(Debug, Clone)]
pub struct ContainerMeta {
    pub namespace: String,
    pub qos: QosClass,
    pub cpu_request_milli: i64,
    pub memory_request_bytes: u64,
    pub memory_limit_bytes: u64,
    pub topology_hints: TopologyHints,
    pub prefer_isolated: ExplicitBool,
    pub prefer_shared: ExplicitBool,
    pub memory_type: Option<MemoryTypeMask>,
    pub cold_start: Option<Duration>,
    /// Whether this container is a declared AVX-512 workload, consulted
    /// by the implicit anti-affinity rule (§4.8) when enabled.
    pub avx512: bool,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub full: u32,
    pub fraction: MilliCpu,
    pub isolate: bool,
    pub cpu_class: CpuClass,
    pub memory_request_bytes: u64,
    pub memory_limit_bytes: u64,
    pub memory_type: MemoryTypeMask,
    pub cold_start: Duration,
    pub topology_hints: TopologyHints,
}

impl Request {
    pub fn is_zero(&self) -> bool {
        self.full == 0 && self.fraction == MilliCpu::ZERO && self.memory_request_bytes == 0
    }

    /// §4.3: derives CPU class, full/fractional split, isolation
    /// preference, memory type, and cold-start from container metadata and
    /// the active configuration.
    pub fn derive(meta: &ContainerMeta, config: &Config) -> Result<Request> {
        let memory_type = meta.memory_type.unwrap_or_default();
        let cold_start = meta.cold_start.unwrap_or(Duration::ZERO);
        if cold_start > Duration::from_secs(3600) {
            return Err(PlacementError::ConfigurationInvalid(format!(
                "cold-start duration {cold_start:?} exceeds the 1 hour maximum"
            )));
        }

        let (full, fraction, isolate, cpu_class) = if config.namespace_is_reserved(&meta.namespace) {
            // Rule 1: reserved-pool namespace.
            (0, meta.cpu_request_milli, false, CpuClass::Reserved)
        } else {
            match meta.qos {
                QosClass::Burstable => (0, meta.cpu_request_milli, false, CpuClass::Normal),
                QosClass::BestEffort => (0, 0, false, CpuClass::Normal),
                QosClass::Guaranteed => derive_guaranteed(meta),
            }
        };

        Ok(Request {
            full,
            fraction: MilliCpu(fraction),
            isolate,
            cpu_class,
            memory_request_bytes: meta.memory_request_bytes,
            memory_limit_bytes: meta.memory_limit_bytes,
            memory_type,
            cold_start,
            topology_hints: meta.topology_hints.clone(),
        })
    }
}

/// §4.3 rule 4: the `Guaranteed` QoS split.
fn derive_guaranteed(meta: &ContainerMeta) -> (u32, i64, bool, CpuClass) {
    let request = meta.cpu_request_milli;
    let full = (request / MILLI_PER_CPU) as u32;
    let frac = request % MILLI_PER_CPU;
    let prefer_isolated = meta.prefer_isolated;
    let prefer_shared = meta.prefer_shared;

    if full == 0 {
        return (0, frac, false, CpuClass::Normal);
    }

    if full == 1 {
        if frac > 0 {
            if prefer_shared.value {
                return (0, request, false, CpuClass::Normal);
            }
            return (1, frac, prefer_isolated.value, CpuClass::Normal);
        }
        if prefer_shared.explicit && prefer_shared.value {
            return (0, request, false, CpuClass::Normal);
        }
        // One-core isolation is safe by default.
        let isolate = !(prefer_isolated.explicit && !prefer_isolated.value);
        return (1, 0, isolate, CpuClass::Normal);
    }

    // full >= 2
    if frac > 0 {
        if prefer_shared.explicit && !prefer_shared.value {
            let isolate = prefer_isolated.explicit && prefer_isolated.value;
            return (full, frac, isolate, CpuClass::Normal);
        }
        return (0, request, false, CpuClass::Normal);
    }
    if prefer_shared.explicit && prefer_shared.value {
        return (0, request, false, CpuClass::Normal);
    }
    // Multi-core isolation requires explicit opt-in.
    let isolate = prefer_isolated.explicit && prefer_isolated.value;
    (full, 0, isolate, CpuClass::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn meta(qos: QosClass, milli: i64) -> ContainerMeta {
        ContainerMeta {
            namespace: "default".to_string(),
            qos,
            cpu_request_milli: milli,
            memory_request_bytes: 0,
            memory_limit_bytes: 0,
            topology_hints: BTreeMap::new(),
            prefer_isolated: ExplicitBool::unset(true),
            prefer_shared: ExplicitBool::unset(false),
            memory_type: None,
            cold_start: None,
            avx512: false,
        }
    }

    #[test]
    fn s1_guaranteed_single_core_isolation() {
        let m = meta(QosClass::Guaranteed, 1000);
        let req = Request::derive(&m, &Config::default()).unwrap();
        assert_eq!(req.full, 1);
        assert!(req.isolate);
        assert_eq!(req.fraction, MilliCpu::ZERO);
    }

    #[test]
    fn s2_sub_core_burstable() {
        let m = meta(QosClass::Burstable, 750);
        let req = Request::derive(&m, &Config::default()).unwrap();
        assert_eq!(req.full, 0);
        assert_eq!(req.fraction, MilliCpu(750));
        assert!(matches!(req.cpu_class, CpuClass::Normal));
    }

    #[test]
    fn s3_multi_core_guaranteed_mixed_prefers_isolated() {
        let m = meta(QosClass::Guaranteed, 1500);
        let req = Request::derive(&m, &Config::default()).unwrap();
        assert_eq!(req.full, 1);
        assert_eq!(req.fraction, MilliCpu(500));
    }

    #[test]
    fn s4_reserved_namespace() {
        let mut m = meta(QosClass::Guaranteed, 2000);
        m.namespace = "kube-system".to_string();
        let req = Request::derive(&m, &Config::default()).unwrap();
        assert_eq!(req.full, 0);
        assert_eq!(req.fraction, MilliCpu(2000));
        assert!(matches!(req.cpu_class, CpuClass::Reserved));
    }

    #[test]
    fn best_effort_gets_zero_request() {
        let m = meta(QosClass::BestEffort, 500);
        let req = Request::derive(&m, &Config::default()).unwrap();
        assert!(req.is_zero());
    }

    #[test]
    fn multi_core_no_fraction_requires_explicit_isolation() {
        let m = meta(QosClass::Guaranteed, 3000);
        let req = Request::derive(&m, &Config::default()).unwrap();
        assert_eq!(req.full, 3);
        assert!(!req.isolate, "multi-core isolation needs explicit opt-in");
    }

    #[test]
    fn multi_core_no_fraction_explicit_isolated_wins() {
        let mut m = meta(QosClass::Guaranteed, 3000);
        m.prefer_isolated = ExplicitBool::set(true);
        let req = Request::derive(&m, &Config::default()).unwrap();
        assert!(req.isolate);
    }

    #[test]
    fn rejects_cold_start_over_one_hour() {
        let mut m = meta(QosClass::Guaranteed, 1000);
        m.cold_start = Some(Duration::from_secs(3601));
        assert!(Request::derive(&m, &Config::default()).is_err());
    }
}
