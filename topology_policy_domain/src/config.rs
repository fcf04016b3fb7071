// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Engine configuration
//!
//! The validated, immutable configuration type (§4.10, §6). Loading it from
//! layered sources (defaults → file → environment) is an infrastructure
//! concern handled by `topology_policy::infrastructure::config`; this crate
//! only owns the validated shape and the validation rules themselves, the
//! way the teacher crate keeps configuration *data* in the domain and
//! configuration *loading* in infrastructure.

use crate::error::{PlacementError, Result};
use crate::value_objects::CpuSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pin_cpu: bool,
    pub pin_memory: bool,
    pub prefer_isolated: bool,
    pub prefer_shared: bool,
    pub reserved_pool_namespaces: Vec<String>,
    pub colocate_pods: bool,
    pub colocate_namespaces: bool,
    pub anti_affinity_avx512: bool,
    pub max_cold_start: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pin_cpu: true,
            pin_memory: true,
            prefer_isolated: true,
            prefer_shared: false,
            reserved_pool_namespaces: vec!["kube-system".to_string()],
            colocate_pods: false,
            colocate_namespaces: false,
            anti_affinity_avx512: false,
            max_cold_start: Duration::from_secs(3600),
        }
    }
}

impl Config {
    /// Validates the configuration shape against §7 `ConfigurationInvalid`
    /// rules that don't depend on a live pool tree (the reserved-overlaps-
    /// isolated check is performed once the tree is built, since it needs
    /// the discovered cpusets).
    pub fn validate(&self) -> Result<()> {
        if self.reserved_pool_namespaces.is_empty() {
            return Err(PlacementError::ConfigurationInvalid(
                "reserved_pool_namespaces must not be empty".to_string(),
            ));
        }
        for glob in &self.reserved_pool_namespaces {
            glob_to_regex(glob).map_err(|e| {
                PlacementError::ConfigurationInvalid(format!("invalid reserved-pool-namespace glob {glob:?}: {e}"))
            })?;
        }
        if self.max_cold_start > Duration::from_secs(3600) {
            return Err(PlacementError::ConfigurationInvalid(
                "max_cold_start must not exceed 1 hour".to_string(),
            ));
        }
        Ok(())
    }

    /// §7: a reserved cpuset that overlaps the isolated cpuset is invalid.
    /// Checked once discovery has produced both sets.
    pub fn validate_against_topology(&self, isolated: &CpuSet, reserved: &CpuSet) -> Result<()> {
        if !isolated.is_disjoint(reserved) {
            return Err(PlacementError::ConfigurationInvalid(
                "reserved cpuset overlaps isolated cpuset".to_string(),
            ));
        }
        Ok(())
    }

    pub fn namespace_is_reserved(&self, namespace: &str) -> bool {
        self.reserved_pool_namespaces
            .iter()
            .any(|glob| glob_matches(glob, namespace))
    }
}

/// Translates a shell-style glob (`*`, `?`) into an anchored regex. The
/// teacher's dependency set already carries `regex` for value-object
/// validation, so namespace globs reuse it rather than pulling in a
/// dedicated glob crate for this one small need (see DESIGN.md).
fn glob_to_regex(glob: &str) -> std::result::Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

fn glob_matches(glob: &str, namespace: &str) -> bool {
    glob_to_regex(glob)
        .map(|re| re.is_match(namespace))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reserves_kube_system() {
        let cfg = Config::default();
        assert!(cfg.namespace_is_reserved("kube-system"));
        assert!(!cfg.namespace_is_reserved("default"));
    }

    #[test]
    fn glob_star_matches_prefix() {
        let cfg = Config {
            reserved_pool_namespaces: vec!["kube-*".to_string()],
            ..Config::default()
        };
        assert!(cfg.namespace_is_reserved("kube-system"));
        assert!(cfg.namespace_is_reserved("kube-public"));
        assert!(!cfg.namespace_is_reserved("my-app"));
    }

    #[test]
    fn rejects_empty_namespace_list() {
        let cfg = Config {
            reserved_pool_namespaces: vec![],
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_cold_start_over_one_hour() {
        let cfg = Config {
            max_cold_start: Duration::from_secs(3601),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
