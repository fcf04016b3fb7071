// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Layered configuration loading (§4.10)
//!
//! Defaults → optional file → environment overrides (`TOPOLOGY_POLICY__*`),
//! producing a validated, immutable [`Config`] snapshot. Loading and
//! validating are kept separate the way the domain crate's `Config::validate`
//! is independent of how the values got there.

use config::{Environment, File};
use std::path::Path;
use std::sync::Arc;
use topology_policy_domain::config::Config;
use topology_policy_domain::error::{PlacementError, Result};

pub const ENV_PREFIX: &str = "TOPOLOGY_POLICY";

/// Loads configuration from an optional file plus environment overrides,
/// layered on top of [`Config::default`], and validates the result.
pub fn load(config_path: Option<&Path>) -> Result<Arc<Config>> {
    let defaults = Config::default();
    let mut builder = config::Config::builder().add_source(
        config::Config::try_from(&defaults).map_err(|e| PlacementError::ConfigurationInvalid(e.to_string()))?,
    );

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(false));
    }
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let layered = builder
        .build()
        .map_err(|e| PlacementError::ConfigurationInvalid(e.to_string()))?;
    let config: Config = layered
        .try_deserialize()
        .map_err(|e| PlacementError::ConfigurationInvalid(e.to_string()))?;

    config.validate()?;
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_when_no_file_present() {
        let config = load(None).unwrap();
        assert!(config.pin_cpu);
        assert!(config.namespace_is_reserved("kube-system"));
    }
}
