// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! Bootstrap-layer CLI handling: clap does the parsing, this module does
//! the small amount of validation clap's derive macros can't express
//! (existence of the topology description file, `--allocations-dir`
//! being usable as a directory).

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },
}

/// Topology-aware CPU/memory placement engine, run as a standalone daemon
/// for demonstration and integration testing.
#[derive(Debug, Parser)]
#[command(name = "topology-policy", version, about)]
pub struct Cli {
    /// Path to a layered configuration file (TOML/YAML/JSON, see
    /// `topology_policy::infrastructure::config`). Defaults/env still
    /// apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to a JSON-encoded `DiscoveredTopology` description. Required:
    /// hardware discovery itself is out of scope, so the engine always
    /// needs a declarative description of the pool tree to build against.
    #[arg(long)]
    pub topology: PathBuf,

    /// Directory the allocation cache (persisted grants + config
    /// snapshot) is read from and written to.
    #[arg(long, default_value = "./topology-policy-state")]
    pub allocations_dir: PathBuf,

    /// Raise the default log level from info to debug.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_and_validate() -> Result<Self, ParseError> {
        let cli = Self::parse();
        cli.validate()?;
        Ok(cli)
    }

    fn validate(&self) -> Result<(), ParseError> {
        if !self.topology.exists() {
            return Err(ParseError::InvalidValue {
                arg: "topology".to_string(),
                reason: format!("{} does not exist", self.topology.display()),
            });
        }
        if self.allocations_dir.exists() && !self.allocations_dir.is_dir() {
            return Err(ParseError::InvalidValue {
                arg: "allocations-dir".to_string(),
                reason: format!("{} exists and is not a directory", self.allocations_dir.display()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_topology_file() {
        let cli = Cli {
            config: None,
            topology: PathBuf::from("/does/not/exist/topology.json"),
            allocations_dir: PathBuf::from("/tmp"),
            verbose: false,
        };
        assert!(cli.validate().is_err());
    }
}
