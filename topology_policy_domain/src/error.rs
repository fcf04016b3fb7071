// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Module
//!
//! Structured errors for the pool tree, scoring, grant lifecycle, and
//! allocation cache subsystems. Every fallible boundary in this crate
//! returns a [`PlacementError`] variant rather than a string or
//! `anyhow::Error`; `anyhow` is reserved for the bootstrap binary's `main`.

use thiserror::Error;

/// Errors produced while placing, expanding, or restoring grants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("insufficient CPU: {0}")]
    InsufficientCPU(String),

    #[error("insufficient memory: {0}")]
    InsufficientMemory(String),

    #[error("insufficient PMEM for cold start: {0}")]
    InsufficientPMEMForColdStart(String),

    #[error("cannot expand grant for container {0}: no ancestor pool has room")]
    CannotExpand(String),

    #[error("cache restore mismatch: {0}")]
    CacheRestoreMismatch(String),

    #[error("verbatim reinstatement failed: {0}")]
    ReinstateFailed(String),

    #[error("restore by re-placement failed: {0}")]
    ReplacementFailed(String),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("pool not found: {0}")]
    PoolNotFound(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("io error: {0}")]
    IoError(String),
}

impl PlacementError {
    pub fn insufficient_cpu(msg: impl Into<String>) -> Self {
        Self::InsufficientCPU(msg.into())
    }

    pub fn insufficient_memory(msg: impl Into<String>) -> Self {
        Self::InsufficientMemory(msg.into())
    }

    /// Whether the caller may retry against a different pool rather than
    /// treat this as fatal for the whole request.
    pub fn is_per_pool_fit_failure(&self) -> bool {
        matches!(
            self,
            PlacementError::InsufficientCPU(_)
                | PlacementError::InsufficientMemory(_)
                | PlacementError::InsufficientPMEMForColdStart(_)
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            PlacementError::InsufficientCPU(_) => "cpu",
            PlacementError::InsufficientMemory(_) => "memory",
            PlacementError::InsufficientPMEMForColdStart(_) => "cold-start",
            PlacementError::CannotExpand(_) => "expansion",
            PlacementError::CacheRestoreMismatch(_) => "cache",
            PlacementError::ReinstateFailed(_) => "cache",
            PlacementError::ReplacementFailed(_) => "cache",
            PlacementError::ConfigurationInvalid(_) => "configuration",
            PlacementError::PoolNotFound(_) => "pool",
            PlacementError::ContainerNotFound(_) => "container",
            PlacementError::SerializationError(_) => "serialization",
            PlacementError::IoError(_) => "io",
        }
    }
}

impl From<std::io::Error> for PlacementError {
    fn from(err: std::io::Error) -> Self {
        PlacementError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PlacementError {
    fn from(err: serde_json::Error) -> Self {
        PlacementError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlacementError>;
