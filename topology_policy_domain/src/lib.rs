// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Topology Policy Domain
//!
//! The pool tree, supply accounting, request/score/grant types, and the
//! ports external collaborators (pod/container cache, system adapter,
//! cpuset writer, allocation cache store) must satisfy. This crate has no
//! knowledge of CRI, sysfs, cgroups, or any transport — those are
//! provided by adapters in `topology-policy`.

pub mod aggregates;
pub mod config;
pub mod entities;
pub mod error;
pub mod request;
pub mod score;
pub mod services;
pub mod value_objects;

pub use aggregates::{DiscoveredDie, DiscoveredNuma, DiscoveredSocket, DiscoveredTopology, PoolTree};
pub use config::Config;
pub use entities::{ColdStartTimerHandle, CpuAllocation, Grant, GrantState, Node, NodeKind, Supply};
pub use error::{PlacementError, Result};
pub use request::{ContainerMeta, ExplicitBool, Request};
pub use score::Score;
