// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ports
//!
//! Every external collaborator named in §1's "Out of scope" list
//! (container runtime plumbing, pod/container cache, sysfs enumeration,
//! cpuset/cgroup writers, persistence transport) is represented here as a
//! trait the engine crate implements, never as a concrete dependency of
//! this crate.

pub mod allocation_store;
pub mod container_cache;
pub mod cpuset_writer;
pub mod system_adapter;

pub use allocation_store::{AllocationCacheStore, GrantRecord};
pub use container_cache::{AffinityExpr, ContainerCache};
pub use cpuset_writer::CpusetWriter;
pub use system_adapter::SystemAdapter;
