// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete implementations of the domain crate's ports (§6, §4.12).

pub mod file_allocation_store;
pub mod in_memory_container_cache;
pub mod logging_cpuset_writer;
pub mod synthetic_system_adapter;

pub use file_allocation_store::FileAllocationStore;
pub use in_memory_container_cache::InMemoryContainerCache;
pub use logging_cpuset_writer::LoggingCpusetWriter;
pub use synthetic_system_adapter::SyntheticSystemAdapter;
