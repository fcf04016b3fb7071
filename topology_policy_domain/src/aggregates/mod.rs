// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

pub mod pool_tree;

pub use pool_tree::{DiscoveredDie, DiscoveredNuma, DiscoveredSocket, DiscoveredTopology, PoolTree, OVERFIT_PENALTY};
