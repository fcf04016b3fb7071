// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tiered memory model: DRAM / PMEM / HBM, plus the bitmask requests and
//! grants use to express "any of these tiers".

use serde::{Deserialize, Serialize};
use std::fmt;

/// A memory tier. Iteration order for allocation is fixed at
/// `[Pmem, Dram, Hbm]` per §4.1 — see [`MemTier::ALLOCATION_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemTier {
    Dram,
    Pmem,
    Hbm,
}

impl MemTier {
    /// All tiers, in the order `allocate_memory` must consult them.
    pub const ALLOCATION_ORDER: [MemTier; 3] = [MemTier::Pmem, MemTier::Dram, MemTier::Hbm];

    pub const ALL: [MemTier; 3] = [MemTier::Dram, MemTier::Pmem, MemTier::Hbm];

    pub fn bit(self) -> u8 {
        match self {
            MemTier::Dram => 0b001,
            MemTier::Pmem => 0b010,
            MemTier::Hbm => 0b100,
        }
    }
}

impl fmt::Display for MemTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemTier::Dram => "dram",
            MemTier::Pmem => "pmem",
            MemTier::Hbm => "hbm",
        };
        write!(f, "{s}")
    }
}

/// Bitmask over [`MemTier`] expressing which tiers a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryTypeMask(pub u8);

impl MemoryTypeMask {
    pub const ALL: MemoryTypeMask = MemoryTypeMask(0b111);
    pub const NONE: MemoryTypeMask = MemoryTypeMask(0);

    pub fn single(tier: MemTier) -> Self {
        MemoryTypeMask(tier.bit())
    }

    pub fn allows(&self, tier: MemTier) -> bool {
        self.0 & tier.bit() != 0
    }

    pub fn with(mut self, tier: MemTier) -> Self {
        self.0 |= tier.bit();
        self
    }

    /// Parses a comma-combinable list such as `"pmem,dram"` per the
    /// `memory-type` annotation grammar (§6).
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut mask = MemoryTypeMask::NONE;
        for part in s.split(',') {
            match part.trim().to_ascii_lowercase().as_str() {
                "" => continue,
                "dram" => mask = mask.with(MemTier::Dram),
                "pmem" => mask = mask.with(MemTier::Pmem),
                "hbm" => mask = mask.with(MemTier::Hbm),
                "mixed" | "all" => mask = MemoryTypeMask::ALL,
                other => return Err(format!("unknown memory type: {other}")),
            }
        }
        if mask == MemoryTypeMask::NONE {
            Ok(MemoryTypeMask::ALL)
        } else {
            Ok(mask)
        }
    }

    pub fn tiers(&self) -> impl Iterator<Item = MemTier> + '_ {
        MemTier::ALLOCATION_ORDER
            .into_iter()
            .filter(move |t| self.allows(*t))
    }
}

impl Default for MemoryTypeMask {
    fn default() -> Self {
        MemoryTypeMask::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_combined_types() {
        let mask = MemoryTypeMask::parse("pmem,dram").unwrap();
        assert!(mask.allows(MemTier::Pmem));
        assert!(mask.allows(MemTier::Dram));
        assert!(!mask.allows(MemTier::Hbm));
    }

    #[test]
    fn empty_defaults_to_all() {
        assert_eq!(MemoryTypeMask::parse("").unwrap(), MemoryTypeMask::ALL);
    }

    #[test]
    fn allocation_order_is_pmem_dram_hbm() {
        assert_eq!(
            MemTier::ALLOCATION_ORDER,
            [MemTier::Pmem, MemTier::Dram, MemTier::Hbm]
        );
    }
}
