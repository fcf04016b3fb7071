// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Milli-CPU quantities. `1000` milli-CPU is one logical CPU.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

pub const MILLI_PER_CPU: i64 = 1000;

/// A signed milli-CPU quantity (signed so score deltas can go negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct MilliCpu(pub i64);

impl MilliCpu {
    pub const ZERO: MilliCpu = MilliCpu(0);

    pub fn from_cpus(cpus: u32) -> Self {
        MilliCpu(cpus as i64 * MILLI_PER_CPU)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn max(self, other: MilliCpu) -> MilliCpu {
        MilliCpu(self.0.max(other.0))
    }

    pub fn min(self, other: MilliCpu) -> MilliCpu {
        MilliCpu(self.0.min(other.0))
    }
}

impl fmt::Display for MilliCpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl Add for MilliCpu {
    type Output = MilliCpu;
    fn add(self, rhs: MilliCpu) -> MilliCpu {
        MilliCpu(self.0 + rhs.0)
    }
}

impl Sub for MilliCpu {
    type Output = MilliCpu;
    fn sub(self, rhs: MilliCpu) -> MilliCpu {
        MilliCpu(self.0 - rhs.0)
    }
}

impl AddAssign for MilliCpu {
    fn add_assign(&mut self, rhs: MilliCpu) {
        self.0 += rhs.0;
    }
}

impl SubAssign for MilliCpu {
    fn sub_assign(&mut self, rhs: MilliCpu) {
        self.0 -= rhs.0;
    }
}
