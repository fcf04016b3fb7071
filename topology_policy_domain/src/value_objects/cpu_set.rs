// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A set of logical CPU ids, printed in Linux cpuset range form
//! (`"0-3,6,8-9"`) the way `cpuset.cpus`/`cpuset.mems` are written.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A disjoint set of logical CPU (or memory controller) ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CpuSet(BTreeSet<u32>);

impl CpuSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn from_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.0.contains(&id)
    }

    pub fn insert(&mut self, id: u32) -> bool {
        self.0.insert(id)
    }

    pub fn remove(&mut self, id: u32) -> bool {
        self.0.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn is_disjoint(&self, other: &CpuSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn intersection_count(&self, other: &CpuSet) -> usize {
        self.0.intersection(&other.0).count()
    }

    pub fn union(&self, other: &CpuSet) -> CpuSet {
        CpuSet(self.0.union(&other.0).copied().collect())
    }

    pub fn difference(&self, other: &CpuSet) -> CpuSet {
        CpuSet(self.0.difference(&other.0).copied().collect())
    }

    pub fn union_with(&mut self, other: &CpuSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn subtract_with(&mut self, other: &CpuSet) {
        for id in other.0.iter() {
            self.0.remove(id);
        }
    }

    /// Removes and returns `count` arbitrary ids (lowest first — stable and
    /// deterministic, matching the engine's stable tiebreak convention).
    pub fn take(&mut self, count: usize) -> CpuSet {
        let taken: Vec<u32> = self.0.iter().take(count).copied().collect();
        for id in &taken {
            self.0.remove(id);
        }
        CpuSet::from_ids(taken)
    }

    /// Prints the set in Linux cpuset range form, e.g. `"0-3,6,8-9"`.
    pub fn to_range_string(&self) -> String {
        let mut parts = Vec::new();
        let mut ids = self.0.iter().copied().peekable();
        while let Some(start) = ids.next() {
            let mut end = start;
            while ids.peek() == Some(&(end + 1)) {
                end = ids.next().unwrap();
            }
            if start == end {
                parts.push(start.to_string());
            } else {
                parts.push(format!("{start}-{end}"));
            }
        }
        parts.join(",")
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_range_string())
    }
}

impl FromStr for CpuSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = BTreeSet::new();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(CpuSet(set));
        }
        for part in trimmed.split(',') {
            let part = part.trim();
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.trim().parse().map_err(|_| format!("bad range start: {part}"))?;
                let hi: u32 = hi.trim().parse().map_err(|_| format!("bad range end: {part}"))?;
                if lo > hi {
                    return Err(format!("inverted range: {part}"));
                }
                set.extend(lo..=hi);
            } else {
                let id: u32 = part.parse().map_err(|_| format!("bad id: {part}"))?;
                set.insert(id);
            }
        }
        Ok(CpuSet(set))
    }
}

impl FromIterator<u32> for CpuSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        CpuSet(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_contiguous_ranges() {
        let set = CpuSet::from_ids([0, 1, 2, 3, 6, 8, 9]);
        assert_eq!(set.to_range_string(), "0-3,6,8-9");
    }

    #[test]
    fn round_trips_through_string() {
        let set = CpuSet::from_ids([0, 1, 2, 3, 6, 8, 9]);
        let parsed: CpuSet = set.to_range_string().parse().unwrap();
        assert_eq!(set, parsed);
    }

    #[test]
    fn take_is_deterministic() {
        let mut set = CpuSet::from_ids([5, 1, 3]);
        let taken = set.take(2);
        assert_eq!(taken.to_range_string(), "1,3");
        assert_eq!(set.to_range_string(), "5");
    }

    #[test]
    fn empty_set_prints_empty_string() {
        assert_eq!(CpuSet::new().to_range_string(), "");
    }
}
