// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Score (§4.4)
//!
//! A candidate pool's fitness for a request. `eval()` folds the tuple into
//! a constant for external introspection only; the actual winner is always
//! decided by [`Score::better_than`]'s lexicographic tuple comparison,
//! never by comparing `eval()` outputs (the original's `Score.Eval()`
//! returns a constant 1.0 for the same reason — see DESIGN.md).

use crate::value_objects::MilliCpu;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    /// Remaining milli-CPU of each kind after hypothetically placing the
    /// request. Negative means infeasible for that kind.
    pub isolated: MilliCpu,
    pub reserved: MilliCpu,
    pub shared: MilliCpu,
    /// Count of same-class grants already at this node.
    pub colocated: u32,
    /// Per-provider hint score in `[0.0, 1.0]`.
    pub hints: BTreeMap<String, f64>,
    /// Pre-computed per-pool affinity weight (§4.8); compared before hints.
    pub affinity: f64,
    /// True if the request asked for isolated placement.
    pub wants_isolated: bool,
    /// True if the request prefers shared placement (used by the
    /// colocation tiebreak, step 6).
    pub prefers_shared: bool,
    /// True if the request carries any topology hints — determines
    /// whether step 7 prefers leaves or the root.
    pub has_topology_hints: bool,
    pub depth: u32,
    pub node_id: u32,
}

impl Score {
    /// Whether both isolated and shared remaining are negative — an
    /// infeasible candidate per step 1.
    pub fn is_infeasible(&self) -> bool {
        self.isolated.is_negative() && self.shared.is_negative()
    }

    /// Geometric mean of the non-zero hint scores, or `0.0` if there are
    /// none.
    fn hint_geomean(&self) -> f64 {
        let nonzero: Vec<f64> = self.hints.values().copied().filter(|v| *v > 0.0).collect();
        if nonzero.is_empty() {
            return 0.0;
        }
        let product: f64 = nonzero.iter().product();
        product.powf(1.0 / nonzero.len() as f64)
    }

    /// Can this candidate satisfy an isolated request at all (non-negative
    /// isolated remaining)?
    fn satisfies_isolated(&self) -> bool {
        !self.isolated.is_negative()
    }

    /// The "relevant pool" remaining for the tight-fit step: `isolated` if
    /// the request wants isolation, else `shared`.
    fn relevant_remaining(&self) -> MilliCpu {
        if self.wants_isolated {
            self.isolated
        } else {
            self.shared
        }
    }

    /// A constant, non-discriminating scalar kept only so external
    /// introspection has something to display; never used for ranking.
    pub fn eval(&self) -> f64 {
        1.0
    }

    /// §4.4: is `self` strictly better than `other` as a placement
    /// candidate? Applies the 8-step tuple comparison in order, returning
    /// at the first step that discriminates.
    pub fn better_than(&self, other: &Score) -> bool {
        // Step 1: validity.
        let (a_ok, b_ok) = (!self.is_infeasible(), !other.is_infeasible());
        if a_ok != b_ok {
            return a_ok;
        }

        // Step 2: affinity delta.
        if self.affinity != other.affinity {
            return self.affinity > other.affinity;
        }

        // Step 3: geometric mean of non-zero hint scores.
        let (a_hint, b_hint) = (self.hint_geomean(), other.hint_geomean());
        if a_hint != b_hint {
            return a_hint > b_hint;
        }

        // Step 4: isolation fit.
        if self.wants_isolated {
            let (a_sat, b_sat) = (self.satisfies_isolated(), other.satisfies_isolated());
            if a_sat != b_sat {
                return a_sat;
            }
        }

        // Step 5: tight-fit — smaller non-negative remaining wins.
        let (a_rem, b_rem) = (self.relevant_remaining(), other.relevant_remaining());
        if a_rem != b_rem {
            // Both already passed step 1/4 feasibility; smaller wins.
            return a_rem < b_rem;
        }

        // Step 6: colocation.
        if self.colocated != other.colocated {
            return if self.prefers_shared {
                self.colocated > other.colocated
            } else {
                self.colocated < other.colocated
            };
        }

        // Step 7: topology distance.
        if self.depth != other.depth {
            return if self.has_topology_hints {
                self.depth > other.depth // leaf-first
            } else {
                self.depth < other.depth // root-first
            };
        }

        // Step 8: stable tiebreak, lower node id wins.
        self.node_id < other.node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Score {
        Score {
            isolated: MilliCpu(1000),
            reserved: MilliCpu::ZERO,
            shared: MilliCpu(1000),
            colocated: 0,
            hints: BTreeMap::new(),
            affinity: 0.0,
            wants_isolated: false,
            prefers_shared: false,
            has_topology_hints: false,
            depth: 1,
            node_id: 1,
        }
    }

    #[test]
    fn infeasible_candidate_always_loses() {
        let mut bad = base();
        bad.isolated = MilliCpu(-1);
        bad.shared = MilliCpu(-1);
        let good = base();
        assert!(good.better_than(&bad));
        assert!(!bad.better_than(&good));
    }

    #[test]
    fn higher_affinity_wins() {
        let mut a = base();
        a.affinity = 2.0;
        let b = base();
        assert!(a.better_than(&b));
    }

    #[test]
    fn isolation_fit_beats_unsatisfying_candidate() {
        let mut a = base();
        a.wants_isolated = true;
        let mut b = base();
        b.wants_isolated = true;
        b.isolated = MilliCpu(-1);
        assert!(a.better_than(&b));
    }

    #[test]
    fn tight_fit_prefers_smaller_remaining() {
        let mut a = base();
        a.shared = MilliCpu(100);
        let mut b = base();
        b.shared = MilliCpu(500);
        assert!(a.better_than(&b));
    }

    #[test]
    fn colocation_prefers_more_when_shared_preferred() {
        let mut a = base();
        a.shared = MilliCpu(500);
        a.prefers_shared = true;
        a.colocated = 3;
        let mut b = base();
        b.shared = MilliCpu(500);
        b.prefers_shared = true;
        b.colocated = 1;
        assert!(a.better_than(&b));
    }

    #[test]
    fn topology_hints_prefer_leaves() {
        let mut a = base();
        a.shared = MilliCpu(500);
        a.has_topology_hints = true;
        a.depth = 3;
        let mut b = base();
        b.shared = MilliCpu(500);
        b.has_topology_hints = true;
        b.depth = 1;
        assert!(a.better_than(&b));
    }

    #[test]
    fn no_hints_prefers_root() {
        let mut a = base();
        a.shared = MilliCpu(500);
        a.depth = 1;
        let mut b = base();
        b.shared = MilliCpu(500);
        b.depth = 3;
        assert!(a.better_than(&b));
    }

    #[test]
    fn stable_tiebreak_by_node_id() {
        let mut a = base();
        a.shared = MilliCpu(500);
        a.node_id = 2;
        let mut b = base();
        b.shared = MilliCpu(500);
        b.node_id = 5;
        assert!(a.better_than(&b));
    }

    #[test]
    fn eval_is_constant() {
        assert_eq!(base().eval(), 1.0);
    }
}
