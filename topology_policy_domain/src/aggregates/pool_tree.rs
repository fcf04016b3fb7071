// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PoolTree (§4.2)
//!
//! The hardware hierarchy: sockets, optionally dies, NUMA nodes, and a
//! synthetic virtual root when the machine has more than one socket.
//! Following the design notes on the cyclic parent/child relationship, the
//! tree is an arena — a flat `Vec<Node>` addressed by [`NodeId`] — so
//! traversal never holds a borrow across a mutation.

use crate::entities::node::{Node, NodeKind};
use crate::entities::supply::Supply;
use crate::error::Result;
use crate::value_objects::{CpuSet, MemTier, NodeId, TopologyHint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// `OverfitPenalty` (§4.2/§4.4): multiplies hint scores that match at a
/// coarser granularity than the hint itself describes.
pub const OVERFIT_PENALTY: f64 = 0.9;

/// Declarative hardware description fed in by the (external) system
/// adapter — §4.2 steps 1-5 are driven from this rather than reading
/// sysfs directly, since hardware enumeration is out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredTopology {
    pub sockets: Vec<DiscoveredSocket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredSocket {
    pub socket_id: u32,
    /// One entry per die. A single entry means the socket has no
    /// separate die level (§4.2 step 4): its NUMA nodes attach directly
    /// under the socket.
    pub dies: Vec<DiscoveredDie>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveredDie {
    pub die_id: u32,
    pub numas: Vec<DiscoveredNuma>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredNuma {
    pub numa_id: u32,
    pub capacity: Supply,
}

#[derive(Debug, Clone)]
pub struct PoolTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl PoolTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// §4.2 construction steps 1-7: builds the tree from a discovered
    /// hardware description, assigning ids in depth-first order and
    /// filling capacity bottom-up via `Supply::cumulate`.
    pub fn build(topology: &DiscoveredTopology) -> PoolTree {
        let mut nodes: Vec<Node> = Vec::new();
        let multi_socket = topology.sockets.len() > 1;

        let root_id = NodeId(0);
        if multi_socket {
            nodes.push(blank_node(root_id, "virtual".to_string(), NodeKind::Virtual, 0, None));
        }

        for socket in &topology.sockets {
            let socket_depth = if multi_socket { 1 } else { 0 };
            let socket_parent = if multi_socket { Some(root_id) } else { None };
            let socket_node_id = NodeId(nodes.len() as u32);
            nodes.push(blank_node(
                socket_node_id,
                format!("socket{}", socket.socket_id),
                NodeKind::Socket {
                    socket_id: socket.socket_id,
                },
                socket_depth,
                socket_parent,
            ));

            let multi_die = socket.dies.len() > 1;
            for die in &socket.dies {
                let (die_node_id, die_depth) = if multi_die {
                    let id = NodeId(nodes.len() as u32);
                    nodes.push(blank_node(
                        id,
                        format!("socket{}die{}", socket.socket_id, die.die_id),
                        NodeKind::Die {
                            socket_id: socket.socket_id,
                            die_id: die.die_id,
                        },
                        socket_depth + 1,
                        Some(socket_node_id),
                    ));
                    (id, socket_depth + 1)
                } else {
                    (socket_node_id, socket_depth)
                };

                if die.numas.len() > 1 || multi_die {
                    for numa in &die.numas {
                        let numa_node_id = NodeId(nodes.len() as u32);
                        let mut node = blank_node(
                            numa_node_id,
                            format!("numa{}", numa.numa_id),
                            NodeKind::Numa { numa_id: numa.numa_id },
                            die_depth + 1,
                            Some(die_node_id),
                        );
                        node.numas = vec![numa.numa_id];
                        node.capacity = numa.capacity.clone();
                        node.free = numa.capacity.clone();
                        node.mem_controllers = mem_controllers_from_tiers(&numa.capacity);
                        nodes.push(node);
                    }
                } else if let Some(numa) = die.numas.first() {
                    // A single NUMA node per die/socket: fold its capacity
                    // directly into the die/socket node rather than
                    // creating a redundant extra level.
                    let target = &mut nodes[die_node_id.index()];
                    target.numas = vec![numa.numa_id];
                    target.capacity = numa.capacity.clone();
                    target.free = numa.capacity.clone();
                    target.mem_controllers = mem_controllers_from_tiers(&numa.capacity);
                }
            }
        }

        link_children(&mut nodes);
        cumulate_bottom_up(&mut nodes);

        PoolTree { nodes, root: root_id }
    }

    /// §4.2: depth-first traversal, short-circuiting on the first `Err`.
    pub fn depth_first<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Node) -> Result<()>,
    {
        self.depth_first_from(self.root, &mut f)
    }

    fn depth_first_from<F>(&self, id: NodeId, f: &mut F) -> Result<()>
    where
        F: FnMut(&Node) -> Result<()>,
    {
        let node = self.node(id);
        f(node)?;
        for &child in &node.children.clone() {
            self.depth_first_from(child, f)?;
        }
        Ok(())
    }

    /// §4.2: breadth-first traversal, short-circuiting on the first `Err`.
    pub fn breadth_first<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Node) -> Result<()>,
    {
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.root);
        while let Some(id) = queue.pop_front() {
            let node = self.node(id);
            f(node)?;
            for &child in &node.children {
                queue.push_back(child);
            }
        }
        Ok(())
    }

    /// Node-to-root ancestor chain for `id`, not including `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            out.push(p);
            current = self.node(p).parent;
        }
        out
    }

    /// Every node in `id`'s subtree, not including `id` itself. Used by
    /// extra-memory-reservation bookkeeping (§4.1), which is recorded on
    /// every descendant of the node a grant is actually anchored at.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.clone();
        while let Some(child) = stack.pop() {
            stack.extend(self.node(child).children.iter().copied());
            out.push(child);
        }
        out
    }

    /// The enclosing socket id for any node (itself if it is a socket).
    pub fn socket_of(&self, id: NodeId) -> Option<u32> {
        if let Some(s) = self.node(id).socket_id() {
            return Some(s);
        }
        for ancestor in self.ancestors(id) {
            if let Some(s) = self.node(ancestor).socket_id() {
                return Some(s);
            }
        }
        None
    }

    /// Count of NUMA nodes under the given socket id, used to divide the
    /// socket-hint contribution at the NUMA level (§4.2 "penalize underfit
    /// reciprocal to the socket size").
    pub fn numa_count_for_socket(&self, socket_id: u32) -> u32 {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Numa { .. }) && self.socket_of(n.id) == Some(socket_id))
            .count() as u32
    }

    /// §4.2/§4.4: the combined hint score for `node` against one provider's
    /// [`TopologyHint`].
    pub fn hint_score(&self, id: NodeId, hint: &TopologyHint) -> f64 {
        let node = self.node(id);
        let cpu_component = cpu_hint(&node.full_cpuset(), &hint.cpus);

        match node.kind {
            NodeKind::Numa { .. } => {
                let numa_component = numa_hint(&node.numas, &hint.numas);
                let socket_component = match self.socket_of(id) {
                    Some(socket_id) => {
                        let count = self.numa_count_for_socket(socket_id).max(1) as f64;
                        socket_hint(Some(socket_id), &hint.sockets) / count
                    }
                    None => 0.0,
                };
                cpu_component + numa_component + socket_component
            }
            NodeKind::Die { socket_id, .. } => {
                let numa_component = numa_hint(&node.numas, &hint.numas) * OVERFIT_PENALTY;
                let socket_component = socket_hint(Some(socket_id), &hint.sockets);
                cpu_component + numa_component + socket_component
            }
            NodeKind::Socket { socket_id } => {
                let numa_component = numa_hint(&node.numas, &hint.numas) * OVERFIT_PENALTY;
                let socket_component = socket_hint(Some(socket_id), &hint.sockets);
                cpu_component + numa_component + socket_component
            }
            NodeKind::Virtual => {
                let numa_component = numa_hint(&node.numas, &hint.numas) * OVERFIT_PENALTY * OVERFIT_PENALTY;
                let socket_component = if hint.sockets.is_empty() { 0.0 } else { OVERFIT_PENALTY };
                cpu_component + numa_component + socket_component
            }
        }
    }
}

fn cpu_hint(node_cpus: &CpuSet, hint_cpus: &CpuSet) -> f64 {
    if hint_cpus.is_empty() {
        return 0.0;
    }
    hint_cpus.intersection_count(node_cpus) as f64 / hint_cpus.len() as f64
}

fn numa_hint(node_numas: &[u32], hint_numas: &[u32]) -> f64 {
    if hint_numas.iter().any(|n| node_numas.contains(n)) {
        1.0
    } else {
        0.0
    }
}

fn socket_hint(node_socket: Option<u32>, hint_sockets: &[u32]) -> f64 {
    match node_socket {
        Some(s) if hint_sockets.contains(&s) => 1.0,
        _ => 0.0,
    }
}

fn blank_node(id: NodeId, name: String, kind: NodeKind, depth: u32, parent: Option<NodeId>) -> Node {
    Node {
        id,
        name,
        kind,
        depth,
        parent,
        children: Vec::new(),
        numas: Vec::new(),
        capacity: Supply::new(),
        free: Supply::new(),
        mem_controllers: std::collections::BTreeMap::new(),
    }
}

fn mem_controllers_from_tiers(supply: &Supply) -> std::collections::BTreeMap<MemTier, BTreeSet<u32>> {
    // The synthetic/system adapter is expected to populate controller-id
    // sets directly; this default groups the NUMA id itself under every
    // tier it holds free capacity for, which is refined by real adapters.
    let mut out = std::collections::BTreeMap::new();
    for tier in MemTier::ALL {
        if supply.mem.get(&tier).copied().unwrap_or(0) > 0 {
            out.insert(tier, BTreeSet::new());
        }
    }
    out
}

fn link_children(nodes: &mut [Node]) {
    let parents: Vec<Option<NodeId>> = nodes.iter().map(|n| n.parent).collect();
    for (idx, parent) in parents.into_iter().enumerate() {
        if let Some(p) = parent {
            nodes[p.index()].children.push(NodeId(idx as u32));
        }
    }
}

fn cumulate_bottom_up(nodes: &mut [Node]) {
    // Accumulate from the deepest nodes upward. Depth-descending order
    // over the flat arena is a valid reverse topological order since
    // children are always pushed after their parent.
    let mut order: Vec<NodeId> = (0..nodes.len()).map(|i| NodeId(i as u32)).collect();
    order.sort_by_key(|id| std::cmp::Reverse(nodes[id.index()].depth));

    for id in order {
        let children = nodes[id.index()].children.clone();
        if children.is_empty() {
            continue;
        }
        let mut cumulative = Supply::new();
        let mut numas = Vec::new();
        let mut mem_controllers: std::collections::BTreeMap<MemTier, BTreeSet<u32>> = std::collections::BTreeMap::new();
        for child in &children {
            let child_node = &nodes[child.index()];
            cumulative.cumulate(&child_node.capacity);
            numas.extend(child_node.numas.iter().copied());
            for (tier, ids) in &child_node.mem_controllers {
                mem_controllers.entry(*tier).or_default().extend(ids.iter().copied());
            }
        }
        let node = &mut nodes[id.index()];
        node.capacity = cumulative.clone();
        node.free = cumulative;
        node.numas = numas;
        node.mem_controllers = mem_controllers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::CpuSet as VCpuSet;

    fn numa(id: u32, cpus: &[u32], dram: u64) -> DiscoveredNuma {
        let mut supply = Supply::new();
        supply.sharable = VCpuSet::from_ids(cpus.iter().copied());
        supply.mem.insert(MemTier::Dram, dram);
        DiscoveredNuma { numa_id: id, capacity: supply }
    }

    fn two_socket_topology() -> DiscoveredTopology {
        DiscoveredTopology {
            sockets: vec![
                DiscoveredSocket {
                    socket_id: 0,
                    dies: vec![DiscoveredDie {
                        die_id: 0,
                        numas: vec![numa(0, &[0, 1, 2, 3], 10 * 1024 * 1024 * 1024)],
                    }],
                },
                DiscoveredSocket {
                    socket_id: 1,
                    dies: vec![DiscoveredDie {
                        die_id: 0,
                        numas: vec![numa(1, &[4, 5, 6, 7], 10 * 1024 * 1024 * 1024)],
                    }],
                },
            ],
        }
    }

    #[test]
    fn builds_virtual_root_for_multi_socket() {
        let tree = PoolTree::build(&two_socket_topology());
        assert!(matches!(tree.node(tree.root()).kind, NodeKind::Virtual));
        assert_eq!(tree.node(tree.root()).children.len(), 2);
    }

    #[test]
    fn root_capacity_is_union_of_leaves() {
        let tree = PoolTree::build(&two_socket_topology());
        assert_eq!(tree.node(tree.root()).capacity.sharable.len(), 8);
    }

    #[test]
    fn single_socket_has_no_virtual_root() {
        let topo = DiscoveredTopology {
            sockets: vec![DiscoveredSocket {
                socket_id: 0,
                dies: vec![DiscoveredDie {
                    die_id: 0,
                    numas: vec![numa(0, &[0, 1], 1024)],
                }],
            }],
        };
        let tree = PoolTree::build(&topo);
        assert!(matches!(tree.node(tree.root()).kind, NodeKind::Socket { .. }));
    }

    #[test]
    fn descendants_excludes_self_and_ancestors() {
        let tree = PoolTree::build(&two_socket_topology());
        let descendants = tree.descendants(tree.root());
        assert_eq!(descendants.len(), tree.len() - 1);
        assert!(!descendants.contains(&tree.root()));

        let numa_node = tree.iter().find(|n| matches!(n.kind, NodeKind::Numa { .. })).unwrap();
        assert!(tree.descendants(numa_node.id).is_empty());
    }

    #[test]
    fn depth_first_visits_every_node() {
        let tree = PoolTree::build(&two_socket_topology());
        let mut count = 0;
        tree.depth_first(|_| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, tree.len());
    }

    #[test]
    fn numa_hint_matches_physical_id() {
        let tree = PoolTree::build(&two_socket_topology());
        let numa_node = tree
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Numa { numa_id } if numa_id == 1))
            .unwrap();
        let hint = TopologyHint {
            cpus: VCpuSet::new(),
            numas: vec![1],
            sockets: vec![],
        };
        assert!(tree.hint_score(numa_node.id, &hint) > 0.0);
    }

    #[test]
    fn virtual_root_applies_double_overfit_penalty_to_numa_hints() {
        let tree = PoolTree::build(&two_socket_topology());
        let hint = TopologyHint {
            cpus: VCpuSet::new(),
            numas: vec![0],
            sockets: vec![],
        };
        let score = tree.hint_score(tree.root(), &hint);
        assert!((score - OVERFIT_PENALTY * OVERFIT_PENALTY).abs() < 1e-9);
    }
}
