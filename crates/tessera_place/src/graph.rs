//! The bipartite walk graph.
//!
//! The netlist is expanded into an undirected bipartite graph with one node
//! per block and one per net; each net connects to its member blocks (star
//! expansion). Duplicate edges collapse and edges carry no weight. Nodes and
//! neighbor lists are sorted, so sampled indices map to a deterministic
//! ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tessera_common::{BlockId, NetId};

use crate::data::Netlist;

/// A node in the walk graph: a real block or a net.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum WalkNode {
    /// A block node.
    Block(BlockId),
    /// A net node.
    Net(NetId),
}

impl WalkNode {
    /// Returns whether this node is a cluster pseudo-block.
    pub fn is_pseudo(self) -> bool {
        matches!(self, WalkNode::Block(b) if b.is_pseudo())
    }
}

impl fmt::Display for WalkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkNode::Block(b) => write!(f, "{b}"),
            WalkNode::Net(n) => write!(f, "{n}"),
        }
    }
}

/// The frozen walk graph: sorted node arena with sorted adjacency lists.
#[derive(Debug, Clone)]
pub struct WalkGraph {
    nodes: Vec<WalkNode>,
    adjacency: Vec<Vec<u32>>,
    index: HashMap<WalkNode, u32>,
}

impl WalkGraph {
    /// Builds the bipartite graph from a netlist.
    pub fn from_netlist(netlist: &Netlist) -> Self {
        let mut edges: BTreeMap<WalkNode, BTreeSet<WalkNode>> = BTreeMap::new();
        for (id, net) in netlist.iter() {
            let net_node = WalkNode::Net(id);
            edges.entry(net_node).or_default();
            for block in net.blocks() {
                let block_node = WalkNode::Block(block);
                edges.entry(block_node).or_default().insert(net_node);
                edges.entry(net_node).or_default().insert(block_node);
            }
        }

        let nodes: Vec<WalkNode> = edges.keys().copied().collect();
        let index: HashMap<WalkNode, u32> = nodes
            .iter()
            .enumerate()
            .map(|(i, &n)| (n, i as u32))
            .collect();
        let adjacency = nodes
            .iter()
            .map(|n| edges[n].iter().map(|nbr| index[nbr]).collect())
            .collect();

        Self {
            nodes,
            adjacency,
            index,
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The node stored at `idx`.
    pub fn node(&self, idx: u32) -> WalkNode {
        self.nodes[idx as usize]
    }

    /// The arena index of `node`, if present.
    pub fn node_index(&self, node: WalkNode) -> Option<u32> {
        self.index.get(&node).copied()
    }

    /// The sorted neighbor indices of `idx`.
    pub fn neighbors(&self, idx: u32) -> &[u32] {
        &self.adjacency[idx as usize]
    }

    /// Returns whether an edge connects `a` and `b`.
    pub fn has_edge(&self, a: u32, b: u32) -> bool {
        self.adjacency[a as usize].binary_search(&b).is_ok()
    }

    /// Iterates over all directed edges `(src, dst)`.
    pub fn directed_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(src, nbrs)| nbrs.iter().map(move |&dst| (src as u32, dst)))
    }
}
