//! node2vec-style biased random walks over the bipartite netlist graph.
//!
//! Walks are generated in `num_walks` rounds. Each round shuffles the node
//! list with an RNG derived from the round index alone and walks from every
//! non-pseudo node, so the corpus is identical for any worker count. The
//! walk corpus feeds the external embedding trainer; only the corpus format
//! is defined here.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use tessera_common::{derive_seed, CancelToken};

use crate::alias::AliasTable;
use crate::error::PlaceError;
use crate::graph::{WalkGraph, WalkNode};

/// Parameters for walk generation, per device profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalkParams {
    /// Return parameter: lower values keep the walk near its origin.
    pub p: f64,
    /// In-out parameter: lower values push the walk outward.
    pub q: f64,
    /// Number of steps per walk.
    pub walk_length: usize,
    /// Number of walk rounds over all nodes.
    pub num_walks: usize,
    /// Embedding dimensionality requested from the trainer.
    pub dim: usize,
}

impl WalkParams {
    /// The CGRA profile.
    pub fn cgra() -> Self {
        Self {
            p: 0.6,
            q: 1.0,
            walk_length: 20,
            num_walks: 8,
            dim: 12,
        }
    }

    /// The FPGA profile: longer walks for the larger netlists.
    pub fn fpga() -> Self {
        Self {
            walk_length: 40,
            num_walks: 10,
            ..Self::cgra()
        }
    }

    /// Picks the profile for the targeted device family.
    pub fn for_device(is_fpga: bool) -> Self {
        if is_fpga {
            Self::fpga()
        } else {
            Self::cgra()
        }
    }
}

impl Default for WalkParams {
    fn default() -> Self {
        Self::cgra()
    }
}

/// The walk engine: precomputed transition tables over a [`WalkGraph`].
pub struct WalkEngine<'g> {
    graph: &'g WalkGraph,
    alias_nodes: Vec<Option<AliasTable>>,
    alias_edges: HashMap<(u32, u32), AliasTable>,
}

impl<'g> WalkEngine<'g> {
    /// Precomputes the first-step and edge transition tables.
    ///
    /// The first-step table for a node is built over the single-entry weight
    /// vector `[1/deg]`; the edge table for `(src, dst)` weighs each sorted
    /// neighbor `w` of `dst` with `1/p` when `w == src`, `1` when `w` also
    /// neighbors `src`, and `1/q` otherwise.
    pub fn new(graph: &'g WalkGraph, p: f64, q: f64) -> Self {
        let alias_nodes = (0..graph.node_count() as u32)
            .map(|n| {
                let deg = graph.neighbors(n).len();
                if deg == 0 {
                    None
                } else {
                    Some(AliasTable::new(&[1.0 / deg as f64]))
                }
            })
            .collect();

        let mut alias_edges = HashMap::new();
        for (src, dst) in graph.directed_edges() {
            let weights: Vec<f64> = graph
                .neighbors(dst)
                .iter()
                .map(|&w| {
                    if w == src {
                        1.0 / p
                    } else if graph.has_edge(w, src) {
                        1.0
                    } else {
                        1.0 / q
                    }
                })
                .collect();
            alias_edges.insert((src, dst), AliasTable::new(&weights));
        }

        Self {
            graph,
            alias_nodes,
            alias_edges,
        }
    }

    /// Simulates one walk from `start`, stopping at `walk_length` nodes or at
    /// a node with no neighbors.
    pub fn walk_from(&self, start: u32, walk_length: usize, rng: &mut StdRng) -> Vec<WalkNode> {
        let mut walk = vec![start];
        while walk.len() < walk_length {
            let cur = walk[walk.len() - 1];
            let neighbors = self.graph.neighbors(cur);
            if neighbors.is_empty() {
                break;
            }
            let next = if walk.len() == 1 {
                match &self.alias_nodes[cur as usize] {
                    Some(table) => neighbors[table.draw(rng)],
                    None => break,
                }
            } else {
                let prev = walk[walk.len() - 2];
                neighbors[self.alias_edges[&(prev, cur)].draw(rng)]
            };
            walk.push(next);
        }
        walk.into_iter().map(|idx| self.graph.node(idx)).collect()
    }

    /// Runs one walk round: shuffles the node order with the round RNG and
    /// walks from every non-pseudo node.
    fn walk_round(&self, walk_length: usize, rng: &mut StdRng) -> Vec<Vec<WalkNode>> {
        let mut order: Vec<u32> = (0..self.graph.node_count() as u32).collect();
        order.shuffle(rng);
        order
            .into_iter()
            .filter(|&n| !self.graph.node(n).is_pseudo())
            .map(|n| self.walk_from(n, walk_length, rng))
            .collect()
    }
}

/// Generates the full walk corpus in parallel rounds.
///
/// Round `i` uses an RNG seeded from `(seed, i)` only, and rounds are
/// concatenated in ascending index order, so the corpus is deterministic for
/// a given seed regardless of the worker-pool size.
pub fn generate_walks(
    graph: &WalkGraph,
    params: &WalkParams,
    seed: u64,
    cancel: &CancelToken,
) -> Result<Vec<Vec<WalkNode>>, PlaceError> {
    let engine = WalkEngine::new(graph, params.p, params.q);
    log::debug!(
        "generating {} walk rounds over {} nodes",
        params.num_walks,
        graph.node_count()
    );

    let rounds: Result<Vec<Vec<Vec<WalkNode>>>, PlaceError> = (0..params.num_walks as u64)
        .into_par_iter()
        .map(|round| {
            if cancel.is_cancelled() {
                return Err(PlaceError::Cancelled);
            }
            let mut rng = StdRng::seed_from_u64(derive_seed(seed, "walk", round));
            Ok(engine.walk_round(params.walk_length, &mut rng))
        })
        .collect();

    Ok(rounds?.into_iter().flatten().collect())
}

/// Writes the walk corpus in the trainer's textual layout: node tokens
/// separated by spaces, one walk per line.
pub fn write_walk_corpus<W: Write>(walks: &[Vec<WalkNode>], out: &mut W) -> io::Result<()> {
    for walk in walks {
        let mut first = true;
        for node in walk {
            if !first {
                write!(out, " ")?;
            }
            write!(out, "{node}")?;
            first = false;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Net, Netlist, Pin};
    use tessera_common::{BlockId, NetId};

    fn blk(s: &str) -> BlockId {
        s.parse().unwrap()
    }

    fn chain_netlist(n: usize) -> Netlist {
        let mut nl = Netlist::new();
        for i in 0..n {
            nl.insert(
                NetId(i as u32),
                Net::new(vec![
                    Pin::new(BlockId::new(tessera_common::BlockKind::Pe, i as u32), "out"),
                    Pin::new(
                        BlockId::new(tessera_common::BlockKind::Pe, i as u32 + 1),
                        "in",
                    ),
                ]),
            );
        }
        nl
    }

    #[test]
    fn profiles() {
        assert_eq!(WalkParams::cgra().walk_length, 20);
        assert_eq!(WalkParams::fpga().walk_length, 40);
        assert_eq!(WalkParams::for_device(true), WalkParams::fpga());
        assert_eq!(WalkParams::for_device(false), WalkParams::cgra());
    }

    #[test]
    fn walk_alternates_blocks_and_nets() {
        let nl = chain_netlist(4);
        let graph = WalkGraph::from_netlist(&nl);
        let engine = WalkEngine::new(&graph, 0.6, 1.0);
        let start = graph.node_index(WalkNode::Block(blk("p2"))).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let walk = engine.walk_from(start, 15, &mut rng);
        assert_eq!(walk.len(), 15);
        for pair in walk.windows(2) {
            let alternates = matches!(
                (pair[0], pair[1]),
                (WalkNode::Block(_), WalkNode::Net(_)) | (WalkNode::Net(_), WalkNode::Block(_))
            );
            assert!(alternates, "walk must alternate across the bipartition");
        }
    }

    #[test]
    fn walk_stops_at_isolated_node() {
        let graph = WalkGraph::from_netlist(&chain_netlist(2));
        let engine = WalkEngine::new(&graph, 0.6, 1.0);
        // every node in the chain has neighbors, so fabricate isolation by
        // asking for a one-step walk
        let start = graph.node_index(WalkNode::Block(blk("p0"))).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(engine.walk_from(start, 1, &mut rng).len(), 1);
    }

    #[test]
    fn corpus_is_deterministic() {
        let nl = chain_netlist(6);
        let graph = WalkGraph::from_netlist(&nl);
        let params = WalkParams::cgra();
        let cancel = CancelToken::new();
        let a = generate_walks(&graph, &params, 42, &cancel).unwrap();
        let b = generate_walks(&graph, &params, 42, &cancel).unwrap();
        assert_eq!(a, b);
        let c = generate_walks(&graph, &params, 43, &cancel).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn corpus_covers_every_round() {
        let nl = chain_netlist(3);
        let graph = WalkGraph::from_netlist(&nl);
        let params = WalkParams {
            num_walks: 4,
            ..WalkParams::cgra()
        };
        let walks = generate_walks(&graph, &params, 0, &CancelToken::new()).unwrap();
        assert_eq!(walks.len(), 4 * graph.node_count());
    }

    #[test]
    fn cancelled_generation_fails() {
        let nl = chain_netlist(3);
        let graph = WalkGraph::from_netlist(&nl);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = generate_walks(&graph, &WalkParams::cgra(), 0, &cancel).unwrap_err();
        assert!(matches!(err, PlaceError::Cancelled));
    }

    #[test]
    fn corpus_text_layout() {
        let walks = vec![
            vec![WalkNode::Block(blk("p0")), WalkNode::Net(NetId(0))],
            vec![WalkNode::Block(blk("p1"))],
        ];
        let mut buf = Vec::new();
        write_walk_corpus(&walks, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "p0 e0\np1\n");
    }
}
