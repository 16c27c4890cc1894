//! Core placement data structures.
//!
//! Defines the packed netlist consumed by the placer (nets of `(block, port)`
//! pins), the placement and cluster maps produced by the pipeline, and the
//! two netlist-level derivations the phases share: cluster graph reduction
//! and register fold-pair extraction.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tessera_arch::Device;
use tessera_common::{BlockId, BlockKind, ClusterId, NetId, Position};

use crate::error::PlaceError;

/// A connection of a block port to a net.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    /// The connected block.
    pub block: BlockId,
    /// The port name on the block (`out`, `in`, `data0`, ...).
    pub port: String,
}

impl Pin {
    /// Creates a pin from a block and a port name.
    pub fn new(block: BlockId, port: impl Into<String>) -> Self {
        Self {
            block,
            port: port.into(),
        }
    }
}

/// A net: an ordered pin list whose first entry is the source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Net {
    /// The pins on this net, source first.
    pub pins: Vec<Pin>,
}

impl Net {
    /// Creates a net from a pin list.
    pub fn new(pins: Vec<Pin>) -> Self {
        Self { pins }
    }

    /// The source pin, when the net is non-empty.
    pub fn source(&self) -> Option<&Pin> {
        self.pins.first()
    }

    /// Iterates over the distinct blocks on this net, in pin order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        let mut seen = BTreeSet::new();
        self.pins
            .iter()
            .filter(move |pin| seen.insert(pin.block))
            .map(|pin| pin.block)
    }
}

/// The packed netlist: nets keyed by id, reproducible iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Netlist {
    nets: BTreeMap<NetId, Net>,
}

impl Netlist {
    /// Creates an empty netlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a net, replacing any previous net with the same id.
    pub fn insert(&mut self, id: NetId, net: Net) {
        self.nets.insert(id, net);
    }

    /// The net with the given id, if present.
    pub fn net(&self, id: NetId) -> Option<&Net> {
        self.nets.get(&id)
    }

    /// Iterates over all nets in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (NetId, &Net)> {
        self.nets.iter().map(|(id, net)| (*id, net))
    }

    /// Number of nets.
    pub fn len(&self) -> usize {
        self.nets.len()
    }

    /// Returns whether the netlist has no nets.
    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    /// The set of distinct blocks appearing on any net.
    pub fn blocks(&self) -> BTreeSet<BlockId> {
        self.nets
            .values()
            .flat_map(|net| net.pins.iter().map(|pin| pin.block))
            .collect()
    }

    /// Validates the netlist shape: no empty or single-pin nets, no
    /// pseudo-blocks in the input.
    pub fn validate(&self) -> Result<(), PlaceError> {
        for (id, net) in &self.nets {
            if net.pins.len() < 2 {
                return Err(PlaceError::InvalidInput(format!(
                    "net {id} has {} pins, expected at least 2",
                    net.pins.len()
                )));
            }
            for pin in &net.pins {
                if pin.block.is_pseudo() {
                    return Err(PlaceError::InvalidInput(format!(
                        "net {id} references cluster pseudo-block {}",
                        pin.block
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Block positions, fixed entries included.
pub type Placement = BTreeMap<BlockId, Position>;

/// Pre-fixed block positions (I/O pads); never moved by the placer.
pub type FixedPositions = BTreeMap<BlockId, Position>;

/// Per-block embedding vectors supplied by the external trainer.
pub type EmbeddingMap = BTreeMap<BlockId, Vec<f32>>;

/// Cluster membership produced by the clusterer.
pub type Clusters = BTreeMap<ClusterId, BTreeSet<BlockId>>;

/// Concrete cells assigned to each cluster by the global placer's squeeze.
pub type ClusterCells = BTreeMap<ClusterId, BTreeSet<Position>>;

/// Reduces a netlist to a cluster's point of view.
///
/// Every block outside `target` (and outside `fixed`) is replaced by the
/// pseudo-block of its cluster; duplicate entries within a net collapse to
/// the first occurrence and nets left with fewer than two entries are
/// dropped. With `target = None` every clustered block becomes a pseudo,
/// which models inter-cluster wirelength only — the global placer's view.
///
/// Pseudo-blocks already present map to themselves, so the reduction is
/// idempotent.
pub fn reduce_cluster_graph(
    netlist: &Netlist,
    clusters: &Clusters,
    fixed: &FixedPositions,
    target: Option<ClusterId>,
) -> Netlist {
    let mut block_cluster: BTreeMap<BlockId, ClusterId> = BTreeMap::new();
    for (&cid, members) in clusters {
        for &block in members {
            block_cluster.insert(block, cid);
        }
    }

    let mut reduced = Netlist::new();
    for (id, net) in netlist.iter() {
        let mut pins: Vec<Pin> = Vec::new();
        let mut seen = BTreeSet::new();
        for pin in &net.pins {
            let block = if fixed.contains_key(&pin.block) || pin.block.is_pseudo() {
                pin.block
            } else {
                match block_cluster.get(&pin.block) {
                    Some(&cid) if Some(cid) != target => BlockId::cluster(cid),
                    _ => pin.block,
                }
            };
            if seen.insert(block) {
                pins.push(Pin::new(block, pin.port.clone()));
            }
        }
        if pins.len() >= 2 {
            reduced.insert(id, Net::new(pins));
        }
    }
    reduced
}

/// Derives the register fold pairs from a netlist.
///
/// A register is foldable onto a PE when the net's source pin is that PE's
/// fold-source port and the register's own pin uses one of the device's
/// fold-sink ports. The first qualifying driver wins.
pub fn fold_pairs(netlist: &Netlist, device: &Device) -> BTreeMap<BlockId, BlockId> {
    let mut pairs = BTreeMap::new();
    for (_, net) in netlist.iter() {
        let Some(source) = net.source() else {
            continue;
        };
        if source.block.kind != BlockKind::Pe || source.port != device.fold_source_port() {
            continue;
        }
        for pin in &net.pins[1..] {
            if pin.block.kind == BlockKind::Reg && device.is_fold_sink_port(&pin.port) {
                pairs.entry(pin.block).or_insert(source.block);
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_arch::mock_cgra;

    fn blk(s: &str) -> BlockId {
        s.parse().unwrap()
    }

    fn net(entries: &[(&str, &str)]) -> Net {
        Net::new(
            entries
                .iter()
                .map(|(b, p)| Pin::new(blk(b), *p))
                .collect(),
        )
    }

    fn sample_netlist() -> Netlist {
        let mut nl = Netlist::new();
        nl.insert(NetId(0), net(&[("p0", "out"), ("p1", "in")]));
        nl.insert(NetId(1), net(&[("p1", "out"), ("p2", "in"), ("m0", "wen")]));
        nl.insert(NetId(2), net(&[("i0", "out"), ("p0", "data0")]));
        nl
    }

    fn sample_clusters() -> Clusters {
        let mut clusters = Clusters::new();
        clusters.insert(ClusterId(0), [blk("p0"), blk("p1")].into_iter().collect());
        clusters.insert(ClusterId(1), [blk("p2"), blk("m0")].into_iter().collect());
        clusters
    }

    #[test]
    fn blocks_are_deduplicated() {
        let n = net(&[("p0", "out"), ("p1", "in"), ("p0", "data1")]);
        assert_eq!(n.blocks().collect::<Vec<_>>(), vec![blk("p0"), blk("p1")]);
    }

    #[test]
    fn validate_rejects_singleton_net() {
        let mut nl = Netlist::new();
        nl.insert(NetId(0), net(&[("p0", "out")]));
        assert!(matches!(nl.validate(), Err(PlaceError::InvalidInput(_))));
    }

    #[test]
    fn validate_rejects_pseudo_blocks() {
        let mut nl = Netlist::new();
        nl.insert(NetId(0), net(&[("p0", "out"), ("x0", "in")]));
        assert!(matches!(nl.validate(), Err(PlaceError::InvalidInput(_))));
    }

    #[test]
    fn validate_accepts_sample() {
        assert!(sample_netlist().validate().is_ok());
        assert!(Netlist::new().validate().is_ok());
    }

    #[test]
    fn reduction_for_one_cluster() {
        let nl = sample_netlist();
        let clusters = sample_clusters();
        let mut fixed = FixedPositions::new();
        fixed.insert(blk("i0"), Position::new(0, 1));

        let reduced = reduce_cluster_graph(&nl, &clusters, &fixed, Some(ClusterId(0)));
        // net e0 is fully inside cluster 0 and survives unchanged
        let e0 = reduced.net(NetId(0)).unwrap();
        assert_eq!(e0.blocks().collect::<Vec<_>>(), vec![blk("p0"), blk("p1")]);
        // net e1 bridges to cluster 1: p2 and m0 collapse to the x1 pseudo
        let e1 = reduced.net(NetId(1)).unwrap();
        assert_eq!(e1.blocks().collect::<Vec<_>>(), vec![blk("p1"), blk("x1")]);
        // net e2 keeps the fixed io block
        let e2 = reduced.net(NetId(2)).unwrap();
        assert_eq!(e2.blocks().collect::<Vec<_>>(), vec![blk("i0"), blk("p0")]);
    }

    #[test]
    fn reduction_drops_internal_nets_for_global_view() {
        let nl = sample_netlist();
        let clusters = sample_clusters();
        let fixed = FixedPositions::new();

        let reduced = reduce_cluster_graph(&nl, &clusters, &fixed, None);
        // e0 collapses into a single pseudo and is dropped
        assert!(reduced.net(NetId(0)).is_none());
        // e1 bridges clusters 0 and 1
        let e1 = reduced.net(NetId(1)).unwrap();
        assert_eq!(e1.blocks().collect::<Vec<_>>(), vec![blk("x0"), blk("x1")]);
    }

    #[test]
    fn reduction_is_idempotent() {
        let nl = sample_netlist();
        let clusters = sample_clusters();
        let mut fixed = FixedPositions::new();
        fixed.insert(blk("i0"), Position::new(0, 1));

        for target in [None, Some(ClusterId(0)), Some(ClusterId(1))] {
            let once = reduce_cluster_graph(&nl, &clusters, &fixed, target);
            let twice = reduce_cluster_graph(&once, &clusters, &fixed, target);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn fold_pairs_from_source_port() {
        let device = mock_cgra(6);
        let mut nl = Netlist::new();
        nl.insert(NetId(0), net(&[("p0", "out"), ("r0", "in")]));
        nl.insert(NetId(1), net(&[("p1", "out"), ("r1", "reg"), ("p2", "in")]));
        // register driven through a non-fold port does not fold
        nl.insert(NetId(2), net(&[("p2", "out"), ("r2", "data0")]));
        // memory source does not fold its register
        nl.insert(NetId(3), net(&[("m0", "out"), ("r3", "in")]));

        let pairs = fold_pairs(&nl, &device);
        assert_eq!(pairs.get(&blk("r0")), Some(&blk("p0")));
        assert_eq!(pairs.get(&blk("r1")), Some(&blk("p1")));
        assert!(!pairs.contains_key(&blk("r2")));
        assert!(!pairs.contains_key(&blk("r3")));
    }

    #[test]
    fn netlist_serde_roundtrip() {
        let nl = sample_netlist();
        let json = serde_json::to_string(&nl).unwrap();
        let restored: Netlist = serde_json::from_str(&json).unwrap();
        assert_eq!(nl, restored);
    }
}
