//! Placement cost: half-perimeter wirelength.
//!
//! HPWL is the half-perimeter of the bounding box of a net's block positions,
//! the standard placement proxy for routed wirelength. Cluster pseudo-blocks
//! participate like any other block: the caller puts their centroid into the
//! position map.

use crate::data::{Net, Netlist, Placement};

/// Computes the HPWL of a single net over the given positions.
///
/// Blocks without a position are skipped; a net with fewer than two located
/// blocks contributes zero.
pub fn net_hpwl(net: &Net, positions: &Placement) -> f64 {
    let mut min_x = u32::MAX;
    let mut max_x = 0u32;
    let mut min_y = u32::MAX;
    let mut max_y = 0u32;
    let mut found = false;

    for block in net.blocks() {
        if let Some(pos) = positions.get(&block) {
            min_x = min_x.min(pos.x);
            max_x = max_x.max(pos.x);
            min_y = min_y.min(pos.y);
            max_y = max_y.max(pos.y);
            found = true;
        }
    }

    if !found {
        return 0.0;
    }
    f64::from(max_x - min_x) + f64::from(max_y - min_y)
}

/// Computes the total HPWL over all nets.
pub fn total_hpwl(netlist: &Netlist, positions: &Placement) -> f64 {
    netlist
        .iter()
        .map(|(_, net)| net_hpwl(net, positions))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Net, Pin};
    use tessera_common::{BlockId, NetId, Position};

    fn blk(s: &str) -> BlockId {
        s.parse().unwrap()
    }

    fn net(blocks: &[&str]) -> Net {
        Net::new(blocks.iter().map(|b| Pin::new(blk(b), "in")).collect())
    }

    #[test]
    fn two_block_net() {
        let mut positions = Placement::new();
        positions.insert(blk("p0"), Position::new(1, 1));
        positions.insert(blk("p1"), Position::new(4, 3));
        assert_eq!(net_hpwl(&net(&["p0", "p1"]), &positions), 5.0);
    }

    #[test]
    fn coincident_blocks_cost_nothing() {
        let mut positions = Placement::new();
        positions.insert(blk("p0"), Position::new(2, 2));
        positions.insert(blk("r0"), Position::new(2, 2));
        assert_eq!(net_hpwl(&net(&["p0", "r0"]), &positions), 0.0);
    }

    #[test]
    fn unplaced_blocks_are_skipped() {
        let mut positions = Placement::new();
        positions.insert(blk("p0"), Position::new(0, 0));
        positions.insert(blk("p2"), Position::new(3, 0));
        assert_eq!(net_hpwl(&net(&["p0", "p1", "p2"]), &positions), 3.0);
        assert_eq!(net_hpwl(&net(&["p9"]), &positions), 0.0);
    }

    #[test]
    fn pseudo_blocks_participate() {
        let mut positions = Placement::new();
        positions.insert(blk("p0"), Position::new(0, 0));
        positions.insert(blk("x1"), Position::new(5, 5));
        assert_eq!(net_hpwl(&net(&["p0", "x1"]), &positions), 10.0);
    }

    #[test]
    fn total_sums_all_nets() {
        let mut nl = Netlist::new();
        nl.insert(NetId(0), net(&["p0", "p1"]));
        nl.insert(NetId(1), net(&["p1", "p2"]));
        let mut positions = Placement::new();
        positions.insert(blk("p0"), Position::new(0, 0));
        positions.insert(blk("p1"), Position::new(2, 0));
        positions.insert(blk("p2"), Position::new(2, 4));
        assert_eq!(total_hpwl(&nl, &positions), 6.0);
        assert_eq!(total_hpwl(&Netlist::new(), &positions), 0.0);
    }
}
