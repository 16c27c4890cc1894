//! I/O pad seeding.
//!
//! I/O blocks go to fixed perimeter cells before any other phase runs. The
//! device's I/O cells are sorted by `x + y` and split in half: the first half
//! serves input pads (ordered by `x`), the second half output pads (ordered
//! by `y`). Blocks are assigned in ascending numeric-suffix order, matching
//! the downstream simulator's expectations.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tessera_arch::Device;
use tessera_common::{BlockId, Position};

use crate::data::{Netlist, Placement};
use crate::error::PlaceError;

/// The pad direction of an I/O block, derived from its net port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PadDirection {
    /// The block drives the fabric (its pin port is `out`).
    Input,
    /// The block is driven by the fabric (its pin port is `in`).
    Output,
}

fn io_directions(
    netlist: &Netlist,
    io_blocks: &BTreeSet<BlockId>,
) -> Result<BTreeMap<BlockId, PadDirection>, PlaceError> {
    let mut directions = BTreeMap::new();
    for (id, net) in netlist.iter() {
        for pin in &net.pins {
            if !io_blocks.contains(&pin.block) {
                continue;
            }
            let direction = match pin.port.as_str() {
                "out" => PadDirection::Input,
                "in" => PadDirection::Output,
                other => {
                    return Err(PlaceError::InvalidInput(format!(
                        "unknown port '{other}' for io block {} on net {id}",
                        pin.block
                    )))
                }
            };
            directions.insert(pin.block, direction);
        }
    }
    for block in io_blocks {
        if !directions.contains_key(block) {
            return Err(PlaceError::InvalidInput(format!(
                "io block {block} appears on no net"
            )));
        }
    }
    Ok(directions)
}

/// Seeds every I/O block in `io_blocks` onto a perimeter cell, extending
/// `placed` in place.
///
/// Fails with [`PlaceError::DeviceCapacity`] when a direction runs out of
/// cells, and with [`PlaceError::InvalidInput`] for unknown I/O ports or
/// netless I/O blocks.
pub fn seed_io_blocks(
    netlist: &Netlist,
    io_blocks: &BTreeSet<BlockId>,
    device: &Device,
    placed: &mut Placement,
) -> Result<(), PlaceError> {
    if io_blocks.is_empty() {
        return Ok(());
    }
    let directions = io_directions(netlist, io_blocks)?;

    let mut io_cells: Vec<Position> = device.io_cells();
    io_cells.sort_by_key(|pos| (pos.x + pos.y, pos.x, pos.y));
    let split = io_cells.len() / 2;
    let mut inputs: Vec<Position> = io_cells[..split].to_vec();
    let mut outputs: Vec<Position> = io_cells[split..].to_vec();
    inputs.sort_by_key(|pos| (pos.x, pos.y));
    outputs.sort_by_key(|pos| (pos.y, pos.x));
    let mut inputs: VecDeque<Position> = inputs.into();
    let mut outputs: VecDeque<Position> = outputs.into();

    let taken: BTreeSet<Position> = placed.values().copied().collect();
    inputs.retain(|pos| !taken.contains(pos));
    outputs.retain(|pos| !taken.contains(pos));

    let mut blocks: Vec<BlockId> = io_blocks.iter().copied().collect();
    blocks.sort_by_key(|b| (b.index, b.kind));

    for block in blocks {
        let queue = match directions[&block] {
            PadDirection::Input => &mut inputs,
            PadDirection::Output => &mut outputs,
        };
        let pos = queue.pop_front().ok_or_else(|| {
            PlaceError::DeviceCapacity(format!("no free io cell left for block {block}"))
        })?;
        placed.insert(block, pos);
    }
    log::debug!("seeded {} io blocks", io_blocks.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Net, Pin};
    use tessera_arch::mock_cgra;
    use tessera_common::NetId;

    fn blk(s: &str) -> BlockId {
        s.parse().unwrap()
    }

    fn io_netlist(specs: &[(&str, &str)]) -> (Netlist, BTreeSet<BlockId>) {
        let mut nl = Netlist::new();
        let mut ios = BTreeSet::new();
        for (i, (io, port)) in specs.iter().enumerate() {
            nl.insert(
                NetId(i as u32),
                Net::new(vec![
                    Pin::new(blk(io), *port),
                    Pin::new(blk(&format!("p{i}")), "data0"),
                ]),
            );
            ios.insert(blk(io));
        }
        (nl, ios)
    }

    #[test]
    fn inputs_and_outputs_use_disjoint_halves() {
        let device = mock_cgra(8);
        let (nl, ios) = io_netlist(&[("i0", "out"), ("i1", "in"), ("i2", "out")]);
        let mut placed = Placement::new();
        seed_io_blocks(&nl, &ios, &device, &mut placed).unwrap();
        assert_eq!(placed.len(), 3);
        let positions: BTreeSet<Position> = placed.values().copied().collect();
        assert_eq!(positions.len(), 3, "io cells must be distinct");
        for pos in placed.values() {
            assert!(device.io_cells().contains(pos));
        }
    }

    #[test]
    fn assignment_is_deterministic_and_ordered() {
        let device = mock_cgra(8);
        let (nl, ios) = io_netlist(&[("i1", "out"), ("i0", "out")]);
        let mut a = Placement::new();
        seed_io_blocks(&nl, &ios, &device, &mut a).unwrap();
        let mut b = Placement::new();
        seed_io_blocks(&nl, &ios, &device, &mut b).unwrap();
        assert_eq!(a, b);
        // i0 is assigned before i1 and receives the earlier cell
        let cell0 = a[&blk("i0")];
        let cell1 = a[&blk("i1")];
        assert!((cell0.x, cell0.y) < (cell1.x, cell1.y));
    }

    #[test]
    fn unknown_io_port_rejected() {
        let device = mock_cgra(8);
        let (nl, ios) = io_netlist(&[("i0", "data0")]);
        let err = seed_io_blocks(&nl, &ios, &device, &mut Placement::new()).unwrap_err();
        assert!(matches!(err, PlaceError::InvalidInput(_)));
    }

    #[test]
    fn netless_io_rejected() {
        let device = mock_cgra(8);
        let (nl, _) = io_netlist(&[("i0", "out")]);
        let ios = [blk("i9")].into_iter().collect();
        let err = seed_io_blocks(&nl, &ios, &device, &mut Placement::new()).unwrap_err();
        assert!(matches!(err, PlaceError::InvalidInput(_)));
    }

    #[test]
    fn capacity_exhaustion() {
        let device = mock_cgra(4);
        // a 4x4 ring has 8 io cells: 4 input slots
        let specs: Vec<(String, &str)> = (0..5).map(|i| (format!("i{i}"), "out")).collect();
        let spec_refs: Vec<(&str, &str)> =
            specs.iter().map(|(s, p)| (s.as_str(), *p)).collect();
        let (nl, ios) = io_netlist(&spec_refs);
        let err = seed_io_blocks(&nl, &ios, &device, &mut Placement::new()).unwrap_err();
        assert!(matches!(err, PlaceError::DeviceCapacity(_)));
    }

    #[test]
    fn already_occupied_cells_are_skipped() {
        let device = mock_cgra(8);
        let (nl, ios) = io_netlist(&[("i0", "out")]);
        let mut placed = Placement::new();
        // pre-occupy the cell i0 would otherwise take
        let mut probe = Placement::new();
        seed_io_blocks(&nl, &ios, &device, &mut probe).unwrap();
        let first_choice = probe[&blk("i0")];
        placed.insert(blk("i9"), first_choice);
        seed_io_blocks(&nl, &ios, &device, &mut placed).unwrap();
        assert_ne!(placed[&blk("i0")], first_choice);
    }
}
