//! Mock boards for tests and benchmarks.
//!
//! These reproduce the shapes the placer is exercised against: a CGRA with a
//! one-cell I/O ring (optionally with memory columns) and a plain FPGA-style
//! CLB grid. Corner cells are left empty, matching real I/O rings.

use crate::device::Device;
use tessera_common::BlockKind;

fn ring_layout(size: u32, interior: impl Fn(u32, u32) -> Option<BlockKind>) -> Device {
    assert!(size >= 4, "mock boards need at least a 4x4 grid");
    let mut layout = Vec::with_capacity(size as usize);
    for y in 0..size {
        let mut row = Vec::with_capacity(size as usize);
        for x in 0..size {
            let on_edge_x = x == 0 || x == size - 1;
            let on_edge_y = y == 0 || y == size - 1;
            let cell = if on_edge_x && on_edge_y {
                None
            } else if on_edge_x || on_edge_y {
                Some(BlockKind::Io)
            } else {
                interior(x, y)
            };
            row.push(cell);
        }
        layout.push(row);
    }
    Device::new(layout, BlockKind::Pe, 1).expect("mock layout is rectangular")
}

/// A `size` x `size` CGRA: I/O ring, PE interior, margin 1.
pub fn mock_cgra(size: u32) -> Device {
    ring_layout(size, |_, _| Some(BlockKind::Pe))
}

/// A mock CGRA with memory columns every fourth interior column.
pub fn mock_cgra_with_mem(size: u32) -> Device {
    ring_layout(size, |x, _| {
        if (x - 1) % 4 == 2 {
            Some(BlockKind::Mem)
        } else {
            Some(BlockKind::Pe)
        }
    })
}

/// A mock FPGA-style board: I/O ring, uniform CLB interior, margin 1.
///
/// Identical fabric to [`mock_cgra`] today; kept separate so FPGA-profile
/// tests read as such and can diverge without touching call sites.
pub fn mock_fpga(size: u32) -> Device {
    ring_layout(size, |_, _| Some(BlockKind::Pe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::Position;

    #[test]
    fn cgra_ring_shape() {
        let d = mock_cgra(6);
        assert_eq!(d.width(), 6);
        assert_eq!(d.cell(Position::new(0, 0)), None);
        assert_eq!(d.cell(Position::new(3, 0)), Some(BlockKind::Io));
        assert_eq!(d.cell(Position::new(0, 3)), Some(BlockKind::Io));
        assert_eq!(d.cell(Position::new(2, 2)), Some(BlockKind::Pe));
        // 4 edges of 4 cells each, corners empty
        assert_eq!(d.io_cells().len(), 16);
    }

    #[test]
    fn mem_columns_repeat() {
        let d = mock_cgra_with_mem(10);
        assert_eq!(d.cell(Position::new(3, 4)), Some(BlockKind::Mem));
        assert_eq!(d.cell(Position::new(7, 4)), Some(BlockKind::Mem));
        assert_eq!(d.cell(Position::new(2, 4)), Some(BlockKind::Pe));
    }

    #[test]
    fn interior_pe_count() {
        let d = mock_cgra(6);
        assert_eq!(d.legal_cells(BlockKind::Pe).len(), 16);
    }
}
