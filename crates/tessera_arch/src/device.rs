//! The device grid and its legality predicate.
//!
//! A [`Device`] is a rectangular grid of optionally-typed cells plus the
//! board metadata the placer needs: the CLB cell type, the margin reserved
//! for the I/O ring, and the register-fold port names. All placement phases
//! go through [`Device::is_cell_legal`]; no phase hard-codes board geometry.

use crate::error::ArchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tessera_common::{BlockKind, Position};

/// A target device: a 2D grid of typed cells with placement metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// `layout[y][x]` is the cell type at that position, or `None` for a gap.
    layout: Vec<Vec<Option<BlockKind>>>,
    /// The cell type that hosts CLB-kind blocks (PEs, registers, generics).
    clb_type: BlockKind,
    /// Ring width reserved at the board edge; cluster boxes stay inside it.
    margin: u32,
    /// Source port name whose driver allows a register to fold onto it.
    fold_source_port: String,
    /// Sink port names that mark a register pin as foldable.
    fold_sink_ports: BTreeSet<String>,
}

impl Device {
    /// Builds a device from an explicit layout grid.
    ///
    /// The layout must be rectangular and non-empty, and the margin must
    /// leave a non-empty core area. Fold ports default to `out` / `{in, reg}`
    /// and can be overridden with [`with_fold_ports`](Self::with_fold_ports).
    pub fn new(
        layout: Vec<Vec<Option<BlockKind>>>,
        clb_type: BlockKind,
        margin: u32,
    ) -> Result<Self, ArchError> {
        if layout.is_empty() || layout[0].is_empty() {
            return Err(ArchError::EmptyLayout);
        }
        let expected = layout[0].len();
        for (row, cells) in layout.iter().enumerate() {
            if cells.len() != expected {
                return Err(ArchError::RaggedLayout {
                    row,
                    found: cells.len(),
                    expected,
                });
            }
        }
        let width = expected as u32;
        let height = layout.len() as u32;
        if 2 * margin >= width || 2 * margin >= height {
            return Err(ArchError::MarginTooLarge {
                margin,
                width,
                height,
            });
        }
        Ok(Self {
            layout,
            clb_type,
            margin,
            fold_source_port: "out".to_string(),
            fold_sink_ports: ["in", "reg"].iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Builds a device from rows of cell tags.
    ///
    /// Recognized tags are the block-kind prefixes (`i`, `m`, `p`, `r`, `u`);
    /// space and `.` denote an empty cell.
    pub fn from_rows(rows: &[&str], clb_type: BlockKind, margin: u32) -> Result<Self, ArchError> {
        let mut layout = Vec::with_capacity(rows.len());
        for (y, row) in rows.iter().enumerate() {
            let mut cells = Vec::with_capacity(row.len());
            for (x, tag) in row.chars().enumerate() {
                let cell = match tag {
                    ' ' | '.' => None,
                    _ => Some(BlockKind::from_tag(tag).ok_or(ArchError::UnknownCellTag {
                        tag,
                        x: x as u32,
                        y: y as u32,
                    })?),
                };
                cells.push(cell);
            }
            layout.push(cells);
        }
        Self::new(layout, clb_type, margin)
    }

    /// Replaces the register-fold port metadata.
    pub fn with_fold_ports(
        mut self,
        source_port: impl Into<String>,
        sink_ports: impl IntoIterator<Item = String>,
    ) -> Self {
        self.fold_source_port = source_port.into();
        self.fold_sink_ports = sink_ports.into_iter().collect();
        self
    }

    /// Board width in cells.
    pub fn width(&self) -> u32 {
        self.layout[0].len() as u32
    }

    /// Board height in cells.
    pub fn height(&self) -> u32 {
        self.layout.len() as u32
    }

    /// The margin reserved at the board edge.
    pub fn margin(&self) -> u32 {
        self.margin
    }

    /// The cell type that hosts CLB-kind blocks.
    pub fn clb_type(&self) -> BlockKind {
        self.clb_type
    }

    /// The center of the board, used as the squeeze attractor.
    pub fn center(&self) -> Position {
        Position::new(self.width() / 2, self.height() / 2)
    }

    /// The cell type at `pos`, or `None` when out of bounds or a gap.
    pub fn cell(&self, pos: Position) -> Option<BlockKind> {
        self.layout
            .get(pos.y as usize)
            .and_then(|row| row.get(pos.x as usize))
            .copied()
            .flatten()
    }

    /// The cell type a block of `kind` must occupy.
    ///
    /// CLB-kind blocks (PEs, registers, generics) all map to the CLB type;
    /// other kinds require a cell of their own type. Pseudo-blocks occupy no
    /// cell.
    pub fn required_cell(&self, kind: BlockKind) -> Option<BlockKind> {
        match kind {
            BlockKind::Cluster => None,
            k if k.is_clb() => Some(self.clb_type),
            k => Some(k),
        }
    }

    /// The single legality predicate: may a block of `kind` sit at `pos`?
    pub fn is_cell_legal(&self, pos: Position, kind: BlockKind) -> bool {
        match (self.cell(pos), self.required_cell(kind)) {
            (Some(cell), Some(required)) => cell == required,
            _ => false,
        }
    }

    /// Returns whether `pos` lies inside the core area `[margin, dim - margin)`.
    pub fn in_core(&self, pos: Position) -> bool {
        pos.x >= self.margin
            && pos.y >= self.margin
            && pos.x < self.width() - self.margin
            && pos.y < self.height() - self.margin
    }

    /// All positions legal for a block of `kind`, in row-major order.
    pub fn legal_cells(&self, kind: BlockKind) -> Vec<Position> {
        let mut cells = Vec::new();
        for y in 0..self.height() {
            for x in 0..self.width() {
                let pos = Position::new(x, y);
                if self.is_cell_legal(pos, kind) {
                    cells.push(pos);
                }
            }
        }
        cells
    }

    /// All I/O pad cells, in row-major order.
    pub fn io_cells(&self) -> Vec<Position> {
        let mut cells = Vec::new();
        for y in 0..self.height() {
            for x in 0..self.width() {
                let pos = Position::new(x, y);
                if self.cell(pos) == Some(BlockKind::Io) {
                    cells.push(pos);
                }
            }
        }
        cells
    }

    /// The source port name that makes a downstream register foldable.
    pub fn fold_source_port(&self) -> &str {
        &self.fold_source_port
    }

    /// Returns whether a register sink pin on `port` is foldable.
    pub fn is_fold_sink_port(&self, port: &str) -> bool {
        self.fold_sink_ports.contains(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Device {
        Device::from_rows(
            &[
                ".ii.", //
                "ippi", //
                "ipmi", //
                ".ii.",
            ],
            BlockKind::Pe,
            1,
        )
        .unwrap()
    }

    #[test]
    fn dimensions_and_margin() {
        let d = tiny();
        assert_eq!(d.width(), 4);
        assert_eq!(d.height(), 4);
        assert_eq!(d.margin(), 1);
        assert_eq!(d.center(), Position::new(2, 2));
    }

    #[test]
    fn rejects_ragged_layout() {
        let err = Device::from_rows(&["pp", "p"], BlockKind::Pe, 0).unwrap_err();
        assert!(matches!(err, ArchError::RaggedLayout { row: 1, .. }));
    }

    #[test]
    fn rejects_empty_layout() {
        assert!(matches!(
            Device::new(vec![], BlockKind::Pe, 0),
            Err(ArchError::EmptyLayout)
        ));
    }

    #[test]
    fn rejects_oversized_margin() {
        let err = Device::from_rows(&["pp", "pp"], BlockKind::Pe, 1).unwrap_err();
        assert!(matches!(err, ArchError::MarginTooLarge { .. }));
    }

    #[test]
    fn rejects_unknown_tag() {
        let err = Device::from_rows(&["pz"], BlockKind::Pe, 0).unwrap_err();
        assert!(matches!(err, ArchError::UnknownCellTag { tag: 'z', .. }));
    }

    #[test]
    fn legality_by_kind() {
        let d = tiny();
        let pe_cell = Position::new(1, 1);
        let mem_cell = Position::new(2, 2);
        let io_cell = Position::new(1, 0);
        assert!(d.is_cell_legal(pe_cell, BlockKind::Pe));
        assert!(d.is_cell_legal(pe_cell, BlockKind::Reg));
        assert!(d.is_cell_legal(pe_cell, BlockKind::Gen));
        assert!(!d.is_cell_legal(pe_cell, BlockKind::Mem));
        assert!(d.is_cell_legal(mem_cell, BlockKind::Mem));
        assert!(!d.is_cell_legal(mem_cell, BlockKind::Pe));
        assert!(d.is_cell_legal(io_cell, BlockKind::Io));
        assert!(!d.is_cell_legal(Position::new(0, 0), BlockKind::Io));
        assert!(!d.is_cell_legal(Position::new(9, 9), BlockKind::Pe));
    }

    #[test]
    fn pseudo_blocks_are_never_legal() {
        let d = tiny();
        assert!(!d.is_cell_legal(Position::new(1, 1), BlockKind::Cluster));
    }

    #[test]
    fn core_bounds() {
        let d = tiny();
        assert!(d.in_core(Position::new(1, 1)));
        assert!(d.in_core(Position::new(2, 2)));
        assert!(!d.in_core(Position::new(0, 1)));
        assert!(!d.in_core(Position::new(3, 2)));
    }

    #[test]
    fn cell_enumeration() {
        let d = tiny();
        assert_eq!(d.legal_cells(BlockKind::Pe).len(), 3);
        assert_eq!(d.legal_cells(BlockKind::Mem).len(), 1);
        assert_eq!(d.io_cells().len(), 8);
    }

    #[test]
    fn fold_port_metadata() {
        let d = tiny();
        assert_eq!(d.fold_source_port(), "out");
        assert!(d.is_fold_sink_port("in"));
        assert!(d.is_fold_sink_port("reg"));
        assert!(!d.is_fold_sink_port("data0"));

        let d = d.with_fold_ports("res", vec!["d".to_string()]);
        assert_eq!(d.fold_source_port(), "res");
        assert!(d.is_fold_sink_port("d"));
        assert!(!d.is_fold_sink_port("in"));
    }

    #[test]
    fn serde_roundtrip() {
        let d = tiny();
        let json = serde_json::to_string(&d).unwrap();
        let restored: Device = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.width(), d.width());
        assert_eq!(restored.legal_cells(BlockKind::Pe), d.legal_cells(BlockKind::Pe));
    }
}
