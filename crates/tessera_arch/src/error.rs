//! Error types for device construction and validation.

/// Errors that can occur when building or validating a [`Device`](crate::Device).
#[derive(Debug, thiserror::Error)]
pub enum ArchError {
    /// The layout has no rows or no columns.
    #[error("device layout is empty")]
    EmptyLayout,

    /// A layout row has a different width than the first row.
    #[error("device layout row {row} has width {found}, expected {expected}")]
    RaggedLayout {
        /// Index of the offending row.
        row: usize,
        /// Width found in that row.
        found: usize,
        /// Width of the first row.
        expected: usize,
    },

    /// The margin leaves no core cells inside the board.
    #[error("margin {margin} leaves no core area on a {width}x{height} board")]
    MarginTooLarge {
        /// The requested margin.
        margin: u32,
        /// Board width.
        width: u32,
        /// Board height.
        height: u32,
    },

    /// A layout character does not name a known cell kind.
    #[error("unknown cell tag '{tag}' at ({x}, {y})")]
    UnknownCellTag {
        /// The offending character.
        tag: char,
        /// Column of the offending cell.
        x: u32,
        /// Row of the offending cell.
        y: u32,
    },
}
