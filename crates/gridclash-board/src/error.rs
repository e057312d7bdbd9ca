//! Error types for the board layer.

use gridclash_protocol::Position;

/// Errors raised while building or mutating a [`Grid`](crate::Grid).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The map has no cells.
    #[error("grid must have at least one cell")]
    Empty,

    /// A matrix row or the item matrix doesn't match the declared size.
    #[error("grid dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("unknown tile code {0}")]
    UnknownTileCode(u8),

    #[error("unknown item code {0}")]
    UnknownItemCode(u8),

    #[error("unknown map glyph {0:?}")]
    UnknownGlyph(char),

    #[error("position {0} is outside the grid")]
    OutOfBounds(Position),

    #[error("tile at {0} is not a door")]
    NotADoor(Position),

    /// An item cannot be placed where one already lies, or on an
    /// impassable tile.
    #[error("tile at {0} cannot hold an item")]
    TileOccupied(Position),
}
