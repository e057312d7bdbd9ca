//! The game board: tile grid, tile cost model, and navigation.
//!
//! Everything in this crate is synchronous and side-effect free except the
//! explicit mutators on [`Grid`] (door toggles, item pickup/drop), which the
//! room layer calls from its single worker task.
//!
//! # Key types
//!
//! - [`TileType`] / [`ItemType`]: what a cell is made of and what lies on it
//! - [`Grid`]: the two parallel matrices, owned by one game session
//! - [`nav`]: reachable sets and cheapest paths under the tile cost model

mod error;
mod grid;
pub mod nav;
mod tile;

pub use error::BoardError;
pub use grid::Grid;
pub use tile::{ItemType, TileType};

pub use gridclash_protocol::Position;
