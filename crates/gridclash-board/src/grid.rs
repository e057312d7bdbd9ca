//! The session's grid: a square tile matrix and a parallel item matrix.

use gridclash_protocol::{GridCodes, Position};
use serde::{Deserialize, Serialize};

use crate::{BoardError, ItemType, TileType};

/// Two parallel square matrices of the same fixed dimension:
/// `tiles[row][col]` and `items[row][col]`.
///
/// Stored flat in row-major order. Player presence is *not* recorded here;
/// the session tracks positions separately, so whatever lies under a player
/// stays on the grid until it is explicitly taken.
///
/// On the wire a grid is its [`GridCodes`] form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridCodes", into = "GridCodes")]
pub struct Grid {
    size: usize,
    tiles: Vec<TileType>,
    items: Vec<Option<ItemType>>,
}

impl Grid {
    /// A `size × size` grid of one tile type with no items.
    pub fn filled(size: usize, tile: TileType) -> Self {
        Self {
            size,
            tiles: vec![tile; size * size],
            items: vec![None; size * size],
        }
    }

    /// Decodes and validates the wire form.
    pub fn from_codes(codes: &GridCodes) -> Result<Self, BoardError> {
        let size = codes.size;
        if size == 0 {
            return Err(BoardError::Empty);
        }
        check_square(&codes.tiles, size)?;
        check_square(&codes.items, size)?;

        let tiles = codes
            .tiles
            .iter()
            .flatten()
            .map(|&code| TileType::try_from(code))
            .collect::<Result<Vec<_>, _>>()?;
        let items = codes
            .items
            .iter()
            .flatten()
            .map(|&code| ItemType::from_code(code))
            .collect::<Result<Vec<_>, _>>()?;

        let grid = Self { size, tiles, items };
        // Items on walls or doors would be unreachable forever.
        for pos in grid.positions() {
            if grid.item(pos).is_some() && !grid.can_hold_item(pos) {
                return Err(BoardError::TileOccupied(pos));
            }
        }
        Ok(grid)
    }

    /// Encodes the grid into its wire form.
    pub fn to_codes(&self) -> GridCodes {
        let rows = |cells: Vec<u8>| -> Vec<Vec<u8>> {
            cells.chunks(self.size).map(<[u8]>::to_vec).collect()
        };
        GridCodes {
            size: self.size,
            tiles: rows(self.tiles.iter().map(|t| t.code()).collect()),
            items: rows(
                self.items
                    .iter()
                    .map(|i| i.map_or(0, ItemType::code))
                    .collect(),
            ),
        }
    }

    /// Parses a compact text map, one string per row.
    ///
    /// Tiles: `.` ground, `~` water, `*` ice, `#` wall, `D` closed door,
    /// `d` open door. Items (on ground): `S` spawn, `F` flag, `?` random
    /// item, `1`–`4` equipment by code.
    pub fn from_ascii(rows: &[&str]) -> Result<Self, BoardError> {
        let size = rows.len();
        if size == 0 {
            return Err(BoardError::Empty);
        }
        let mut grid = Self::filled(size, TileType::Ground);
        for (r, line) in rows.iter().enumerate() {
            let glyphs: Vec<char> = line.chars().collect();
            if glyphs.len() != size {
                return Err(BoardError::DimensionMismatch {
                    expected: size,
                    found: glyphs.len(),
                });
            }
            for (c, glyph) in glyphs.into_iter().enumerate() {
                let idx = r * size + c;
                let (tile, item) = match glyph {
                    '.' => (TileType::Ground, None),
                    '~' => (TileType::Water, None),
                    '*' => (TileType::Ice, None),
                    '#' => (TileType::Wall, None),
                    'D' => (TileType::ClosedDoor, None),
                    'd' => (TileType::OpenDoor, None),
                    'S' => (TileType::Ground, Some(ItemType::Spawn)),
                    'F' => (TileType::Ground, Some(ItemType::Flag)),
                    '?' => (TileType::Ground, Some(ItemType::RandomItem)),
                    '1'..='4' => {
                        let code = glyph as u8 - b'0';
                        (TileType::Ground, Some(ItemType::try_from(code)?))
                    }
                    other => return Err(BoardError::UnknownGlyph(other)),
                };
                grid.tiles[idx] = tile;
                grid.items[idx] = item;
            }
        }
        Ok(grid)
    }

    /// Cells per side.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.in_bounds(self.size)
    }

    fn index(&self, pos: Position) -> Option<usize> {
        self.contains(pos)
            .then(|| pos.row as usize * self.size + pos.col as usize)
    }

    fn index_or_err(&self, pos: Position) -> Result<usize, BoardError> {
        self.index(pos).ok_or(BoardError::OutOfBounds(pos))
    }

    /// The tile at `pos`, or `None` outside the grid.
    pub fn tile(&self, pos: Position) -> Option<TileType> {
        self.index(pos).map(|i| self.tiles[i])
    }

    /// The item at `pos`, if any.
    pub fn item(&self, pos: Position) -> Option<ItemType> {
        self.index(pos).and_then(|i| self.items[i])
    }

    /// Movement cost of entering `pos`; `None` if impassable or off-grid.
    pub fn cost(&self, pos: Position) -> Option<u32> {
        self.tile(pos).and_then(TileType::cost)
    }

    pub fn set_tile(&mut self, pos: Position, tile: TileType) -> Result<(), BoardError> {
        let idx = self.index_or_err(pos)?;
        self.tiles[idx] = tile;
        Ok(())
    }

    /// Opens a closed door or closes an open one. Returns the new tile.
    pub fn toggle_door(&mut self, pos: Position) -> Result<TileType, BoardError> {
        let idx = self.index_or_err(pos)?;
        let next = match self.tiles[idx] {
            TileType::ClosedDoor => TileType::OpenDoor,
            TileType::OpenDoor => TileType::ClosedDoor,
            _ => return Err(BoardError::NotADoor(pos)),
        };
        self.tiles[idx] = next;
        Ok(next)
    }

    /// Removes and returns the item at `pos`.
    pub fn take_item(&mut self, pos: Position) -> Option<ItemType> {
        let idx = self.index(pos)?;
        self.items[idx].take()
    }

    /// Whether an item could be dropped on `pos` right now: in bounds,
    /// empty, and a plain walkable tile (not a door).
    pub fn can_hold_item(&self, pos: Position) -> bool {
        matches!(
            self.tile(pos),
            Some(TileType::Ground | TileType::Water | TileType::Ice)
        )
    }

    /// Puts `item` on an empty, item-capable tile.
    pub fn place_item(&mut self, pos: Position, item: ItemType) -> Result<(), BoardError> {
        let idx = self.index_or_err(pos)?;
        if self.items[idx].is_some() || !self.can_hold_item(pos) {
            return Err(BoardError::TileOccupied(pos));
        }
        self.items[idx] = Some(item);
        Ok(())
    }

    /// Replaces whatever item lies on `pos` (used to swap during an
    /// inventory exchange, where the cell is known to hold the incoming
    /// item). Returns the previous content.
    pub fn replace_item(
        &mut self,
        pos: Position,
        item: Option<ItemType>,
    ) -> Result<Option<ItemType>, BoardError> {
        let idx = self.index_or_err(pos)?;
        Ok(std::mem::replace(&mut self.items[idx], item))
    }

    /// Every position, row-major.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        let size = self.size as i32;
        (0..size).flat_map(move |row| (0..size).map(move |col| Position::new(row, col)))
    }

    /// Positions holding `item`, row-major.
    pub fn find_items(&self, item: ItemType) -> Vec<Position> {
        self.positions()
            .filter(|&pos| self.item(pos) == Some(item))
            .collect()
    }

    /// Spawn markers, row-major. Join order maps onto this order.
    pub fn spawn_points(&self) -> Vec<Position> {
        self.find_items(ItemType::Spawn)
    }

    /// Number of door tiles (open or closed).
    pub fn door_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_door()).count()
    }

    /// Number of tiles a player could ever stand on (doors included).
    pub fn walkable_count(&self) -> usize {
        self.tiles
            .iter()
            .filter(|t| t.is_passable() || t.is_door())
            .count()
    }
}

fn check_square(rows: &[Vec<u8>], size: usize) -> Result<(), BoardError> {
    if rows.len() != size {
        return Err(BoardError::DimensionMismatch {
            expected: size,
            found: rows.len(),
        });
    }
    match rows.iter().find(|row| row.len() != size) {
        Some(row) => Err(BoardError::DimensionMismatch {
            expected: size,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

impl TryFrom<GridCodes> for Grid {
    type Error = BoardError;

    fn try_from(codes: GridCodes) -> Result<Self, Self::Error> {
        Self::from_codes(&codes)
    }
}

impl From<Grid> for GridCodes {
    fn from(grid: Grid) -> GridCodes {
        grid.to_codes()
    }
}
