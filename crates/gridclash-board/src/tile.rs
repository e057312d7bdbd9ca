//! Tile and item kinds, their wire codes, and the tile cost model.

use serde::{Deserialize, Serialize};

use crate::BoardError;

// ---------------------------------------------------------------------------
// TileType
// ---------------------------------------------------------------------------

/// What a grid cell is made of.
///
/// Serialized as its integer code so the grid travels as a plain matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TileType {
    Ground,
    Water,
    Ice,
    Wall,
    ClosedDoor,
    OpenDoor,
}

impl TileType {
    /// Movement points needed to *enter* this tile, or `None` when the
    /// tile cannot be entered at all.
    ///
    /// Ice is free, water costs double. Walls and closed doors block until
    /// something changes them (only doors can change).
    pub const fn cost(self) -> Option<u32> {
        match self {
            Self::Ground | Self::OpenDoor => Some(1),
            Self::Water => Some(2),
            Self::Ice => Some(0),
            Self::Wall | Self::ClosedDoor => None,
        }
    }

    pub const fn is_passable(self) -> bool {
        self.cost().is_some()
    }

    pub const fn is_door(self) -> bool {
        matches!(self, Self::ClosedDoor | Self::OpenDoor)
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::Ground => 0,
            Self::Water => 1,
            Self::Ice => 2,
            Self::Wall => 3,
            Self::ClosedDoor => 4,
            Self::OpenDoor => 5,
        }
    }
}

impl TryFrom<u8> for TileType {
    type Error = BoardError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Ground,
            1 => Self::Water,
            2 => Self::Ice,
            3 => Self::Wall,
            4 => Self::ClosedDoor,
            5 => Self::OpenDoor,
            other => return Err(BoardError::UnknownTileCode(other)),
        })
    }
}

impl From<TileType> for u8 {
    fn from(tile: TileType) -> u8 {
        tile.code()
    }
}

// ---------------------------------------------------------------------------
// ItemType
// ---------------------------------------------------------------------------

/// Something lying on a cell. Code `0` on the wire means "nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ItemType {
    /// +2 attack, −1 defense.
    Greatsword,
    /// +2 defense, −1 attack.
    Bulwark,
    /// +1 speed.
    SwiftBoots,
    /// Two extra faces on the attack die.
    LuckyCharm,
    /// Placeholder replaced by a concrete equipment item at game start.
    RandomItem,
    /// A starting position. Never collected.
    Spawn,
    /// Capture-the-flag objective.
    Flag,
}

impl ItemType {
    /// Equipment a random item can turn into, in draw order.
    pub const EQUIPMENT: [ItemType; 4] = [
        Self::Greatsword,
        Self::Bulwark,
        Self::SwiftBoots,
        Self::LuckyCharm,
    ];

    /// Whether stepping on this item puts it in the inventory.
    pub const fn is_collectable(self) -> bool {
        !matches!(self, Self::Spawn | Self::RandomItem)
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::Greatsword => 1,
            Self::Bulwark => 2,
            Self::SwiftBoots => 3,
            Self::LuckyCharm => 4,
            Self::RandomItem => 5,
            Self::Spawn => 6,
            Self::Flag => 7,
        }
    }

    /// Decodes an item matrix cell; `0` is an empty cell.
    pub fn from_code(code: u8) -> Result<Option<Self>, BoardError> {
        if code == 0 {
            Ok(None)
        } else {
            Self::try_from(code).map(Some)
        }
    }
}

impl TryFrom<u8> for ItemType {
    type Error = BoardError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::Greatsword,
            2 => Self::Bulwark,
            3 => Self::SwiftBoots,
            4 => Self::LuckyCharm,
            5 => Self::RandomItem,
            6 => Self::Spawn,
            7 => Self::Flag,
            other => return Err(BoardError::UnknownItemCode(other)),
        })
    }
}

impl From<ItemType> for u8 {
    fn from(item: ItemType) -> u8 {
        item.code()
    }
}
