//! Rooms for gridclash: the game rules and the actors that run them.
//!
//! Each room runs as an isolated Tokio task (actor model). The task owns a
//! [`GameSession`], the synchronous rule engine, and drives its turn and
//! combat timers.
//!
//! # Key types
//!
//! - [`GameSession`]: lobby, turns, movement, items, doors, combat, bots
//! - [`RoomManager`]: creates and removes rooms, routes players
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomStatus`]: lifecycle state machine
//! - [`RoomConfig`]: seats, turn length, win threshold, combat settings

mod bot;
mod config;
mod error;
mod manager;
mod message;
mod player;
mod room;
mod session;
mod stats;

pub use config::{RoomConfig, RoomStatus};
pub use error::{ActionError, RoomError};
pub use manager::RoomManager;
pub use message::{ClientAction, PlayerView, RoomSnapshot, ServerEvent};
pub use player::{Attributes, INVENTORY_CAPACITY, PendingPickup, Player, PlayerStatus};
pub use room::{PlayerSender, RoomHandle, RoomInfo};
pub use session::{GameSession, LeaveOutcome, Outbox};
pub use stats::{GameStatistics, GlobalStats, PlayerStats, PlayerSummary};
