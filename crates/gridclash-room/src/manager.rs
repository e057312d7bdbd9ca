//! Room manager: creates, tracks, and routes players to rooms.
//!
//! The manager is plain data behind the server's mutex. It never touches a
//! session directly; every room operation is forwarded to that room's
//! actor through its [`RoomHandle`] and awaited there. Its own job is the
//! bookkeeping the actors cannot do: room ids, the player-to-room index,
//! and forgetting rooms whose actor has stopped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use gridclash_board::Grid;
use gridclash_protocol::{GameMode, GridCodes, PlayerId, PlayerProfile, RoomId};

use crate::room::spawn_room;
use crate::{ClientAction, LeaveOutcome, PlayerSender, RoomConfig, RoomError, RoomHandle, RoomInfo};

/// Counter for generating unique room IDs.
static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

/// Tracks every open room and which player sits in which.
///
/// A player is in at most one room at a time.
pub struct RoomManager {
    rooms: HashMap<RoomId, RoomHandle>,
    player_rooms: HashMap<PlayerId, RoomId>,
    /// Settings every new room starts from. Seats and mode are set per
    /// room.
    base: RoomConfig,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::with_config(RoomConfig::default())
    }

    pub fn with_config(base: RoomConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            base,
        }
    }

    /// Opens a lobby on `map` with `admin` as its first player.
    pub fn create_room(
        &mut self,
        admin: PlayerId,
        map: &GridCodes,
        mode: GameMode,
        profile: PlayerProfile,
        sender: PlayerSender,
    ) -> Result<RoomId, RoomError> {
        self.ensure_free(admin)?;
        let grid = Grid::from_codes(map)?;
        let config = self
            .base
            .clone()
            .sized_for(grid.size())
            .with_mode(mode);

        let room_id = RoomId(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed));
        let handle = spawn_room(room_id, grid, config, admin, profile, sender)?;
        self.rooms.insert(room_id, handle);
        self.player_rooms.insert(admin, room_id);
        tracing::info!(%room_id, %admin, ?mode, "room created");
        Ok(room_id)
    }

    pub async fn join_room(
        &mut self,
        player_id: PlayerId,
        room_id: RoomId,
        profile: PlayerProfile,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.ensure_free(player_id)?;
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        handle.join(player_id, profile, sender).await?;
        self.player_rooms.insert(player_id, room_id);
        Ok(())
    }

    /// Removes a player from their current room. When that closes the
    /// room, the room and everyone still indexed in it are dropped.
    pub async fn leave_room(&mut self, player_id: PlayerId) -> Result<LeaveOutcome, RoomError> {
        let room_id = self.current_room(player_id)?;

        let outcome = match self.rooms.get(&room_id) {
            Some(handle) => match handle.leave(player_id).await {
                Ok(outcome) => outcome,
                Err(RoomError::Unavailable(_)) => LeaveOutcome::RoomClosed,
                Err(err) => return Err(err),
            },
            None => LeaveOutcome::Left,
        };

        self.player_rooms.remove(&player_id);
        if outcome == LeaveOutcome::RoomClosed {
            self.forget_room(room_id);
        }
        Ok(outcome)
    }

    /// The room admin removes `target` from the lobby.
    pub async fn kick_player(&mut self, admin: PlayerId, target: PlayerId) -> Result<(), RoomError> {
        let room_id = self.current_room(admin)?;
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        handle.kick(admin, target).await?;
        self.player_rooms.remove(&target);
        Ok(())
    }

    /// Routes a game action from a player to their current room.
    pub async fn route_action(
        &self,
        player_id: PlayerId,
        action: ClientAction,
    ) -> Result<(), RoomError> {
        let room_id = self.current_room(player_id)?;
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        handle.send_action(player_id, action).await
    }

    pub async fn get_room_info(&self, room_id: RoomId) -> Result<RoomInfo, RoomError> {
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        handle.get_info().await
    }

    /// Lists the rooms still gathering players, dropping rooms whose actor
    /// has stopped.
    pub async fn list_rooms(&mut self) -> Vec<RoomInfo> {
        let stopped: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, handle)| handle.is_closed())
            .map(|(id, _)| *id)
            .collect();
        for room_id in stopped {
            self.forget_room(room_id);
        }

        let mut infos = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(info) = handle.get_info().await {
                if info.status.is_joinable() {
                    infos.push(info);
                }
            }
        }
        infos.sort_by_key(|info| info.room_id.0);
        infos
    }

    /// Shuts down a room and removes all its players from the index.
    pub async fn destroy_room(&mut self, room_id: RoomId) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        let _ = handle.shutdown().await;
        self.forget_room(room_id);
        Ok(())
    }

    pub fn room_handle(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.rooms.get(&room_id).cloned()
    }

    pub fn player_room(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.player_rooms.get(player_id).copied()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// A seat in a room whose actor has stopped does not count.
    fn ensure_free(&mut self, player_id: PlayerId) -> Result<(), RoomError> {
        let Some(&current) = self.player_rooms.get(&player_id) else {
            return Ok(());
        };
        if self.rooms.get(&current).is_some_and(|handle| !handle.is_closed()) {
            return Err(RoomError::AlreadyInRoom(player_id, current));
        }
        self.forget_room(current);
        Ok(())
    }

    fn current_room(&self, player_id: PlayerId) -> Result<RoomId, RoomError> {
        self.player_rooms
            .get(&player_id)
            .copied()
            .ok_or_else(|| RoomError::InvalidState(format!("player {player_id} is not in any room")))
    }

    fn forget_room(&mut self, room_id: RoomId) {
        self.rooms.remove(&room_id);
        self.player_rooms.retain(|_, rid| *rid != room_id);
        tracing::info!(%room_id, "room removed");
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
