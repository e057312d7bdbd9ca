//! The game session: one room's state and every rule that changes it.
//!
//! A [`GameSession`] is synchronous. The room actor feeds it commands and
//! timer ticks, then drains the events it produced with
//! [`GameSession::take_events`]. Rules never block and never await; the
//! only async method is [`GameSession::next_tick`], which waits on the two
//! countdowns.
//!
//! # Rejections
//!
//! Every game action is validated completely before anything is mutated.
//! A refused action leaves the session untouched and produces a single
//! `ActionRejected` event for the sender.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use gridclash_board::nav::{fastest_path_avoiding, nearest_tile, reachable_tiles};
use gridclash_board::{Grid, ItemType, Position, TileType};
use gridclash_combat::{Combat, CombatAction, CombatEnd, CombatError, DiceRoller, Fighter, RandomDice};
use gridclash_protocol::{
    AttributeBonus, DiceBonus, GameMode, PlayerId, PlayerProfile, Recipient, RoomId,
};
use gridclash_timer::{TimerRole, TimerTick, TurnTimer};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bot;
use crate::player::{PendingPickup, Player, PlayerStatus};
use crate::stats::{GameStatistics, GlobalStats, PlayerSummary, percent};
use crate::{
    ActionError, ClientAction, PlayerView, RoomConfig, RoomError, RoomSnapshot, RoomStatus,
    ServerEvent,
};

/// Bot ids live far above anything an authenticator hands out.
static NEXT_BOT_ID: AtomicU64 = AtomicU64::new(1 << 48);

/// Upper bound on consecutive bot actions handled in one go.
const BOT_STEP_LIMIT: usize = 512;

/// Events produced by the session, with their audience.
pub type Outbox = Vec<(Recipient, ServerEvent)>;

/// What happened to a player who left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Removed from the lobby.
    Left,
    /// Marked disconnected; the game goes on without them.
    Disconnected,
    /// The room closed as a consequence.
    RoomClosed,
}

/// A combat in progress together with its decision timer.
#[derive(Debug)]
struct Engagement {
    combat: Combat,
    timer: TurnTimer,
}

/// One room's complete game state.
pub struct GameSession {
    room_id: RoomId,
    config: RoomConfig,
    grid: Grid,
    status: RoomStatus,
    locked: bool,
    admin: PlayerId,
    /// Join order. Also the turn order.
    players: Vec<Player>,
    /// Index of the player whose turn it is.
    active: usize,
    moved_this_turn: bool,
    turn_timer: TurnTimer,
    engagement: Option<Engagement>,
    dice: Box<dyn DiceRoller + Send>,
    rng: StdRng,
    stats: GlobalStats,
    started_at: Option<Instant>,
    winner: Option<PlayerId>,
    closed: bool,
    outbox: Outbox,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("room_id", &self.room_id)
            .field("status", &self.status)
            .field("players", &self.players.len())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl GameSession {
    /// Opens a lobby on `grid` with `admin` as its first player.
    pub fn new(
        room_id: RoomId,
        grid: Grid,
        config: RoomConfig,
        admin: PlayerId,
        profile: PlayerProfile,
    ) -> Result<Self, RoomError> {
        let spawns = grid.spawn_points().len();
        if spawns < config.min_players {
            return Err(RoomError::InvalidMap(format!(
                "map has {spawns} spawn points, at least {} needed",
                config.min_players
            )));
        }
        if config.mode == GameMode::CaptureTheFlag && grid.find_items(ItemType::Flag).is_empty() {
            return Err(RoomError::InvalidMap(
                "capture the flag needs a flag on the map".into(),
            ));
        }

        let (dice, rng): (Box<dyn DiceRoller + Send>, StdRng) = match config.seed {
            Some(seed) => (
                Box::new(RandomDice::seeded(seed)),
                StdRng::seed_from_u64(seed),
            ),
            None => (
                Box::new(RandomDice::new()),
                StdRng::from_rng(&mut rand::rng()),
            ),
        };

        let turn_timer = TurnTimer::new(TimerRole::Turn, config.timer.clone());
        let mut session = Self {
            room_id,
            config,
            grid,
            status: RoomStatus::Lobby,
            locked: false,
            admin,
            players: Vec::new(),
            active: 0,
            moved_this_turn: false,
            turn_timer,
            engagement: None,
            dice,
            rng,
            stats: GlobalStats::default(),
            started_at: None,
            winner: None,
            closed: false,
            outbox: Vec::new(),
        };
        session
            .players
            .push(Player::new(admin, profile, PlayerStatus::Admin));
        info!(
            room_id = %room_id,
            %admin,
            size = session.grid.size(),
            max_players = session.config.max_players,
            "lobby opened"
        );
        Ok(session)
    }

    /// Replaces the dice (tests use scripted dice).
    pub fn with_dice(mut self, dice: impl DiceRoller + Send + 'static) -> Self {
        self.dice = Box::new(dice);
        self
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn admin(&self) -> PlayerId {
        self.admin
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn max_players(&self) -> usize {
        self.config.max_players
    }

    /// Whose turn it is, once the game has started.
    pub fn active_player(&self) -> Option<PlayerId> {
        self.status
            .is_active()
            .then(|| self.players.get(self.active).map(|p| p.id))
            .flatten()
    }

    pub fn combat(&self) -> Option<&Combat> {
        self.engagement.as_ref().map(|e| &e.combat)
    }

    pub fn turn_timer(&self) -> &TurnTimer {
        &self.turn_timer
    }

    pub fn combat_timer(&self) -> Option<&TurnTimer> {
        self.engagement.as_ref().map(|e| &e.timer)
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn global_stats(&self) -> &GlobalStats {
        &self.stats
    }

    pub(crate) fn moved_this_turn(&self) -> bool {
        self.moved_this_turn
    }

    /// Players still in the game, bots included.
    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected()).count()
    }

    /// Connected players that are not bots.
    pub fn connected_humans(&self) -> usize {
        self.players.iter().filter(|p| p.is_human()).count()
    }

    /// The room has nothing left to serve and its actor should stop.
    pub fn should_close(&self) -> bool {
        self.closed || self.connected_humans() == 0
    }

    /// Positions of every connected player except `except`.
    pub fn occupied_except(&self, except: PlayerId) -> HashSet<Position> {
        self.players
            .iter()
            .filter(|p| p.id != except && p.is_connected() && self.grid.contains(p.position))
            .map(|p| p.position)
            .collect()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id,
            status: self.status,
            locked: self.locked,
            admin: self.admin,
            max_players: self.config.max_players,
            mode: self.config.mode,
            grid: self.grid.clone(),
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    id: p.id,
                    name: p.name.clone(),
                    avatar: p.avatar,
                    status: p.status,
                    position: p.position,
                    spawn_position: p.spawn_position,
                    attributes: p.attributes.clone(),
                    inventory: p.inventory.clone(),
                    wins: p.wins,
                })
                .collect(),
            active_player: self.active_player(),
        }
    }

    /// End-of-game summary (also valid mid-game).
    pub fn statistics(&self) -> GameStatistics {
        let walkable = self.grid.walkable_count();
        let players = self
            .players
            .iter()
            .map(|p| PlayerSummary {
                player_id: p.id,
                name: p.name.clone(),
                combats: p.stats.combats,
                wins: p.stats.wins,
                losses: p.stats.losses,
                evasions: p.stats.evasions,
                hp_lost: p.stats.hp_lost,
                damage_dealt: p.stats.damage_dealt,
                items_collected: p.stats.items_collected.len(),
                tiles_visited_pct: percent(p.stats.tiles_visited.len(), walkable),
            })
            .collect();
        let duration = self
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();
        self.stats
            .summarize(duration, self.grid.door_count(), walkable, players)
    }

    /// Drains the events produced since the last call.
    pub fn take_events(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }

    // -----------------------------------------------------------------------
    // Membership (structural)
    // -----------------------------------------------------------------------

    /// Seats a new player in the lobby.
    pub fn join(&mut self, id: PlayerId, profile: PlayerProfile) -> Result<(), RoomError> {
        if self.index_of(id).is_some() {
            return Err(RoomError::AlreadyInRoom(id, self.room_id));
        }
        if !self.status.is_joinable() {
            return Err(RoomError::InvalidState(format!(
                "cannot join a room in state {}",
                self.status
            )));
        }
        if self.locked {
            return Err(RoomError::RoomLocked(self.room_id));
        }
        if self.players.len() >= self.config.max_players {
            return Err(RoomError::RoomFull(self.room_id));
        }
        if self.avatar_taken(profile.avatar, None) {
            return Err(RoomError::AvatarTaken(profile.avatar));
        }

        let name = self.unique_name(&profile.name);
        let mut player = Player::new(id, profile, PlayerStatus::Player);
        player.name = name;
        self.players.push(player);
        info!(
            room_id = %self.room_id,
            player_id = %id,
            players = self.players.len(),
            "player joined"
        );
        self.lock_if_full();
        self.broadcast_snapshot();
        Ok(())
    }

    /// A player leaves. In the lobby they are removed (the admin leaving
    /// closes the room); once the game has started they are disconnected.
    pub fn leave(&mut self, id: PlayerId) -> Result<LeaveOutcome, RoomError> {
        let idx = self
            .index_of(id)
            .filter(|&i| self.players[i].is_connected())
            .ok_or(RoomError::NotInRoom(id, self.room_id))?;

        if self.status == RoomStatus::Lobby {
            if id == self.admin {
                self.close("the admin left the lobby");
                return Ok(LeaveOutcome::RoomClosed);
            }
            self.players.remove(idx);
            info!(room_id = %self.room_id, player_id = %id, "player left lobby");
            self.broadcast_snapshot();
            return Ok(LeaveOutcome::Left);
        }

        self.disconnect(id);
        if self.connected_humans() == 0 {
            self.close("no players left");
            return Ok(LeaveOutcome::RoomClosed);
        }
        Ok(LeaveOutcome::Disconnected)
    }

    /// The admin removes a player from the lobby.
    pub fn kick(&mut self, admin: PlayerId, target: PlayerId) -> Result<(), RoomError> {
        if admin != self.admin {
            return Err(RoomError::NotAdmin(admin));
        }
        if self.status != RoomStatus::Lobby {
            return Err(RoomError::InvalidState(format!(
                "cannot kick in state {}",
                self.status
            )));
        }
        if target == admin {
            return Err(RoomError::InvalidState("the admin cannot kick itself".into()));
        }
        let idx = self
            .index_of(target)
            .ok_or(RoomError::NotInRoom(target, self.room_id))?;

        self.emit(Recipient::All, ServerEvent::PlayerKicked { player_id: target });
        self.players.remove(idx);
        info!(room_id = %self.room_id, player_id = %target, "player kicked");
        self.broadcast_snapshot();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Game actions
    // -----------------------------------------------------------------------

    /// Applies a player's action, rejecting it if it is not legal right now,
    /// then lets any bots whose turn it is act.
    pub fn apply(&mut self, sender: PlayerId, action: ClientAction) {
        if let Err(err) = self.handle_action(sender, action) {
            self.reject(sender, err);
            return;
        }
        self.run_bots();
    }

    fn reject(&mut self, sender: PlayerId, err: ActionError) {
        debug!(
            room_id = %self.room_id,
            %sender,
            code = %err.code(),
            %err,
            "action rejected"
        );
        self.emit(
            Recipient::Player(sender),
            ServerEvent::ActionRejected {
                code: err.code(),
                reason: err.to_string(),
            },
        );
    }

    pub(crate) fn handle_action(
        &mut self,
        sender: PlayerId,
        action: ClientAction,
    ) -> Result<(), ActionError> {
        if !self
            .index_of(sender)
            .is_some_and(|i| self.players[i].is_connected())
        {
            return Err(ActionError::UnknownPlayer(sender));
        }

        match action {
            ClientAction::LockRoom => self.set_lock(sender, true),
            ClientAction::UnlockRoom => self.set_lock(sender, false),
            ClientAction::SelectAvatar { avatar } => self.select_avatar(sender, avatar),
            ClientAction::AddBot => self.add_bot(sender),
            ClientAction::StartGame => self.start_game(sender),
            ClientAction::MoveTo { destination } => self.move_to(sender, destination),
            ClientAction::ToggleDoor { position } => self.toggle_door(sender, position),
            ClientAction::StartCombat { target } => self.start_combat(sender, target),
            ClientAction::ResolveInventory { drop } => self.resolve_inventory(sender, drop),
            ClientAction::EndTurn => self.end_turn(sender),
            ClientAction::Attack => self.combat_act(sender, false, false),
            ClientAction::AttemptEvasion => self.combat_act(sender, true, false),
        }
    }

    // -- Lobby --

    fn set_lock(&mut self, sender: PlayerId, locked: bool) -> Result<(), ActionError> {
        self.require_admin(sender)?;
        self.require_status(RoomStatus::Lobby)?;
        if !locked && self.players.len() >= self.config.max_players {
            return Err(ActionError::RoomFull);
        }
        self.locked = locked;
        debug!(room_id = %self.room_id, locked, "lock changed");
        self.broadcast_snapshot();
        Ok(())
    }

    fn select_avatar(&mut self, sender: PlayerId, avatar: u8) -> Result<(), ActionError> {
        self.require_status(RoomStatus::Lobby)?;
        if self.avatar_taken(avatar, Some(sender)) {
            return Err(ActionError::AvatarTaken(avatar));
        }
        if let Some(p) = self.player_mut(sender) {
            p.avatar = avatar;
        }
        self.broadcast_snapshot();
        Ok(())
    }

    fn add_bot(&mut self, sender: PlayerId) -> Result<(), ActionError> {
        self.require_admin(sender)?;
        self.require_status(RoomStatus::Lobby)?;
        if self.players.len() >= self.config.max_players {
            return Err(ActionError::RoomFull);
        }

        let id = PlayerId(NEXT_BOT_ID.fetch_add(1, Ordering::Relaxed));
        let avatar = (0..=u8::MAX)
            .find(|&a| !self.avatar_taken(a, None))
            .unwrap_or_default();
        let bots = self.players.iter().filter(|p| p.is_bot()).count();
        let profile = PlayerProfile {
            name: self.unique_name(&format!("Bot {}", bots + 1)),
            avatar,
            bonus: if self.rng.random_bool(0.5) {
                AttributeBonus::Hp
            } else {
                AttributeBonus::Speed
            },
            dice: if self.rng.random_bool(0.5) {
                DiceBonus::Attack
            } else {
                DiceBonus::Defense
            },
        };
        self.players.push(Player::new(id, profile, PlayerStatus::Bot));
        info!(room_id = %self.room_id, player_id = %id, "bot added");
        self.lock_if_full();
        self.broadcast_snapshot();
        Ok(())
    }

    fn start_game(&mut self, sender: PlayerId) -> Result<(), ActionError> {
        self.require_admin(sender)?;
        self.require_status(RoomStatus::Lobby)?;
        let count = self.players.len();
        if count < self.config.min_players {
            return Err(ActionError::NotEnoughPlayers(self.config.min_players));
        }
        if !self.locked {
            return Err(ActionError::NotLocked);
        }
        let spawns = self.grid.spawn_points();
        if spawns.len() < count {
            return Err(ActionError::InvalidMap(format!(
                "{} spawn points for {count} players",
                spawns.len()
            )));
        }

        for (idx, &spawn) in spawns.iter().take(count).enumerate() {
            self.players[idx].spawn_position = spawn;
            self.step_player(idx, spawn);
        }
        for &unused in &spawns[count..] {
            self.grid.take_item(unused);
        }
        self.resolve_random_items();

        self.set_status(RoomStatus::Playing);
        self.started_at = Some(Instant::now());
        info!(room_id = %self.room_id, players = count, mode = ?self.config.mode, "game started");
        let snapshot = self.snapshot();
        self.emit(Recipient::All, ServerEvent::GameStarted { snapshot });

        self.active = 0;
        self.begin_turn();
        Ok(())
    }

    /// Random-item placeholders become equipment not otherwise on the map
    /// (any equipment once those run out).
    fn resolve_random_items(&mut self) {
        let placeholders = self.grid.find_items(ItemType::RandomItem);
        if placeholders.is_empty() {
            return;
        }
        let mut pool: Vec<ItemType> = ItemType::EQUIPMENT
            .iter()
            .copied()
            .filter(|&item| self.grid.find_items(item).is_empty())
            .collect();
        pool.shuffle(&mut self.rng);

        for pos in placeholders {
            let item = pool
                .pop()
                .or_else(|| ItemType::EQUIPMENT.choose(&mut self.rng).copied())
                .unwrap_or(ItemType::Greatsword);
            if let Err(err) = self.grid.replace_item(pos, Some(item)) {
                warn!(room_id = %self.room_id, %err, "could not resolve random item");
            }
        }
    }

    // -- Turn --

    fn move_to(&mut self, sender: PlayerId, destination: Position) -> Result<(), ActionError> {
        let idx = self.require_turn(sender)?;
        if !self.grid.contains(destination) {
            return Err(ActionError::OutOfRange(destination));
        }
        let origin = self.players[idx].position;
        let budget = self.players[idx].attributes.movement_points_left;
        let occupied = self.occupied_except(sender);
        if !reachable_tiles(origin, budget, &self.grid, &occupied).contains(&destination) {
            return Err(ActionError::IllegalMove(destination));
        }

        // Walk the cheapest route, stopping on the first item to pick up.
        let mut walked = Vec::new();
        let mut spent = 0;
        for step in fastest_path_avoiding(origin, destination, &self.grid, &occupied) {
            let Some(cost) = self.grid.cost(step) else {
                break;
            };
            spent += cost;
            walked.push(step);
            if self.grid.item(step).is_some_and(ItemType::is_collectable) {
                break;
            }
        }
        let Some(&end) = walked.last() else {
            return Err(ActionError::IllegalMove(destination));
        };

        for &step in &walked {
            self.step_player(idx, step);
        }
        let player = &mut self.players[idx];
        player.attributes.movement_points_left =
            player.attributes.movement_points_left.saturating_sub(spent);
        let movement_points_left = player.attributes.movement_points_left;
        self.moved_this_turn = true;
        self.emit(
            Recipient::All,
            ServerEvent::PlayerMoved {
                player_id: sender,
                path: walked,
                movement_points_left,
            },
        );

        self.pick_up(idx, end);
        self.maybe_auto_end_turn();
        Ok(())
    }

    fn pick_up(&mut self, idx: usize, position: Position) {
        let Some(item) = self.grid.item(position).filter(|i| i.is_collectable()) else {
            return;
        };
        let id = self.players[idx].id;
        if self.players[idx].inventory_full() {
            self.players[idx].pending = Some(PendingPickup { item, position });
            let inventory = self.players[idx].inventory.clone();
            debug!(room_id = %self.room_id, player_id = %id, ?item, "inventory full, awaiting decision");
            self.emit(
                Recipient::Player(id),
                ServerEvent::InventoryDecisionRequired {
                    incoming: item,
                    inventory,
                },
            );
            return;
        }

        self.grid.take_item(position);
        self.collect(idx, item);
        self.emit(
            Recipient::All,
            ServerEvent::ItemPickedUp {
                player_id: id,
                item,
                position,
            },
        );
    }

    /// Puts `item` in the inventory and updates the bookkeeping.
    fn collect(&mut self, idx: usize, item: ItemType) {
        let player = &mut self.players[idx];
        player.inventory.push(item);
        player.stats.items_collected.insert(item);
        if item == ItemType::Flag {
            self.stats.flag_holders.insert(player.id);
        }
    }

    fn resolve_inventory(&mut self, sender: PlayerId, drop: ItemType) -> Result<(), ActionError> {
        self.require_status(RoomStatus::Playing)?;
        let idx = self
            .index_of(sender)
            .ok_or(ActionError::UnknownPlayer(sender))?;
        let pending = self.players[idx]
            .pending
            .ok_or(ActionError::NoPendingDecision)?;

        if drop != pending.item {
            let slot = self.players[idx]
                .inventory
                .iter()
                .position(|&i| i == drop)
                .ok_or(ActionError::NotInInventory(drop))?;
            // Swap: the held item goes to the ground, the incoming one
            // into the freed slot.
            if let Err(err) = self.grid.replace_item(pending.position, Some(drop)) {
                warn!(room_id = %self.room_id, %err, "inventory swap failed");
                return Err(ActionError::IllegalMove(pending.position));
            }
            self.players[idx].inventory.remove(slot);
            self.collect(idx, pending.item);
            self.players[idx].clamp_movement();
        }

        self.players[idx].pending = None;
        let inventory = self.players[idx].inventory.clone();
        self.emit(
            Recipient::All,
            ServerEvent::InventoryResolved {
                player_id: sender,
                inventory,
                dropped: drop,
                position: pending.position,
            },
        );
        self.maybe_auto_end_turn();
        Ok(())
    }

    fn toggle_door(&mut self, sender: PlayerId, position: Position) -> Result<(), ActionError> {
        let idx = self.require_turn(sender)?;
        let player = &self.players[idx];
        if player.attributes.action_points == 0 {
            return Err(ActionError::NoActionPoints);
        }
        if !player.position.is_adjacent(position) {
            return Err(ActionError::OutOfRange(position));
        }
        if !self.grid.tile(position).is_some_and(TileType::is_door) {
            return Err(ActionError::IllegalMove(position));
        }
        if self.occupied_except(sender).contains(&position) {
            return Err(ActionError::IllegalMove(position));
        }

        let tile = self
            .grid
            .toggle_door(position)
            .map_err(|_| ActionError::IllegalMove(position))?;
        self.players[idx].attributes.action_points -= 1;
        self.stats.doors_toggled.insert(position);
        self.emit(
            Recipient::All,
            ServerEvent::DoorToggled {
                player_id: sender,
                position,
                tile,
            },
        );
        self.maybe_auto_end_turn();
        Ok(())
    }

    fn end_turn(&mut self, sender: PlayerId) -> Result<(), ActionError> {
        self.require_status(RoomStatus::Playing)?;
        if self.players[self.active].id != sender {
            return Err(ActionError::NotYourTurn);
        }
        self.advance_turn();
        Ok(())
    }

    // -- Combat --

    fn start_combat(&mut self, sender: PlayerId, target: PlayerId) -> Result<(), ActionError> {
        let idx = self.require_turn(sender)?;
        if self.players[idx].attributes.action_points == 0 {
            return Err(ActionError::NoActionPoints);
        }
        let t = self
            .index_of(target)
            .filter(|&t| t != idx && self.players[t].is_connected())
            .ok_or(ActionError::UnknownPlayer(target))?;
        if !self.players[idx]
            .position
            .is_adjacent(self.players[t].position)
        {
            return Err(ActionError::OutOfRange(self.players[t].position));
        }

        self.players[idx].attributes.action_points -= 1;
        let initiator = self.fighter(idx);
        let defender = self.fighter(t);
        let combat = Combat::new(initiator, defender, self.config.combat.clone());
        let mut timer = TurnTimer::new(TimerRole::Combat, self.config.timer.clone());
        let turn_secs = combat.turn_secs();
        timer.start(turn_secs);

        self.turn_timer.pause();
        self.set_status(RoomStatus::Combat);
        self.players[idx].stats.combats += 1;
        self.players[t].stats.combats += 1;
        self.engagement = Some(Engagement { combat, timer });

        info!(room_id = %self.room_id, initiator = %sender, %target, "combat started");
        self.emit(
            Recipient::All,
            ServerEvent::CombatStarted {
                initiator: sender,
                target,
                turn_secs,
            },
        );
        Ok(())
    }

    fn fighter(&self, idx: usize) -> Fighter {
        let p = &self.players[idx];
        Fighter::new(
            p.id,
            p.attributes.current_hp,
            p.combat_stats(),
            self.grid.tile(p.position) == Some(TileType::Ice),
        )
    }

    /// One combat action: an attack or an evasion attempt. `forced` marks
    /// the automatic attack after a combat timer expiry.
    fn combat_act(&mut self, sender: PlayerId, evade: bool, forced: bool) -> Result<(), ActionError> {
        let Some(engagement) = self.engagement.as_mut() else {
            return Err(CombatError::NotACombatant(sender).into());
        };
        let step = if evade {
            engagement.combat.evade(sender, &mut self.dice)?
        } else {
            engagement.combat.attack(sender, &mut self.dice)?
        };
        let next = step.end.is_none().then(|| engagement.combat.active());
        let turn_secs = engagement.combat.turn_secs();
        if step.end.is_none() {
            engagement.timer.start(turn_secs);
        }

        match &step.action {
            CombatAction::Attack(roll) if roll.hit => {
                if let Some(d) = self.player_mut(roll.defender) {
                    d.attributes.current_hp = roll.defender_hp;
                    d.stats.hp_lost += 1;
                }
                if let Some(a) = self.player_mut(roll.attacker) {
                    a.stats.damage_dealt += 1;
                }
            }
            CombatAction::Evasion { by, success: true, .. } => {
                if let Some(p) = self.player_mut(*by) {
                    p.stats.evasions += 1;
                }
            }
            _ => {}
        }

        self.emit(
            Recipient::All,
            ServerEvent::CombatExchange {
                action: step.action,
                forced,
                next,
                turn_secs,
            },
        );
        if let Some(end) = step.end {
            self.finish_combat(end);
        }
        Ok(())
    }

    fn finish_combat(&mut self, end: CombatEnd) {
        if self.engagement.take().is_none() {
            return;
        }
        info!(room_id = %self.room_id, outcome = ?end, "combat ended");
        self.set_status(RoomStatus::Playing);
        self.emit(Recipient::All, ServerEvent::CombatEnded { outcome: end });

        let mut turn_owner_lost = false;
        if let CombatEnd::Victory { winner, loser } = end {
            if let Some(w) = self.player_mut(winner) {
                w.wins += 1;
                w.stats.wins += 1;
                w.restore_hp();
            }
            if let Some(l) = self.player_mut(loser) {
                l.stats.losses += 1;
            }
            turn_owner_lost = self.players[self.active].id == loser;
            if self.player(loser).is_some_and(Player::is_connected) {
                self.eliminate(loser);
            }

            let wins = self.player(winner).map_or(0, |p| p.wins);
            if self.config.mode == GameMode::Classic && wins >= self.config.win_threshold {
                self.end_game(Some(winner));
                return;
            }
        }

        if turn_owner_lost || !self.players[self.active].is_connected() {
            self.advance_turn();
        } else {
            self.turn_timer.resume();
            self.maybe_auto_end_turn();
        }
    }

    /// The loser of a combat drops its inventory around the defeat tile
    /// and respawns with full HP.
    fn eliminate(&mut self, id: PlayerId) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        self.drop_inventory(idx);

        let occupied = self.occupied_except(id);
        let spawn = self.players[idx].spawn_position;
        let respawn = if occupied.contains(&spawn) {
            nearest_tile(spawn, &self.grid, |p| {
                !occupied.contains(&p) && self.grid.item(p).is_none_or(|i| !i.is_collectable())
            })
            .unwrap_or(spawn)
        } else {
            spawn
        };
        self.step_player(idx, respawn);
        self.players[idx].restore_hp();
        self.emit(
            Recipient::All,
            ServerEvent::PlayerEliminated {
                player_id: id,
                respawn,
            },
        );
    }

    /// Scatters the inventory (and any pending pickup decision) onto the
    /// free tiles nearest the player. Items with no free tile left stay in
    /// the inventory.
    fn drop_inventory(&mut self, idx: usize) {
        let id = self.players[idx].id;
        let origin = self.players[idx].position;
        self.players[idx].pending = None;
        let items = std::mem::take(&mut self.players[idx].inventory);
        if items.is_empty() {
            return;
        }

        let occupied = self.occupied_except(id);
        let mut dropped = Vec::with_capacity(items.len());
        let mut kept = Vec::new();
        for item in items {
            let spot = nearest_tile(origin, &self.grid, |p| {
                self.grid.can_hold_item(p) && self.grid.item(p).is_none() && !occupied.contains(&p)
            });
            match spot.map(|p| (p, self.grid.place_item(p, item))) {
                Some((p, Ok(()))) => dropped.push((item, p)),
                _ => {
                    warn!(room_id = %self.room_id, player_id = %id, ?item, "no room to drop item, keeping it");
                    kept.push(item);
                }
            }
        }
        self.players[idx].inventory = kept;
        self.players[idx].clamp_movement();
        if dropped.is_empty() {
            return;
        }
        self.emit(
            Recipient::All,
            ServerEvent::ItemsDropped {
                player_id: id,
                items: dropped,
            },
        );
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    fn begin_turn(&mut self) {
        let player = &mut self.players[self.active];
        player.replenish();
        let player_id = player.id;
        self.moved_this_turn = false;
        self.turn_timer.start(self.config.turn_secs);
        debug!(room_id = %self.room_id, %player_id, "turn started");
        self.emit(
            Recipient::All,
            ServerEvent::TurnChanged {
                player_id,
                turn_secs: self.config.turn_secs,
                turns: self.stats.turns,
            },
        );
    }

    /// Hands the turn to the next connected player in join order.
    fn advance_turn(&mut self) {
        if self.status != RoomStatus::Playing {
            return;
        }
        if let Some(pending) = self.players[self.active].pending.take() {
            debug!(room_id = %self.room_id, item = ?pending.item, "pending pickup left on the ground");
        }
        if self.connected_count() < 2 {
            let last = self.players.iter().find(|p| p.is_connected()).map(|p| p.id);
            self.end_game(last);
            return;
        }

        let n = self.players.len();
        let mut next = self.active;
        let mut wrapped = false;
        for _ in 0..n {
            next = (next + 1) % n;
            if next == 0 {
                wrapped = true;
            }
            if self.players[next].is_connected() {
                break;
            }
        }

        if wrapped {
            self.end_round();
            if self.status == RoomStatus::PostGame {
                return;
            }
        }
        self.active = next;
        self.begin_turn();
    }

    fn end_round(&mut self) {
        self.stats.turns += 1;
        debug!(room_id = %self.room_id, turns = self.stats.turns, "round complete");
        if self.config.mode == GameMode::CaptureTheFlag {
            let holder = self
                .players
                .iter()
                .find(|p| p.is_connected() && p.holds(ItemType::Flag))
                .map(|p| p.id);
            if holder.is_some() {
                self.end_game(holder);
            }
        }
    }

    fn maybe_auto_end_turn(&mut self) {
        if self.status != RoomStatus::Playing {
            return;
        }
        let player = &self.players[self.active];
        if player.pending.is_some() || self.has_options(self.active) {
            return;
        }
        debug!(room_id = %self.room_id, player_id = %player.id, "nothing left to do, ending turn");
        self.advance_turn();
    }

    /// Whether the player at `idx` can still move or act.
    fn has_options(&self, idx: usize) -> bool {
        let player = &self.players[idx];
        let occupied = self.occupied_except(player.id);
        let budget = player.attributes.movement_points_left;
        if !reachable_tiles(player.position, budget, &self.grid, &occupied).is_empty() {
            return true;
        }
        if player.attributes.action_points == 0 {
            return false;
        }
        let next_to_door = gridclash_board::nav::neighbors(player.position, self.grid.size())
            .into_iter()
            .any(|n| self.grid.tile(n).is_some_and(TileType::is_door) && !occupied.contains(&n));
        let next_to_player = self
            .players
            .iter()
            .any(|o| o.id != player.id && o.is_connected() && o.position.is_adjacent(player.position));
        next_to_door || next_to_player
    }

    fn end_game(&mut self, winner: Option<PlayerId>) {
        if !self.status.is_active() {
            return;
        }
        self.engagement = None;
        self.turn_timer.stop();
        for player in &mut self.players {
            player.pending = None;
        }
        self.set_status(RoomStatus::PostGame);
        self.winner = winner;
        info!(room_id = %self.room_id, winner = ?winner, "game ended");
        let statistics = self.statistics();
        self.emit(Recipient::All, ServerEvent::GameEnded { winner, statistics });
    }

    // -----------------------------------------------------------------------
    // Disconnection
    // -----------------------------------------------------------------------

    /// Takes a player out of a running game: status Disconnected, parked
    /// off the board, skipped by the rotation. A combatant forfeits.
    pub fn disconnect(&mut self, id: PlayerId) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        if !self.players[idx].is_connected() {
            return;
        }
        let active = self.status.is_active();
        let was_turn_owner = active && idx == self.active;
        if active {
            self.drop_inventory(idx);
        }

        let player = &mut self.players[idx];
        player.status = PlayerStatus::Disconnected;
        player.position = Position::OFF_BOARD;
        player.pending = None;
        info!(room_id = %self.room_id, player_id = %id, "player disconnected");
        self.emit(Recipient::All, ServerEvent::PlayerDisconnected { player_id: id });

        let forfeit = self
            .engagement
            .as_mut()
            .filter(|e| e.combat.involves(id))
            .and_then(|e| e.combat.forfeit(id).ok());
        if let Some(end) = forfeit {
            self.finish_combat(end);
        } else if was_turn_owner {
            self.advance_turn();
        }

        if self.status.is_active() && self.connected_count() < 2 {
            let last = self.players.iter().find(|p| p.is_connected()).map(|p| p.id);
            self.end_game(last);
        }
    }

    fn close(&mut self, reason: &str) {
        self.closed = true;
        self.engagement = None;
        self.turn_timer.stop();
        info!(room_id = %self.room_id, reason, "room closing");
        self.emit(
            Recipient::All,
            ServerEvent::RoomClosed {
                reason: reason.to_string(),
            },
        );
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Waits for the next tick of whichever countdown is running. Pends
    /// forever when neither is.
    pub async fn next_tick(&mut self) -> TimerTick {
        let combat = self.engagement.as_mut().map(|e| &mut e.timer);
        tokio::select! {
            tick = self.turn_timer.wait_for_tick() => tick,
            tick = wait_optional(combat) => tick,
        }
    }

    /// Applies a timer tick: broadcasts the countdown, and on expiry forces
    /// the turn to end or the combatant to attack.
    pub fn on_tick(&mut self, tick: TimerTick) {
        match tick.role {
            TimerRole::Turn => {
                if self.status != RoomStatus::Playing {
                    return;
                }
                if tick.expired {
                    debug!(room_id = %self.room_id, "turn timer expired");
                    self.advance_turn();
                } else {
                    self.emit_tick(tick);
                }
            }
            TimerRole::Combat => {
                let Some(actor) = self.combat().map(Combat::active) else {
                    return;
                };
                if tick.expired {
                    debug!(room_id = %self.room_id, %actor, "combat timer expired, attacking");
                    if let Err(err) = self.combat_act(actor, false, true) {
                        warn!(room_id = %self.room_id, %err, "forced attack failed");
                    }
                } else {
                    self.emit_tick(tick);
                }
            }
        }
        self.run_bots();
    }

    fn emit_tick(&mut self, tick: TimerTick) {
        self.emit(
            Recipient::All,
            ServerEvent::TimerTick {
                role: tick.role,
                remaining: tick.remaining,
            },
        );
    }

    // -----------------------------------------------------------------------
    // Bots
    // -----------------------------------------------------------------------

    /// Lets bots act for as long as it is a bot's move.
    fn run_bots(&mut self) {
        for _ in 0..BOT_STEP_LIMIT {
            let Some(bot) = self.acting_bot() else {
                return;
            };
            let action = bot::decide(self, bot);
            if let Err(err) = self.handle_action(bot, action) {
                debug!(room_id = %self.room_id, %bot, %err, "bot action refused, falling back");
                let fallback = if self.status == RoomStatus::Combat {
                    ClientAction::Attack
                } else {
                    ClientAction::EndTurn
                };
                if self.handle_action(bot, fallback).is_err() {
                    return;
                }
            }
        }
        warn!(room_id = %self.room_id, "bot step limit reached");
    }

    /// The bot whose decision the game is waiting on, if any.
    fn acting_bot(&self) -> Option<PlayerId> {
        let id = match self.status {
            RoomStatus::Combat => self.combat()?.active(),
            RoomStatus::Playing => self.players.get(self.active)?.id,
            _ => return None,
        };
        self.player(id).filter(|p| p.is_bot()).map(|p| p.id)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn emit(&mut self, to: Recipient, event: ServerEvent) {
        self.outbox.push((to, event));
    }

    fn broadcast_snapshot(&mut self) {
        let snapshot = self.snapshot();
        self.emit(Recipient::All, ServerEvent::RoomUpdated { snapshot });
    }

    fn set_status(&mut self, next: RoomStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.status
        );
        debug!(room_id = %self.room_id, from = %self.status, to = %next, "status change");
        self.status = next;
    }

    fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Moves a player one tile and records the visit.
    fn step_player(&mut self, idx: usize, position: Position) {
        self.players[idx].place(position);
        self.stats.tiles_visited.insert(position);
    }

    fn avatar_taken(&self, avatar: u8, except: Option<PlayerId>) -> bool {
        self.players
            .iter()
            .any(|p| p.avatar == avatar && Some(p.id) != except)
    }

    fn unique_name(&self, wanted: &str) -> String {
        let taken = |name: &str| self.players.iter().any(|p| p.name == name);
        if !taken(wanted) {
            return wanted.to_string();
        }
        (2..)
            .map(|n| format!("{wanted}-{n}"))
            .find(|name| !taken(name))
            .unwrap_or_else(|| wanted.to_string())
    }

    fn lock_if_full(&mut self) {
        if self.players.len() >= self.config.max_players && !self.locked {
            self.locked = true;
            info!(room_id = %self.room_id, "room full, locked");
        }
    }

    fn require_admin(&self, sender: PlayerId) -> Result<(), ActionError> {
        if sender == self.admin {
            Ok(())
        } else {
            Err(ActionError::NotAdmin)
        }
    }

    fn require_status(&self, wanted: RoomStatus) -> Result<(), ActionError> {
        if self.status == wanted {
            Ok(())
        } else {
            Err(ActionError::InvalidState(self.status.to_string()))
        }
    }

    /// The sender is the turn owner and free to act. Returns its index.
    fn require_turn(&self, sender: PlayerId) -> Result<usize, ActionError> {
        self.require_status(RoomStatus::Playing)?;
        let player = &self.players[self.active];
        if player.id != sender {
            return Err(ActionError::NotYourTurn);
        }
        if player.pending.is_some() {
            return Err(ActionError::InventoryDecisionPending);
        }
        Ok(self.active)
    }
}

async fn wait_optional(timer: Option<&mut TurnTimer>) -> TimerTick {
    match timer {
        Some(timer) => timer.wait_for_tick().await,
        None => std::future::pending().await,
    }
}
