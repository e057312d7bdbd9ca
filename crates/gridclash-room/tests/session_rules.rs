//! Rule tests for the game session, driven synchronously with scripted dice.

use gridclash_board::{Grid, ItemType, Position, TileType};
use gridclash_combat::{CombatAction, CombatConfig, CombatEnd, ScriptedDice};
use gridclash_protocol::{
    AttributeBonus, DiceBonus, ErrorCode, GameMode, PlayerId, PlayerProfile, Recipient, RoomId,
};
use gridclash_room::{
    ClientAction, GameSession, LeaveOutcome, PlayerStatus, RoomConfig, RoomError, RoomStatus,
    ServerEvent,
};
use gridclash_timer::{TimerRole, TimerTick};

// =========================================================================
// Helpers
// =========================================================================

const P1: PlayerId = PlayerId(1);
const P2: PlayerId = PlayerId(2);
const P3: PlayerId = PlayerId(3);
const P4: PlayerId = PlayerId(4);

/// Two spawns in opposite corners.
const OPEN: [&str; 5] = ["S....", ".....", ".....", ".....", "....S"];

/// Spawns side by side.
const ADJACENT: [&str; 5] = ["SS...", ".....", ".....", ".....", "....."];

fn pos(row: i32, col: i32) -> Position {
    Position::new(row, col)
}

fn profile(name: &str, avatar: u8) -> PlayerProfile {
    PlayerProfile {
        name: name.into(),
        avatar,
        bonus: AttributeBonus::Hp,
        dice: DiceBonus::Attack,
    }
}

fn lobby_with(rows: &[&str], config: RoomConfig) -> GameSession {
    let grid = Grid::from_ascii(rows).unwrap();
    GameSession::new(RoomId(1), grid, config, P1, profile("ada", 1)).unwrap()
}

fn lobby(rows: &[&str]) -> GameSession {
    lobby_with(rows, RoomConfig::default())
}

/// Seats `extra` more players (P2, P3, ...) and starts the game.
fn start(session: &mut GameSession, extra: &[PlayerId]) {
    for (i, &id) in extra.iter().enumerate() {
        session
            .join(id, profile(&format!("player{}", id.0), 2 + i as u8))
            .unwrap();
    }
    session.apply(P1, ClientAction::LockRoom);
    session.apply(P1, ClientAction::StartGame);
    assert_eq!(session.status(), RoomStatus::Playing);
    session.take_events();
}

fn started(rows: &[&str]) -> GameSession {
    let mut s = lobby(rows);
    start(&mut s, &[P2]);
    s
}

/// Applies an action and returns the events it produced.
fn act(session: &mut GameSession, who: PlayerId, action: ClientAction) -> Vec<ServerEvent> {
    session.apply(who, action);
    session.take_events().into_iter().map(|(_, e)| e).collect()
}

fn rejection(events: &[ServerEvent]) -> Option<ErrorCode> {
    events.iter().find_map(|e| match e {
        ServerEvent::ActionRejected { code, .. } => Some(*code),
        _ => None,
    })
}

fn turn_changes(events: &[ServerEvent]) -> Vec<PlayerId> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::TurnChanged { player_id, .. } => Some(*player_id),
            _ => None,
        })
        .collect()
}

fn move_to(row: i32, col: i32) -> ClientAction {
    ClientAction::MoveTo {
        destination: pos(row, col),
    }
}

fn expiry(role: TimerRole) -> TimerTick {
    TimerTick {
        role,
        remaining: -1,
        expired: true,
    }
}

fn repeat(pattern: &[u32], times: usize) -> Vec<u32> {
    pattern.iter().copied().cycle().take(pattern.len() * times).collect()
}

// =========================================================================
// Lobby
// =========================================================================

#[test]
fn test_map_must_host_a_game() {
    let one_spawn = Grid::from_ascii(&["S....", ".....", ".....", ".....", "....."]).unwrap();
    let err = GameSession::new(RoomId(1), one_spawn, RoomConfig::default(), P1, profile("ada", 1))
        .unwrap_err();
    assert!(matches!(err, RoomError::InvalidMap(_)));

    let no_flag = Grid::from_ascii(&OPEN).unwrap();
    let ctf = RoomConfig::default().with_mode(GameMode::CaptureTheFlag);
    let err = GameSession::new(RoomId(1), no_flag, ctf, P1, profile("ada", 1)).unwrap_err();
    assert!(matches!(err, RoomError::InvalidMap(_)));
}

#[test]
fn test_join_rules_and_auto_lock() {
    let mut s = lobby(&OPEN);

    let err = s.join(P2, profile("bob", 1)).unwrap_err();
    assert!(matches!(err, RoomError::AvatarTaken(1)));

    s.join(P2, profile("bob", 2)).unwrap();
    assert!(s.is_locked(), "a full room locks itself");
    assert!(matches!(
        s.join(P2, profile("bob", 2)).unwrap_err(),
        RoomError::AlreadyInRoom(..)
    ));
    assert!(matches!(
        s.join(P3, profile("cy", 3)).unwrap_err(),
        RoomError::RoomLocked(_)
    ));

    let events = act(&mut s, P1, ClientAction::UnlockRoom);
    assert_eq!(rejection(&events), Some(ErrorCode::RoomFull));
    assert!(s.is_locked());
}

#[test]
fn test_duplicate_names_are_suffixed() {
    let mut s = lobby_with(&OPEN, RoomConfig {
        max_players: 4,
        ..RoomConfig::default()
    });
    s.join(P2, profile("ada", 2)).unwrap();
    s.join(P3, profile("ada", 3)).unwrap();
    let names: Vec<&str> = s.players().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["ada", "ada-2", "ada-3"]);
}

#[test]
fn test_kick_is_admin_only() {
    let mut s = lobby_with(&OPEN, RoomConfig {
        max_players: 4,
        ..RoomConfig::default()
    });
    s.join(P2, profile("bob", 2)).unwrap();
    s.take_events();

    assert!(matches!(s.kick(P2, P1).unwrap_err(), RoomError::NotAdmin(_)));
    assert!(matches!(s.kick(P1, P1).unwrap_err(), RoomError::InvalidState(_)));

    s.kick(P1, P2).unwrap();
    assert_eq!(s.player_count(), 1);
    let events = s.take_events();
    assert!(events.iter().any(|(to, e)| *to == Recipient::All
        && *e == ServerEvent::PlayerKicked { player_id: P2 }));
}

#[test]
fn test_admin_leaving_lobby_closes_room() {
    let mut s = lobby(&OPEN);
    s.join(P2, profile("bob", 2)).unwrap();
    s.take_events();

    assert_eq!(s.leave(P1).unwrap(), LeaveOutcome::RoomClosed);
    assert!(s.should_close());
    let events = s.take_events();
    assert!(matches!(events[0].1, ServerEvent::RoomClosed { .. }));
}

#[test]
fn test_player_leaving_lobby_frees_seat() {
    let mut s = lobby(&OPEN);
    s.join(P2, profile("bob", 2)).unwrap();
    assert_eq!(s.leave(P2).unwrap(), LeaveOutcome::Left);
    assert_eq!(s.player_count(), 1);
    assert!(!s.should_close());
    assert!(matches!(s.leave(P2).unwrap_err(), RoomError::NotInRoom(..)));
}

#[test]
fn test_avatar_selection() {
    let mut s = lobby_with(&OPEN, RoomConfig {
        max_players: 4,
        ..RoomConfig::default()
    });
    s.join(P2, profile("bob", 2)).unwrap();
    s.take_events();

    let events = act(&mut s, P2, ClientAction::SelectAvatar { avatar: 1 });
    assert_eq!(rejection(&events), Some(ErrorCode::AvatarTaken));

    let events = act(&mut s, P2, ClientAction::SelectAvatar { avatar: 7 });
    assert_eq!(rejection(&events), None);
    assert_eq!(s.player(P2).unwrap().avatar, 7);
}

// =========================================================================
// Starting
// =========================================================================

#[test]
fn test_start_conditions() {
    let mut s = lobby_with(&OPEN, RoomConfig {
        max_players: 4,
        ..RoomConfig::default()
    });

    let events = act(&mut s, P1, ClientAction::StartGame);
    assert_eq!(rejection(&events), Some(ErrorCode::NotEnoughPlayers));

    s.join(P2, profile("bob", 2)).unwrap();
    let events = act(&mut s, P2, ClientAction::StartGame);
    assert_eq!(rejection(&events), Some(ErrorCode::NotAdmin));

    let events = act(&mut s, P1, ClientAction::StartGame);
    assert_eq!(rejection(&events), Some(ErrorCode::InvalidState), "room not locked");
    assert_eq!(s.status(), RoomStatus::Lobby);

    act(&mut s, P1, ClientAction::LockRoom);
    let events = act(&mut s, P1, ClientAction::StartGame);
    assert_eq!(rejection(&events), None);
    assert_eq!(s.status(), RoomStatus::Playing);
    assert!(matches!(events[0], ServerEvent::GameStarted { .. }));
    assert_eq!(turn_changes(&events), [P1]);
    assert_eq!(s.active_player(), Some(P1));
}

#[test]
fn test_spawns_assigned_in_join_order_and_unused_removed() {
    let mut s = lobby(&["S...S", ".....", ".....", ".....", "....S"]);
    start(&mut s, &[P2]);

    assert_eq!(s.player(P1).unwrap().position, pos(0, 0));
    assert_eq!(s.player(P2).unwrap().position, pos(0, 4));
    assert_eq!(s.player(P2).unwrap().spawn_position, pos(0, 4));
    assert_eq!(s.grid().item(pos(4, 4)), None);
}

#[test]
fn test_random_items_become_missing_equipment() {
    let mut s = lobby(&["S?1..", ".....", ".....", ".....", "....S"]);
    start(&mut s, &[P2]);

    assert!(s.grid().find_items(ItemType::RandomItem).is_empty());
    let drawn = s.grid().item(pos(0, 1)).unwrap();
    assert!(
        [ItemType::Bulwark, ItemType::SwiftBoots, ItemType::LuckyCharm].contains(&drawn),
        "drew {drawn:?}"
    );
}

#[test]
fn test_lobby_actions_refused_once_started() {
    let mut s = started(&OPEN);
    let events = act(&mut s, P1, ClientAction::UnlockRoom);
    assert_eq!(rejection(&events), Some(ErrorCode::InvalidState));
    assert!(matches!(
        s.join(P3, profile("cy", 3)).unwrap_err(),
        RoomError::InvalidState(_)
    ));
}

// =========================================================================
// Movement
// =========================================================================

#[test]
fn test_move_spends_tile_costs() {
    let mut s = started(&["S~...", ".....", ".....", ".....", "....S"]);

    let events = act(&mut s, P1, move_to(0, 1));
    assert_eq!(
        events[0],
        ServerEvent::PlayerMoved {
            player_id: P1,
            path: vec![pos(0, 1)],
            movement_points_left: 2,
        }
    );

    act(&mut s, P1, move_to(0, 2));
    let p1 = s.player(P1).unwrap();
    assert_eq!(p1.position, pos(0, 2));
    assert_eq!(p1.attributes.movement_points_left, 1);
    assert_eq!(p1.history, [pos(0, 0), pos(0, 1), pos(0, 2)]);
}

#[test]
fn test_illegal_moves_change_nothing() {
    let mut s = started(&OPEN);

    // P2 stands there.
    let events = act(&mut s, P1, move_to(4, 4));
    assert_eq!(rejection(&events), Some(ErrorCode::IllegalMove));

    let events = act(&mut s, P1, move_to(9, 9));
    assert_eq!(rejection(&events), Some(ErrorCode::OutOfRange));

    // Five steps away with four movement points.
    let events = act(&mut s, P1, move_to(2, 3));
    assert_eq!(rejection(&events), Some(ErrorCode::IllegalMove));

    let events = act(&mut s, P2, move_to(4, 3));
    assert_eq!(rejection(&events), Some(ErrorCode::NotYourTurn));

    let p1 = s.player(P1).unwrap();
    assert_eq!(p1.position, pos(0, 0));
    assert_eq!(p1.attributes.movement_points_left, 4);
}

#[test]
fn test_rejection_goes_to_sender_only() {
    let mut s = started(&OPEN);
    s.apply(P2, move_to(4, 3));
    let events = s.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, Recipient::Player(P2));
}

#[test]
fn test_turn_ends_when_nothing_is_left() {
    let mut s = started(&["S.~..", ".....", ".....", ".....", "....S"]);
    let events = act(&mut s, P1, move_to(0, 3));
    assert_eq!(s.player(P1).unwrap().attributes.movement_points_left, 0);
    assert_eq!(turn_changes(&events), [P2]);
    assert_eq!(s.active_player(), Some(P2));
}

#[test]
fn test_end_turn_and_expiry_rotate() {
    let mut s = started(&OPEN);
    let events = act(&mut s, P1, ClientAction::EndTurn);
    assert_eq!(turn_changes(&events), [P2]);

    s.on_tick(expiry(TimerRole::Turn));
    let events: Vec<ServerEvent> = s.take_events().into_iter().map(|(_, e)| e).collect();
    assert_eq!(turn_changes(&events), [P1]);
    assert_eq!(s.global_stats().turns, 1);
}

#[test]
fn test_countdown_ticks_are_broadcast() {
    let mut s = started(&OPEN);
    s.on_tick(TimerTick {
        role: TimerRole::Turn,
        remaining: 12,
        expired: false,
    });
    let events = s.take_events();
    assert_eq!(
        events,
        [(
            Recipient::All,
            ServerEvent::TimerTick {
                role: TimerRole::Turn,
                remaining: 12
            }
        )]
    );
}

// =========================================================================
// Items
// =========================================================================

#[test]
fn test_walk_stops_on_items() {
    let mut s = started(&["S12..", ".....", ".....", ".....", "....S"]);

    let events = act(&mut s, P1, move_to(0, 3));
    assert_eq!(s.player(P1).unwrap().position, pos(0, 1));
    assert!(events.contains(&ServerEvent::ItemPickedUp {
        player_id: P1,
        item: ItemType::Greatsword,
        position: pos(0, 1),
    }));
    assert_eq!(s.grid().item(pos(0, 1)), None);

    act(&mut s, P1, move_to(0, 2));
    let p1 = s.player(P1).unwrap();
    assert_eq!(p1.inventory, [ItemType::Greatsword, ItemType::Bulwark]);
    assert_eq!(p1.attributes.movement_points_left, 2);
}

#[test]
fn test_full_inventory_asks_then_swaps() {
    let mut s = started(&["S123.", ".....", ".....", ".....", "....S"]);
    act(&mut s, P1, move_to(0, 1));
    act(&mut s, P1, move_to(0, 2));

    s.apply(P1, move_to(0, 3));
    let events = s.take_events();
    assert!(events.contains(&(
        Recipient::Player(P1),
        ServerEvent::InventoryDecisionRequired {
            incoming: ItemType::SwiftBoots,
            inventory: vec![ItemType::Greatsword, ItemType::Bulwark],
        }
    )));
    assert_eq!(s.grid().item(pos(0, 3)), Some(ItemType::SwiftBoots));

    let events = act(&mut s, P1, move_to(0, 4));
    assert_eq!(rejection(&events), Some(ErrorCode::InventoryDecisionPending));

    let events = act(&mut s, P1, ClientAction::ResolveInventory {
        drop: ItemType::LuckyCharm,
    });
    assert_eq!(rejection(&events), Some(ErrorCode::BadRequest));

    act(&mut s, P1, ClientAction::ResolveInventory {
        drop: ItemType::Greatsword,
    });
    let p1 = s.player(P1).unwrap();
    assert_eq!(p1.inventory, [ItemType::Bulwark, ItemType::SwiftBoots]);
    assert!(p1.pending.is_none());
    assert_eq!(s.grid().item(pos(0, 3)), Some(ItemType::Greatsword));

    let events = act(&mut s, P1, ClientAction::ResolveInventory {
        drop: ItemType::Greatsword,
    });
    assert_eq!(rejection(&events), Some(ErrorCode::NoPendingDecision));
}

#[test]
fn test_declining_the_incoming_item_leaves_it() {
    let mut s = started(&["S123.", ".....", ".....", ".....", "....S"]);
    act(&mut s, P1, move_to(0, 1));
    act(&mut s, P1, move_to(0, 2));
    act(&mut s, P1, move_to(0, 3));

    act(&mut s, P1, ClientAction::ResolveInventory {
        drop: ItemType::SwiftBoots,
    });
    assert_eq!(
        s.player(P1).unwrap().inventory,
        [ItemType::Greatsword, ItemType::Bulwark]
    );
    assert_eq!(s.grid().item(pos(0, 3)), Some(ItemType::SwiftBoots));
}

#[test]
fn test_turn_expiry_discards_pending_pickup() {
    let mut s = started(&["S123.", ".....", ".....", ".....", "....S"]);
    act(&mut s, P1, move_to(0, 1));
    act(&mut s, P1, move_to(0, 2));
    act(&mut s, P1, move_to(0, 3));
    assert!(s.player(P1).unwrap().pending.is_some());

    s.on_tick(expiry(TimerRole::Turn));
    let p1 = s.player(P1).unwrap();
    assert!(p1.pending.is_none());
    assert_eq!(p1.inventory.len(), 2);
    assert_eq!(s.grid().item(pos(0, 3)), Some(ItemType::SwiftBoots));
    assert_eq!(s.active_player(), Some(P2));
}

#[test]
fn test_pending_pickup_is_frozen_once_the_game_ends() {
    let mut s = started(&["S123.", ".....", ".....", ".....", "....S"]);
    act(&mut s, P1, move_to(0, 1));
    act(&mut s, P1, move_to(0, 2));
    act(&mut s, P1, move_to(0, 3));
    assert!(s.player(P1).unwrap().pending.is_some());

    s.leave(P2).unwrap();
    assert_eq!(s.status(), RoomStatus::PostGame);
    assert!(s.player(P1).unwrap().pending.is_none());
    s.take_events();

    let events = act(&mut s, P1, ClientAction::ResolveInventory {
        drop: ItemType::Greatsword,
    });
    assert_eq!(rejection(&events), Some(ErrorCode::InvalidState));
    assert_eq!(s.grid().item(pos(0, 3)), Some(ItemType::SwiftBoots));
    assert_eq!(
        s.player(P1).unwrap().inventory,
        [ItemType::Greatsword, ItemType::Bulwark]
    );
}

#[test]
fn test_items_with_nowhere_to_fall_stay_in_inventory() {
    // Every tile that could hold the greatsword is taken: spawns carry
    // their marker, P1 stands on the emptied item tile, the rest is door
    // or wall.
    let mut s = started(&["S####", "1d###", "#S###", "#####", "#####"]);
    act(&mut s, P1, ClientAction::EndTurn);
    act(&mut s, P2, move_to(1, 0));
    act(&mut s, P2, move_to(1, 1));
    assert_eq!(s.player(P2).unwrap().inventory, [ItemType::Greatsword]);
    act(&mut s, P2, ClientAction::EndTurn);
    act(&mut s, P1, move_to(1, 0));
    assert_eq!(s.player(P1).unwrap().position, pos(1, 0));

    s.leave(P2).unwrap();
    let events: Vec<ServerEvent> = s.take_events().into_iter().map(|(_, e)| e).collect();
    assert!(!events.iter().any(|e| matches!(e, ServerEvent::ItemsDropped { .. })));
    assert_eq!(s.player(P2).unwrap().inventory, [ItemType::Greatsword]);
    assert!(s.grid().find_items(ItemType::Greatsword).is_empty());
}

// =========================================================================
// Doors
// =========================================================================

#[test]
fn test_door_toggle_rules() {
    let mut s = started(&["SD...", ".....", ".....", ".....", "....S"]);

    let events = act(&mut s, P1, move_to(0, 1));
    assert_eq!(rejection(&events), Some(ErrorCode::IllegalMove), "closed door blocks");

    let events = act(&mut s, P1, ClientAction::ToggleDoor { position: pos(0, 3) });
    assert_eq!(rejection(&events), Some(ErrorCode::OutOfRange));

    let events = act(&mut s, P1, ClientAction::ToggleDoor { position: pos(1, 0) });
    assert_eq!(rejection(&events), Some(ErrorCode::IllegalMove));

    let events = act(&mut s, P1, ClientAction::ToggleDoor { position: pos(0, 1) });
    assert_eq!(
        events[0],
        ServerEvent::DoorToggled {
            player_id: P1,
            position: pos(0, 1),
            tile: TileType::OpenDoor,
        }
    );
    assert_eq!(s.player(P1).unwrap().attributes.action_points, 0);
    assert_eq!(s.global_stats().doors_toggled.len(), 1);

    let events = act(&mut s, P1, ClientAction::ToggleDoor { position: pos(0, 1) });
    assert_eq!(rejection(&events), Some(ErrorCode::NoActionPoints));

    let events = act(&mut s, P1, move_to(0, 1));
    assert_eq!(rejection(&events), None);
    assert_eq!(s.player(P1).unwrap().position, pos(0, 1));
}

// =========================================================================
// Combat
// =========================================================================

#[test]
fn test_combat_needs_adjacency() {
    let mut s = started(&OPEN);
    let events = act(&mut s, P1, ClientAction::StartCombat { target: P2 });
    assert_eq!(rejection(&events), Some(ErrorCode::OutOfRange));
    assert_eq!(s.status(), RoomStatus::Playing);
}

#[test]
fn test_combat_exchange_updates_hp() {
    let mut s = started(&ADJACENT).with_dice(ScriptedDice::new([6, 1]));

    let events = act(&mut s, P1, ClientAction::StartCombat { target: P2 });
    assert_eq!(
        events[0],
        ServerEvent::CombatStarted {
            initiator: P1,
            target: P2,
            turn_secs: 5,
        }
    );
    assert_eq!(s.status(), RoomStatus::Combat);
    assert!(s.turn_timer().is_paused());
    assert_eq!(s.player(P1).unwrap().attributes.action_points, 0);

    let events = act(&mut s, P1, ClientAction::Attack);
    let ServerEvent::CombatExchange {
        action: CombatAction::Attack(roll),
        forced,
        next,
        ..
    } = &events[0]
    else {
        panic!("expected an exchange, got {:?}", events[0]);
    };
    assert!(roll.hit && !forced);
    assert_eq!((roll.attack_total, roll.defense_total), (10, 5));
    assert_eq!(*next, Some(P2));
    assert_eq!(s.player(P2).unwrap().attributes.current_hp, 5);

    let events = act(&mut s, P1, ClientAction::Attack);
    assert_eq!(rejection(&events), Some(ErrorCode::NotYourTurn));
    let events = act(&mut s, P2, move_to(1, 1));
    assert_eq!(rejection(&events), Some(ErrorCode::InvalidState));
}

#[test]
fn test_attack_outside_combat_is_refused() {
    let mut s = started(&ADJACENT);
    let events = act(&mut s, P1, ClientAction::Attack);
    assert_eq!(rejection(&events), Some(ErrorCode::NotInCombat));
}

#[test]
fn test_knockout_drops_items_and_respawns_loser() {
    // P2 (with a greatsword) keeps missing; P1 hits every time.
    let mut s = started(&["S1S..", ".....", ".....", ".....", "....."])
        .with_dice(ScriptedDice::new(repeat(&[1, 4, 6, 1], 6)));
    act(&mut s, P1, ClientAction::EndTurn);
    act(&mut s, P2, move_to(0, 1));
    assert_eq!(s.player(P2).unwrap().inventory, [ItemType::Greatsword]);
    act(&mut s, P2, ClientAction::StartCombat { target: P1 });

    let mut events = Vec::new();
    for _ in 0..6 {
        events.extend(act(&mut s, P2, ClientAction::Attack));
        events.extend(act(&mut s, P1, ClientAction::Attack));
    }
    assert_eq!(rejection(&events), None);

    assert!(events.contains(&ServerEvent::CombatEnded {
        outcome: CombatEnd::Victory {
            winner: P1,
            loser: P2
        }
    }));
    assert!(events.contains(&ServerEvent::ItemsDropped {
        player_id: P2,
        items: vec![(ItemType::Greatsword, pos(0, 1))],
    }));
    assert!(events.contains(&ServerEvent::PlayerEliminated {
        player_id: P2,
        respawn: pos(0, 2),
    }));

    let p2 = s.player(P2).unwrap();
    assert!(p2.inventory.is_empty());
    assert_eq!(p2.position, pos(0, 2));
    assert_eq!(p2.attributes.current_hp, p2.attributes.total_hp);
    assert_eq!((p2.stats.losses, p2.stats.hp_lost), (1, 6));
    assert_eq!(s.grid().item(pos(0, 1)), Some(ItemType::Greatsword));

    let p1 = s.player(P1).unwrap();
    assert_eq!((p1.wins, p1.stats.damage_dealt), (1, 6));

    // The turn owner lost, so the turn moves on.
    assert_eq!(s.status(), RoomStatus::Playing);
    assert_eq!(s.active_player(), Some(P1));
    assert_eq!(turn_changes(&events), [P1]);
}

#[test]
fn test_classic_win_threshold_ends_game() {
    let config = RoomConfig::default().with_win_threshold(1);
    let mut s = lobby_with(&ADJACENT, config)
        .with_dice(ScriptedDice::new([repeat(&[6, 1, 1, 4], 5), vec![6, 1]].concat()));
    start(&mut s, &[P2]);

    act(&mut s, P1, ClientAction::StartCombat { target: P2 });
    let mut events = Vec::new();
    for _ in 0..5 {
        events.extend(act(&mut s, P1, ClientAction::Attack));
        events.extend(act(&mut s, P2, ClientAction::Attack));
    }
    events.extend(act(&mut s, P1, ClientAction::Attack));

    assert_eq!(s.status(), RoomStatus::PostGame);
    assert_eq!(s.winner(), Some(P1));
    let statistics = events
        .iter()
        .find_map(|e| match e {
            ServerEvent::GameEnded { winner, statistics } => {
                assert_eq!(*winner, Some(P1));
                Some(statistics.clone())
            }
            _ => None,
        })
        .expect("game ended");
    assert_eq!(statistics.players.len(), 2);
    assert_eq!(statistics.players[0].wins, 1);
    assert_eq!(statistics.players[1].losses, 1);

    let events = act(&mut s, P1, ClientAction::EndTurn);
    assert_eq!(rejection(&events), Some(ErrorCode::InvalidState));
}

#[test]
fn test_exchange_budget_draws() {
    let config = RoomConfig::default().with_combat(CombatConfig::default().with_max_exchanges(2));
    // Every die rolls 1: 5 against 5 never hits.
    let mut s = lobby_with(&ADJACENT, config).with_dice(ScriptedDice::new([]));
    start(&mut s, &[P2]);

    act(&mut s, P1, ClientAction::StartCombat { target: P2 });
    act(&mut s, P1, ClientAction::Attack);
    let events = act(&mut s, P2, ClientAction::Attack);
    assert!(events.contains(&ServerEvent::CombatEnded {
        outcome: CombatEnd::Draw
    }));
    assert_eq!(s.status(), RoomStatus::Playing);
    assert_eq!(s.active_player(), Some(P1));
    assert!(s.turn_timer().is_running());
}

#[test]
fn test_evasion_attempts() {
    let mut s = started(&ADJACENT).with_dice(ScriptedDice::new([]).with_chances([false, false]));
    act(&mut s, P1, ClientAction::StartCombat { target: P2 });

    act(&mut s, P1, ClientAction::AttemptEvasion);
    act(&mut s, P2, ClientAction::Attack);
    act(&mut s, P1, ClientAction::AttemptEvasion);
    act(&mut s, P2, ClientAction::Attack);
    let events = act(&mut s, P1, ClientAction::AttemptEvasion);
    assert_eq!(rejection(&events), Some(ErrorCode::NoEvasionLeft));
    assert_eq!(s.status(), RoomStatus::Combat);
}

#[test]
fn test_successful_evasion_resumes_turn() {
    let mut s = started(&ADJACENT).with_dice(ScriptedDice::new([]).with_chances([true]));
    act(&mut s, P1, ClientAction::StartCombat { target: P2 });
    let events = act(&mut s, P1, ClientAction::AttemptEvasion);

    assert!(events.contains(&ServerEvent::CombatEnded {
        outcome: CombatEnd::Evaded { by: P1 }
    }));
    assert_eq!(s.status(), RoomStatus::Playing);
    assert_eq!(s.active_player(), Some(P1));
    assert_eq!(s.player(P1).unwrap().stats.evasions, 1);
}

#[test]
fn test_combat_timer_expiry_forces_attack() {
    let mut s = started(&ADJACENT).with_dice(ScriptedDice::new([]));
    act(&mut s, P1, ClientAction::StartCombat { target: P2 });

    s.on_tick(expiry(TimerRole::Combat));
    let events: Vec<ServerEvent> = s.take_events().into_iter().map(|(_, e)| e).collect();
    let ServerEvent::CombatExchange {
        action: CombatAction::Attack(roll),
        forced: true,
        next,
        ..
    } = &events[0]
    else {
        panic!("expected a forced exchange, got {:?}", events[0]);
    };
    assert_eq!(roll.attacker, P1);
    assert_eq!(*next, Some(P2));
    assert_eq!(s.combat().unwrap().active(), P2);
}

// =========================================================================
// Disconnection and rotation
// =========================================================================

#[test]
fn test_rotation_skips_disconnected_player() {
    let config = RoomConfig {
        max_players: 4,
        ..RoomConfig::default()
    };
    let mut s = lobby_with(
        &["S....S", "......", "......", "......", "......", "S....S"],
        config,
    );
    start(&mut s, &[P2, P3, P4]);

    act(&mut s, P1, ClientAction::EndTurn);
    assert_eq!(s.active_player(), Some(P2));

    assert_eq!(s.leave(P3).unwrap(), LeaveOutcome::Disconnected);
    let p3 = s.player(P3).unwrap();
    assert_eq!(p3.status, PlayerStatus::Disconnected);
    assert_eq!(p3.position, Position::OFF_BOARD);
    assert_eq!(s.active_player(), Some(P2));

    let mut events = act(&mut s, P2, ClientAction::EndTurn);
    events.extend(act(&mut s, P4, ClientAction::EndTurn));
    assert_eq!(turn_changes(&events), [P4, P1]);
    assert_eq!(s.global_stats().turns, 1);

    let events = act(&mut s, P3, ClientAction::EndTurn);
    assert_eq!(rejection(&events), Some(ErrorCode::NotInRoom));
}

#[test]
fn test_active_player_leaving_passes_turn() {
    let config = RoomConfig {
        max_players: 4,
        ..RoomConfig::default()
    };
    let mut s = lobby_with(
        &["S....S", "......", "......", "......", "......", "S....S"],
        config,
    );
    start(&mut s, &[P2, P3]);

    s.leave(P1).unwrap();
    assert_eq!(s.active_player(), Some(P2));
    assert_eq!(s.status(), RoomStatus::Playing);
}

#[test]
fn test_last_opponent_leaving_ends_game() {
    let mut s = started(&OPEN);
    assert_eq!(s.leave(P2).unwrap(), LeaveOutcome::Disconnected);
    assert_eq!(s.status(), RoomStatus::PostGame);
    assert_eq!(s.winner(), Some(P1));

    assert_eq!(s.leave(P1).unwrap(), LeaveOutcome::RoomClosed);
    assert!(s.should_close());
}

#[test]
fn test_disconnect_mid_combat_forfeits() {
    let mut s = started(&ADJACENT);
    act(&mut s, P1, ClientAction::StartCombat { target: P2 });
    s.leave(P2).unwrap();

    let events: Vec<ServerEvent> = s.take_events().into_iter().map(|(_, e)| e).collect();
    assert!(events.contains(&ServerEvent::CombatEnded {
        outcome: CombatEnd::Victory {
            winner: P1,
            loser: P2
        }
    }));
    assert!(s.combat().is_none());
    assert_eq!(s.status(), RoomStatus::PostGame);
    assert_eq!(s.winner(), Some(P1));
}

// =========================================================================
// Capture the flag
// =========================================================================

#[test]
fn test_flag_holder_wins_after_full_rotation() {
    let config = RoomConfig::default().with_mode(GameMode::CaptureTheFlag);
    let mut s = lobby_with(&["SF...", ".....", ".....", ".....", "....S"], config);
    start(&mut s, &[P2]);

    act(&mut s, P1, move_to(0, 1));
    assert!(s.player(P1).unwrap().holds(ItemType::Flag));
    act(&mut s, P1, ClientAction::EndTurn);
    assert_eq!(s.status(), RoomStatus::Playing, "wins only once the round ends");

    let events = act(&mut s, P2, ClientAction::EndTurn);
    assert_eq!(s.status(), RoomStatus::PostGame);
    assert_eq!(s.winner(), Some(P1));
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::GameEnded { statistics, .. } if statistics.flag_holders == 1
    )));
}

// =========================================================================
// Bots
// =========================================================================

#[test]
fn test_bot_plays_its_turn() {
    let mut s = lobby(&OPEN);
    let events = act(&mut s, P2, ClientAction::AddBot);
    assert_eq!(rejection(&events), Some(ErrorCode::NotInRoom));

    act(&mut s, P1, ClientAction::AddBot);
    assert_eq!(s.player_count(), 2);
    assert!(s.is_locked());
    let bot = s.players()[1].clone();
    assert!(bot.is_bot());
    assert_ne!(bot.avatar, 1);

    act(&mut s, P1, ClientAction::StartGame);
    assert_eq!(s.status(), RoomStatus::Playing);

    let events = act(&mut s, P1, ClientAction::EndTurn);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::PlayerMoved { player_id, .. } if *player_id == bot.id
    )));
    assert_ne!(s.player(bot.id).unwrap().position, pos(4, 4));
    assert_eq!(s.active_player(), Some(P1));
    assert_eq!(s.global_stats().turns, 1);
}
