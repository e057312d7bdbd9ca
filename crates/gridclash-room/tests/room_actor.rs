//! Integration tests for room actors and the room manager.

use std::time::Duration;

use gridclash_board::Grid;
use gridclash_protocol::{
    AttributeBonus, DiceBonus, GameMode, GridCodes, PlayerId, PlayerProfile, RoomId,
};
use gridclash_room::{
    ClientAction, LeaveOutcome, RoomConfig, RoomError, RoomManager, RoomStatus, ServerEvent,
};
use gridclash_timer::TimerRole;
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

const P1: PlayerId = PlayerId(1);
const P2: PlayerId = PlayerId(2);
const P3: PlayerId = PlayerId(3);

fn open_map() -> GridCodes {
    Grid::from_ascii(&["S....", ".....", ".....", ".....", "....S"])
        .unwrap()
        .to_codes()
}

fn profile(name: &str, avatar: u8) -> PlayerProfile {
    PlayerProfile {
        name: name.into(),
        avatar,
        bonus: AttributeBonus::Speed,
        dice: DiceBonus::Defense,
    }
}

fn manager() -> RoomManager {
    RoomManager::with_config(RoomConfig::default().with_turn_secs(2))
}

/// Receives events until one matches, failing after a minute of
/// (paused) time.
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    mut pred: impl FnMut(&ServerEvent) -> bool,
) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = rx.recv().await.expect("room dropped the player");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event never arrived")
}

/// Creates a room for P1 and seats P2, returning both receivers.
async fn two_player_room(
    mgr: &mut RoomManager,
) -> (
    RoomId,
    mpsc::UnboundedReceiver<ServerEvent>,
    mpsc::UnboundedReceiver<ServerEvent>,
) {
    let (tx1, rx1) = mpsc::unbounded_channel();
    let (tx2, rx2) = mpsc::unbounded_channel();
    let room_id = mgr
        .create_room(P1, &open_map(), GameMode::Classic, profile("ada", 1), tx1)
        .unwrap();
    mgr.join_room(P2, room_id, profile("bob", 2), tx2)
        .await
        .unwrap();
    (room_id, rx1, rx2)
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_create_join_and_list() {
    let mut mgr = manager();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let room_id = mgr
        .create_room(P1, &open_map(), GameMode::Classic, profile("ada", 1), tx1)
        .unwrap();
    assert_eq!(mgr.player_room(&P1), Some(room_id));

    let ServerEvent::RoomUpdated { snapshot } = rx1.recv().await.unwrap() else {
        panic!("expected the lobby snapshot first");
    };
    assert_eq!(snapshot.admin, P1);
    assert_eq!(snapshot.max_players, 2);

    let rooms = mgr.list_rooms().await;
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].player_count, 1);
    assert!(!rooms[0].locked);

    let (tx2, _rx2) = mpsc::unbounded_channel();
    mgr.join_room(P2, room_id, profile("bob", 2), tx2)
        .await
        .unwrap();
    let info = mgr.get_room_info(room_id).await.unwrap();
    assert_eq!(info.player_count, 2);
    assert!(info.locked);
    assert_eq!(info.status, RoomStatus::Lobby);

    let (tx3, _rx3) = mpsc::unbounded_channel();
    let err = mgr
        .join_room(P3, room_id, profile("cy", 3), tx3)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomLocked(_)));
    assert_eq!(mgr.player_room(&P3), None);
}

#[tokio::test(start_paused = true)]
async fn test_one_room_per_player() {
    let mut mgr = manager();
    let (room_id, _rx1, _rx2) = two_player_room(&mut mgr).await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = mgr
        .create_room(P2, &open_map(), GameMode::Classic, profile("bob", 2), tx)
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInRoom(p, r) if p == P2 && r == room_id));
    assert_eq!(mgr.room_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unusable_map_spawns_nothing() {
    let mut mgr = manager();
    let (tx, _rx) = mpsc::unbounded_channel();
    let bad = Grid::from_ascii(&["S..", "...", "..."]).unwrap().to_codes();
    let err = mgr
        .create_room(P1, &bad, GameMode::Classic, profile("ada", 1), tx)
        .unwrap_err();
    assert!(matches!(err, RoomError::InvalidMap(_)));
    assert_eq!(mgr.room_count(), 0);
    assert_eq!(mgr.player_room(&P1), None);

    let (tx, _rx) = mpsc::unbounded_channel();
    let ragged = GridCodes {
        size: 2,
        tiles: vec![vec![0, 0], vec![0]],
        items: vec![vec![0, 0], vec![0, 0]],
    };
    let err = mgr
        .create_room(P1, &ragged, GameMode::Classic, profile("ada", 1), tx)
        .unwrap_err();
    assert!(matches!(err, RoomError::InvalidMap(_)));
}

#[tokio::test(start_paused = true)]
async fn test_game_start_and_turn_expiry() {
    let mut mgr = manager();
    let (room_id, mut rx1, mut rx2) = two_player_room(&mut mgr).await;

    mgr.route_action(P1, ClientAction::StartGame).await.unwrap();
    wait_for(&mut rx2, |e| matches!(e, ServerEvent::GameStarted { .. })).await;
    let first = wait_for(&mut rx1, |e| matches!(e, ServerEvent::TurnChanged { .. })).await;
    assert!(matches!(first, ServerEvent::TurnChanged { player_id, turn_secs: 2, .. } if player_id == P1));

    // Countdown 2, 1, 0, then expiry hands the turn over.
    let tick = wait_for(&mut rx2, |e| matches!(e, ServerEvent::TimerTick { .. })).await;
    assert_eq!(
        tick,
        ServerEvent::TimerTick {
            role: TimerRole::Turn,
            remaining: 2
        }
    );
    let next = wait_for(&mut rx2, |e| matches!(e, ServerEvent::TurnChanged { .. })).await;
    assert!(matches!(next, ServerEvent::TurnChanged { player_id, .. } if player_id == P2));

    let info = mgr.get_room_info(room_id).await.unwrap();
    assert_eq!(info.status, RoomStatus::Playing);
    assert!(mgr.list_rooms().await.is_empty(), "started rooms are not listed");
}

#[tokio::test(start_paused = true)]
async fn test_rejections_reach_only_the_sender() {
    let mut mgr = manager();
    let (_room_id, mut rx1, mut rx2) = two_player_room(&mut mgr).await;
    mgr.route_action(P1, ClientAction::StartGame).await.unwrap();
    wait_for(&mut rx2, |e| matches!(e, ServerEvent::TurnChanged { .. })).await;

    mgr.route_action(P2, ClientAction::EndTurn).await.unwrap();
    let rejected = wait_for(&mut rx2, |e| matches!(e, ServerEvent::ActionRejected { .. })).await;
    let ServerEvent::ActionRejected { code, .. } = rejected else {
        unreachable!()
    };
    assert_eq!(code.as_str(), "notYourTurn");

    // P1's stream carries the game on but never the rejection.
    let mut seen = Vec::new();
    while let Ok(event) = rx1.try_recv() {
        seen.push(event);
    }
    assert!(!seen.iter().any(|e| matches!(e, ServerEvent::ActionRejected { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_leaving_mid_game_ends_it_and_last_leave_closes_room() {
    let mut mgr = manager();
    let (room_id, mut rx1, _rx2) = two_player_room(&mut mgr).await;
    mgr.route_action(P1, ClientAction::StartGame).await.unwrap();
    wait_for(&mut rx1, |e| matches!(e, ServerEvent::GameStarted { .. })).await;

    assert_eq!(mgr.leave_room(P2).await.unwrap(), LeaveOutcome::Disconnected);
    assert_eq!(mgr.player_room(&P2), None);
    let ended = wait_for(&mut rx1, |e| matches!(e, ServerEvent::GameEnded { .. })).await;
    assert!(matches!(ended, ServerEvent::GameEnded { winner: Some(w), .. } if w == P1));
    assert_eq!(
        mgr.get_room_info(room_id).await.unwrap().status,
        RoomStatus::PostGame
    );

    assert_eq!(mgr.leave_room(P1).await.unwrap(), LeaveOutcome::RoomClosed);
    assert_eq!(mgr.room_count(), 0);
    assert!(matches!(
        mgr.get_room_info(room_id).await.unwrap_err(),
        RoomError::NotFound(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_admin_leaving_lobby_releases_everyone() {
    let mut mgr = manager();
    let (_room_id, _rx1, mut rx2) = two_player_room(&mut mgr).await;

    assert_eq!(mgr.leave_room(P1).await.unwrap(), LeaveOutcome::RoomClosed);
    wait_for(&mut rx2, |e| matches!(e, ServerEvent::RoomClosed { .. })).await;
    assert_eq!(mgr.player_room(&P2), None);
    assert_eq!(mgr.room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_kick_through_manager() {
    let mut mgr = RoomManager::with_config(RoomConfig {
        max_players: 4,
        ..RoomConfig::default()
    });
    let (tx1, _rx1) = mpsc::unbounded_channel();
    let big = Grid::from_ascii(&[
        "S..........S",
        "............",
        "............",
        "............",
        "............",
        "............",
        "............",
        "............",
        "............",
        "............",
        "............",
        "S..........S",
    ])
    .unwrap()
    .to_codes();
    let room_id = mgr
        .create_room(P1, &big, GameMode::Classic, profile("ada", 1), tx1)
        .unwrap();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    mgr.join_room(P2, room_id, profile("bob", 2), tx2)
        .await
        .unwrap();

    let err = mgr.kick_player(P2, P1).await.unwrap_err();
    assert!(matches!(err, RoomError::NotAdmin(_)));

    mgr.kick_player(P1, P2).await.unwrap();
    wait_for(&mut rx2, |e| matches!(e, ServerEvent::PlayerKicked { .. })).await;
    assert_eq!(mgr.player_room(&P2), None);
    assert_eq!(mgr.get_room_info(room_id).await.unwrap().player_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_room() {
    let mut mgr = manager();
    let (room_id, _rx1, _rx2) = two_player_room(&mut mgr).await;
    let handle = mgr.room_handle(room_id).unwrap();

    mgr.destroy_room(room_id).await.unwrap();
    assert_eq!(mgr.room_count(), 0);
    assert_eq!(mgr.player_room(&P1), None);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(handle.is_closed());
    assert!(matches!(
        handle.get_info().await.unwrap_err(),
        RoomError::Unavailable(_)
    ));
}
