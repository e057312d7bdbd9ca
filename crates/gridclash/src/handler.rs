//! Per-connection handler: handshake, auth, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Authenticate token → get PlayerId
//!   3. Send HandshakeAck → player is connected
//!   4. Loop: receive envelopes and dispatch them, while forwarding the
//!      events of the player's room

use std::sync::Arc;
use std::time::Duration;

use gridclash_protocol::{
    Channel, Codec, Envelope, ErrorCode, Payload, PlayerId, ProtocolError, RoomListEntry,
    SystemMessage,
};
use gridclash_room::{ClientAction, LeaveOutcome, PlayerSender, RoomError, ServerEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::{AuthError, Authenticator, GridclashError, WebSocketConnection};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection that sends nothing for this long is dropped. Clients keep
/// quiet connections alive with heartbeats.
const IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Drop guard that takes a player out of their room and marks them
/// offline when the handler exits, even on panic.
///
/// `Drop` is synchronous, so the cleanup runs on a spawned task.
struct ConnectionGuard<A: Authenticator, C: Codec> {
    player_id: PlayerId,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for ConnectionGuard<A, C> {
    fn drop(&mut self) {
        let player_id = self.player_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let left = state.rooms.lock().await.leave_room(player_id).await;
            if let Ok(outcome) = left {
                tracing::info!(%player_id, ?outcome, "connection gone, left room");
            }
            state.online.lock().await.remove(&player_id);
        });
    }
}

/// Writes envelopes to one client, numbering them in order.
struct Outbound<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<'a, C: Codec> Outbound<'a, C> {
    fn new(conn: &'a WebSocketConnection, codec: &'a C) -> Self {
        Self {
            conn,
            codec,
            seq: 0,
            start: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn send(&mut self, channel: Channel, payload: Payload) -> Result<(), GridclashError> {
        let envelope = Envelope {
            seq: self.seq,
            timestamp: self.elapsed_ms(),
            channel,
            payload,
        };
        self.seq += 1;
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn system(&mut self, msg: SystemMessage) -> Result<(), GridclashError> {
        self.send(Channel::ReliableOrdered, Payload::System(msg)).await
    }

    /// Timer ticks are superseded every second, so they may be dropped.
    async fn event(&mut self, event: &ServerEvent) -> Result<(), GridclashError> {
        let channel = match event {
            ServerEvent::TimerTick { .. } => Channel::Unreliable,
            _ => Channel::ReliableOrdered,
        };
        let data = self.codec.encode(event)?;
        self.send(channel, Payload::Game(data)).await
    }

    async fn error(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<(), GridclashError> {
        self.system(SystemMessage::Error {
            code,
            message: message.into(),
        })
        .await
    }

    async fn room_error(&mut self, err: &RoomError) -> Result<(), GridclashError> {
        self.error(err.code(), err.to_string()).await
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), GridclashError>
where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");
    let mut out = Outbound::new(&conn, &state.codec);

    // --- Step 1: Handshake ---
    let player_id = perform_handshake(&mut out, &state).await?;

    if !state.online.lock().await.insert(player_id) {
        let err = AuthError::AlreadyConnected(player_id);
        out.error(ErrorCode::Unauthorized, err.to_string()).await?;
        return Err(err.into());
    }
    let _guard = ConnectionGuard {
        player_id,
        state: Arc::clone(&state),
    };

    let server_time = out.elapsed_ms();
    out.system(SystemMessage::HandshakeAck {
        player_id,
        server_time,
    })
    .await?;
    tracing::info!(%conn_id, %player_id, "player authenticated");

    // --- Step 2: Message loop ---
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let idle = tokio::time::sleep(IDLE_TIMEOUT);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            incoming = conn.recv() => {
                let data = match incoming {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%player_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%player_id, error = %e, "recv error");
                        break;
                    }
                };
                idle.as_mut().reset(Instant::now() + IDLE_TIMEOUT);

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::warn!(%player_id, error = %e, "failed to decode envelope");
                        continue;
                    }
                };

                match envelope.payload {
                    Payload::System(msg) => {
                        let close =
                            handle_system_message(&mut out, &state, player_id, &events_tx, msg)
                                .await?;
                        if close {
                            let _ = conn.close().await;
                            break;
                        }
                    }
                    Payload::Game(data) => {
                        handle_game_message(&mut out, &state, player_id, &data).await?;
                    }
                }
            }
            Some(event) = events_rx.recv() => {
                out.event(&event).await?;
            }
            () = &mut idle => {
                tracing::info!(%player_id, "connection timed out");
                break;
            }
        }
    }

    // _guard drops here → the player leaves their room.
    Ok(())
}

/// Receives and validates the Handshake, then authenticates its token.
async fn perform_handshake<A, C>(
    out: &mut Outbound<'_, C>,
    state: &ServerState<A, C>,
) -> Result<PlayerId, GridclashError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, out.conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(
                ProtocolError::InvalidMessage("connection closed before handshake".into()).into(),
            );
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let handshake = match state.codec.decode::<Envelope>(&data) {
        Ok(envelope) => envelope.payload,
        Err(e) => {
            out.error(ErrorCode::BadRequest, "expected Handshake").await?;
            return Err(e.into());
        }
    };
    let (version, token) = match handshake {
        Payload::System(SystemMessage::Handshake { version, token }) => (version, token),
        _ => {
            out.error(ErrorCode::BadRequest, "expected Handshake").await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be Handshake".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        tracing::warn!(version, "client protocol version rejected");
        out.error(
            ErrorCode::VersionMismatch,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    match state.auth.authenticate(token.as_deref().unwrap_or("")).await {
        Ok(player_id) => Ok(player_id),
        Err(e) => {
            out.error(ErrorCode::Unauthorized, e.to_string()).await?;
            Err(e.into())
        }
    }
}

/// Handles a system message. Returns `true` if the connection should close.
async fn handle_system_message<A, C>(
    out: &mut Outbound<'_, C>,
    state: &ServerState<A, C>,
    player_id: PlayerId,
    events: &PlayerSender,
    msg: SystemMessage,
) -> Result<bool, GridclashError>
where
    A: Authenticator,
    C: Codec,
{
    match msg {
        SystemMessage::Heartbeat { client_time } => {
            let server_time = out.elapsed_ms();
            out.system(SystemMessage::HeartbeatAck {
                client_time,
                server_time,
            })
            .await?;
        }

        SystemMessage::CreateRoom { map, mode, profile } => {
            // Lock only for the registry operation, not for network I/O.
            let created = state.rooms.lock().await.create_room(
                player_id,
                &map,
                mode,
                profile,
                events.clone(),
            );
            match created {
                Ok(room_id) => out.system(SystemMessage::RoomCreated { room_id }).await?,
                Err(e) => {
                    tracing::debug!(%player_id, error = %e, "create room refused");
                    out.room_error(&e).await?;
                }
            }
        }

        SystemMessage::JoinRoom { room_id, profile } => {
            let joined = state
                .rooms
                .lock()
                .await
                .join_room(player_id, room_id, profile, events.clone())
                .await;
            match joined {
                Ok(()) => out.system(SystemMessage::RoomJoined { room_id }).await?,
                Err(e) => {
                    tracing::debug!(%player_id, %room_id, error = %e, "join refused");
                    out.room_error(&e).await?;
                }
            }
        }

        SystemMessage::LeaveRoom => {
            let left = {
                let mut rooms = state.rooms.lock().await;
                match rooms.player_room(&player_id) {
                    Some(room_id) => Some((room_id, rooms.leave_room(player_id).await)),
                    None => None,
                }
            };
            match left {
                Some((room_id, Ok(outcome))) => {
                    let reason = match outcome {
                        LeaveOutcome::Left => "left the room",
                        LeaveOutcome::Disconnected => "left the game",
                        LeaveOutcome::RoomClosed => "room closed",
                    };
                    out.system(SystemMessage::RoomClosed {
                        room_id,
                        reason: reason.into(),
                    })
                    .await?;
                }
                Some((_, Err(e))) => out.room_error(&e).await?,
                None => out.error(ErrorCode::NotInRoom, "not in a room").await?,
            }
        }

        SystemMessage::KickPlayer { player_id: target } => {
            let kicked = state.rooms.lock().await.kick_player(player_id, target).await;
            if let Err(e) = kicked {
                tracing::debug!(%player_id, %target, error = %e, "kick refused");
                out.room_error(&e).await?;
            }
        }

        SystemMessage::ListRooms => {
            let rooms = state
                .rooms
                .lock()
                .await
                .list_rooms()
                .await
                .into_iter()
                .map(|info| RoomListEntry {
                    room_id: info.room_id,
                    player_count: info.player_count,
                    max_players: info.max_players,
                    locked: info.locked,
                })
                .collect();
            out.system(SystemMessage::RoomList { rooms }).await?;
        }

        SystemMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            return Ok(true);
        }

        other => {
            tracing::warn!(%player_id, msg = ?other, "unexpected system message");
            out.error(ErrorCode::BadRequest, "not a client message").await?;
        }
    }

    Ok(false)
}

/// Decodes a game action and routes it to the player's room. Refusals
/// from the game itself come back later as room events.
async fn handle_game_message<A, C>(
    out: &mut Outbound<'_, C>,
    state: &ServerState<A, C>,
    player_id: PlayerId,
    data: &[u8],
) -> Result<(), GridclashError>
where
    A: Authenticator,
    C: Codec,
{
    let action: ClientAction = match state.codec.decode(data) {
        Ok(action) => action,
        Err(e) => {
            tracing::warn!(%player_id, error = %e, "undecodable game action");
            out.error(ErrorCode::BadRequest, format!("invalid game message: {e}"))
                .await?;
            return Ok(());
        }
    };

    let routed = state
        .rooms
        .lock()
        .await
        .route_action(player_id, action)
        .await;
    if let Err(e) = routed {
        out.room_error(&e).await?;
    }
    Ok(())
}
