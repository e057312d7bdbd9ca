//! Room actor: an isolated Tokio task that owns one game session.
//!
//! The actor is the only writer of its session. Everything else talks to
//! it through a [`RoomHandle`]: commands go in over a bounded mpsc
//! channel, replies come back on oneshot channels, and game events go out
//! on each player's unbounded sender. There is no lock around the session
//! because nothing outside the task can reach it.
//!
//! # The loop
//!
//! The task waits in a single `select!` on two sources:
//!
//! 1. the command channel, for joins, leaves, kicks and game actions;
//! 2. the session's countdowns, via [`GameSession::next_tick`].
//!
//! Either branch ends the same way. The session's outbox is drained and
//! every event is routed to its [`Recipient`]. A player whose sender has
//! been dropped simply misses the event; their connection task cleans up
//! through the registry on its own.
//!
//! The actor stops when the session asks to close (admin left the lobby,
//! no humans left), on an explicit shutdown, or once every handle is
//! dropped.

use std::collections::HashMap;

use gridclash_board::Grid;
use gridclash_protocol::{PlayerId, PlayerProfile, Recipient, RoomId};
use tokio::sync::{mpsc, oneshot};

use crate::{
    ClientAction, GameSession, LeaveOutcome, RoomConfig, RoomError, RoomSnapshot, RoomStatus,
    ServerEvent,
};

/// Channel sender for delivering events to a player's connection.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

/// Commands sent to a room actor through its channel.
///
/// Variants that carry a `oneshot::Sender` are requests: the caller sends
/// the command and awaits the answer on that reply channel. `Action` has
/// none, because refused game actions are reported to the sender as an
/// `ActionRejected` event instead.
pub(crate) enum RoomCommand {
    Join {
        player_id: PlayerId,
        profile: PlayerProfile,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<LeaveOutcome, RoomError>>,
    },

    Kick {
        admin: PlayerId,
        target: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// A game action. Refusals come back as `ActionRejected` events.
    Action {
        sender: PlayerId,
        action: ClientAction,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },

    Shutdown,
}

/// Room metadata, as shown in the room list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub player_count: usize,
    pub max_players: usize,
    pub locked: bool,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// The actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub async fn join(
        &self,
        player_id: PlayerId,
        profile: PlayerProfile,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            player_id,
            profile,
            sender,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    pub async fn leave(&self, player_id: PlayerId) -> Result<LeaveOutcome, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Leave {
            player_id,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    pub async fn kick(&self, admin: PlayerId, target: PlayerId) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Kick {
            admin,
            target,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Sends a game action (fire-and-forget).
    pub async fn send_action(
        &self,
        sender: PlayerId,
        action: ClientAction,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Action { sender, action }).await
    }

    pub async fn get_info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::GetInfo { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Snapshot { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    session: GameSession,
    /// Per-player outbound channels.
    senders: HashMap<PlayerId, PlayerSender>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Processes commands and timer ticks until the room closes.
    async fn run(mut self) {
        let room_id = self.session.room_id();
        tracing::info!(%room_id, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                tick = self.session.next_tick() => {
                    self.session.on_tick(tick);
                    self.flush();
                }
            }
            if self.session.should_close() {
                break;
            }
        }

        tracing::info!(%room_id, "room actor stopped");
    }

    /// Returns `false` when the actor should stop.
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                player_id,
                profile,
                sender,
                reply,
            } => {
                let result = self.session.join(player_id, profile);
                if result.is_ok() {
                    self.senders.insert(player_id, sender);
                }
                self.flush();
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player_id, reply } => {
                let result = self.session.leave(player_id);
                // The leaver still hears about a room closing.
                self.flush();
                if result.is_ok() {
                    self.senders.remove(&player_id);
                }
                let _ = reply.send(result);
            }
            RoomCommand::Kick {
                admin,
                target,
                reply,
            } => {
                let result = self.session.kick(admin, target);
                self.flush();
                if result.is_ok() {
                    self.senders.remove(&target);
                }
                let _ = reply.send(result);
            }
            RoomCommand::Action { sender, action } => {
                if !self.senders.contains_key(&sender) {
                    tracing::warn!(
                        room_id = %self.session.room_id(),
                        %sender,
                        "action from non-member, ignoring"
                    );
                    return true;
                }
                self.session.apply(sender, action);
                self.flush();
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            RoomCommand::Shutdown => {
                tracing::info!(room_id = %self.session.room_id(), "room shutting down");
                return false;
            }
        }
        true
    }

    /// Dispatches the session's pending events to their recipients.
    fn flush(&mut self) {
        for (recipient, event) in self.session.take_events() {
            match recipient {
                Recipient::All => {
                    for sender in self.senders.values() {
                        let _ = sender.send(event.clone());
                    }
                }
                Recipient::Player(pid) => self.send_to(pid, event),
                Recipient::AllExcept(excluded) => {
                    for (pid, sender) in &self.senders {
                        if *pid != excluded {
                            let _ = sender.send(event.clone());
                        }
                    }
                }
            }
        }
    }

    /// Silently drops the event if the player's connection is gone.
    fn send_to(&self, player_id: PlayerId, event: ServerEvent) {
        if let Some(sender) = self.senders.get(&player_id) {
            let _ = sender.send(event);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.session.room_id(),
            status: self.session.status(),
            player_count: self.session.player_count(),
            max_players: self.session.max_players(),
            locked: self.session.is_locked(),
        }
    }
}

/// Opens a lobby and spawns its actor task.
///
/// The session is built before spawning, so an unusable map is reported
/// to the caller and no task is started.
pub(crate) fn spawn_room(
    room_id: RoomId,
    grid: Grid,
    config: RoomConfig,
    admin: PlayerId,
    profile: PlayerProfile,
    sender: PlayerSender,
) -> Result<RoomHandle, RoomError> {
    let channel_size = config.channel_size;
    let session = GameSession::new(room_id, grid, config, admin, profile)?;
    let _ = sender.send(ServerEvent::RoomUpdated {
        snapshot: session.snapshot(),
    });

    let (tx, rx) = mpsc::channel(channel_size);
    let actor = RoomActor {
        session,
        senders: HashMap::from([(admin, sender)]),
        receiver: rx,
    };
    tokio::spawn(actor.run());

    Ok(RoomHandle {
        room_id,
        sender: tx,
    })
}
