//! `GridclashServer` builder and accept loop.
//!
//! Ties the layers together: WebSocket transport → envelopes → room
//! registry.

use std::collections::HashSet;
use std::sync::Arc;

use gridclash_protocol::{Codec, JsonCodec, PlayerId};
use gridclash_room::{RoomConfig, RoomManager};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{Authenticator, GridclashError, WebSocketListener};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) rooms: Mutex<RoomManager>,
    /// Players with a live connection. One connection per player.
    pub(crate) online: Mutex<HashSet<PlayerId>>,
    pub(crate) auth: A,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a server.
///
/// ```rust,no_run
/// use gridclash::prelude::*;
///
/// # async fn start() -> Result<(), GridclashError> {
/// let server = GridclashServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .room_config(RoomConfig::default().with_turn_secs(45))
///     .build(DevAuthenticator::new())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct GridclashServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
}

impl GridclashServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
        }
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Settings every new room starts from. Seat counts and game mode are
    /// still set per room from its map and request.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Binds the listener. Uses `JsonCodec` on the wire.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<GridclashServer<A, JsonCodec>, GridclashError> {
        let listener = WebSocketListener::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            rooms: Mutex::new(RoomManager::with_config(self.room_config)),
            online: Mutex::new(HashSet::new()),
            auth,
            codec: JsonCodec,
        });

        Ok(GridclashServer { listener, state })
    }
}

impl Default for GridclashServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound game server. Call [`run()`](Self::run) to start accepting
/// connections.
pub struct GridclashServer<A: Authenticator, C: Codec> {
    listener: WebSocketListener,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> GridclashServer<A, C> {
    pub fn builder() -> GridclashServerBuilder {
        GridclashServerBuilder::new()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections and spawns a handler task for each. Runs until
    /// the process is terminated.
    pub async fn run(self) -> Result<(), GridclashError> {
        tracing::info!("gridclash server running");

        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
