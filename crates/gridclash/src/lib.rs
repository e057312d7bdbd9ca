//! # gridclash
//!
//! WebSocket server for a turn-based grid strategy game.
//!
//! Clients connect over WebSocket, handshake with a protocol version and
//! an auth token, then create, list, and join rooms. Each room runs its own
//! game session as an isolated Tokio task; this crate only moves envelopes
//! between sockets and the room registry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridclash::prelude::*;
//!
//! # async fn start() -> Result<(), GridclashError> {
//! let server = GridclashServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(DevAuthenticator::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod auth;
mod error;
mod handler;
mod server;
mod transport;

pub use auth::{AuthError, Authenticator, DevAuthenticator, MAX_PLAYER_ID};
pub use error::GridclashError;
pub use server::{GridclashServer, GridclashServerBuilder, PROTOCOL_VERSION};
pub use transport::{ConnectionId, TransportError, WebSocketConnection, WebSocketListener};

/// Everything a server binary or a test client needs in one import.
pub mod prelude {
    pub use crate::{
        AuthError, Authenticator, DevAuthenticator, GridclashError, GridclashServer,
        GridclashServerBuilder, PROTOCOL_VERSION,
    };
    pub use gridclash_protocol::{
        AttributeBonus, Channel, Codec, DiceBonus, Envelope, ErrorCode, GameMode, GridCodes,
        JsonCodec, Payload, PlayerId, PlayerProfile, RoomId, RoomListEntry, SystemMessage,
    };
    pub use gridclash_room::{ClientAction, RoomConfig, ServerEvent};
}
