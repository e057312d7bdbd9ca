//! Wire protocol for gridclash.
//!
//! - **Types** ([`Envelope`], [`SystemMessage`], [`Position`], [`GridCodes`],
//!   [`ErrorCode`], ...): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those structures are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room registry / room actor
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AttributeBonus, Channel, DiceBonus, Envelope, ErrorCode, GameMode, GridCodes, Payload,
    PlayerId, PlayerProfile, Position, Recipient, RoomId, RoomListEntry, SystemMessage,
};
