//! Error types for the protocol layer.
//!
//! Each gridclash crate defines its own error enum. A `ProtocolError`
//! always means a frame could not be turned into a message (or back), never
//! a network failure or a refused game action. Those live in the
//! transport and room crates.

/// Errors that can occur while encoding or decoding wire messages.
///
/// `thiserror` derives `std::error::Error` and `Display`; the `#[error]`
/// strings are what shows up in logs. The server's top-level error wraps
/// this one with `#[from]`, so `?` lifts it without a manual conversion.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed bytes, missing fields, or an
    /// unknown message tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but breaks a protocol rule, e.g. a first
    /// message that is not a handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// The symbolic code reported to the client for this error.
    pub fn code(&self) -> crate::ErrorCode {
        crate::ErrorCode::BadRequest
    }
}
