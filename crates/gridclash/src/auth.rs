//! Authentication hook for validating player identity.
//!
//! Accounts live in an external service. The server only needs something
//! that turns a handshake token into a [`PlayerId`], which is what the
//! [`Authenticator`] trait describes.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use gridclash_protocol::PlayerId;

/// Ids at or above this value are reserved for bots.
pub const MAX_PLAYER_ID: u64 = 1 << 40;

/// Errors that can occur while authenticating a handshake.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    Rejected(String),

    #[error("player {0} is already connected")]
    AlreadyConnected(PlayerId),
}

/// Validates a client's auth token and returns their identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server.
pub trait Authenticator: Send + Sync + 'static {
    /// `token` is empty when the client sent none.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<PlayerId, AuthError>> + Send;
}

/// Development authenticator.
///
/// A numeric token is taken as the player id. An empty token gets a fresh
/// guest id. Anything else is rejected.
#[derive(Debug)]
pub struct DevAuthenticator {
    next_guest: AtomicU64,
}

impl DevAuthenticator {
    pub fn new() -> Self {
        Self {
            next_guest: AtomicU64::new(1 << 32),
        }
    }
}

impl Default for DevAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<PlayerId, AuthError> {
        if token.is_empty() {
            return Ok(PlayerId(self.next_guest.fetch_add(1, Ordering::Relaxed)));
        }
        let id: u64 = token
            .parse()
            .map_err(|_| AuthError::Rejected("token must be a number".into()))?;
        if id == 0 || id >= MAX_PLAYER_ID {
            return Err(AuthError::Rejected(format!("player id {id} is out of range")));
        }
        Ok(PlayerId(id))
    }
}
