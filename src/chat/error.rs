//! Recoverable session-level failures.
//!
//! None of these end the server; they are rendered as `0`/`1` status lines
//! for the client that triggered them.

use thiserror::Error;

/// Why an authentication attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("incorrect password")]
    WrongPassword,
    #[error("account is already logged in")]
    AlreadyOnline,
    #[error("account is temporarily locked")]
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Authentication failed: {0}")]
    AuthFailure(AuthFailure),
    #[error("User \"{0}\" does not exist.")]
    UnknownUser(String),
    #[error("Username \"{0}\" is already taken.")]
    DuplicateUsername(String),
    #[error("You can not target yourself.")]
    SelfTargetNotAllowed,
    /// Deliberately vague so the sender cannot tell a block from other refusals.
    #[error("Can not reach this account.")]
    Blocked,
    #[error("User \"{0}\" is offline.")]
    Offline(String),
    #[error("{0} is busy with another private chat request, try again later.")]
    AlreadyBusy(String),
    #[error("{0} has rejected the private chat.")]
    Declined(String),
    #[error("{0} disconnected before the private chat was set up.")]
    PeerDisconnected(String),
    #[error("Session closed.")]
    SessionClosed,
    #[error("Timed out waiting for a response.")]
    Timeout,
    #[error("\"{0}\" is not a valid port number.")]
    InvalidPort(String),
}

impl From<AuthFailure> for ChatError {
    fn from(f: AuthFailure) -> Self {
        ChatError::AuthFailure(f)
    }
}
