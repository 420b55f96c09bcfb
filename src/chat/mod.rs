//! Chat session coordination
//!
//! This module contains the core chat server functionality including:
//! - Account directory with lockout
//! - Presence tracking and broadcast fan-out
//! - Offline memo queues
//! - Per-connection session state machines and command dispatch
//! - Private chat negotiation between two sessions

pub mod account;
pub mod broadcast;
pub mod commands;
pub mod connection;
pub mod error;
pub mod handle;
pub mod handshake;
pub mod memo;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod session;

pub use account::{Account, AccountRef, AuthOutcome, Directory};
pub use broadcast::BroadcastRelay;
pub use commands::{Command, CommandProcessor};
pub use error::{AuthFailure, ChatError};
pub use handle::SessionHandle;
pub use handshake::{Endpoint, HandshakeCoordinator, InviteState, PrivateInvite};
pub use memo::{MemoEntry, MemoStore};
pub use presence::PresenceRegistry;
pub use protocol::{Reply, StatusCode};
pub use server::{ChatServer, ServerContext, Settings};
pub use session::{Session, SessionState};
