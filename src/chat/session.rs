use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::account::AccountRef;
use super::commands::CommandProcessor;
use super::handle::SessionHandle;
use super::protocol::Reply;
use super::server::ServerContext;
use crate::metrics;

/// Authentication state of a connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingUsername,
    AwaitingPassword { username: String, failures: u8 },
    ConfirmRegistration { username: String },
    AwaitingNewPassword { username: String },
    Authenticated,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Logout,
    Disconnected,
    Timeout,
    /// Lockout, duplicate login or declined registration
    LoginRefused,
}

/// Events the connection reader feeds to the session task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Line(String),
    /// A line was consumed as the answer to a pending question
    Answered,
}

/// Per-connection state machine, owned by its session task
pub struct Session {
    pub id: Uuid,
    pub handle: SessionHandle,
    pub username: Option<String>,
    pub account: Option<AccountRef>,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(handle: SessionHandle) -> Self {
        let now = Utc::now();
        Session {
            id: handle.id(),
            handle,
            username: None,
            account: None,
            state: SessionState::Connecting,
            connected_at: now,
            last_activity: now,
        }
    }

    /// Handle one inbound command-mode line
    pub async fn process_line(&mut self, ctx: &ServerContext, line: &str) -> Result<()> {
        self.update_activity();
        if !matches!(self.state, SessionState::AwaitingPassword { .. } | SessionState::AwaitingNewPassword { .. }) {
            debug!("Session {}: processing '{}'", self.id, line);
        }
        CommandProcessor::new().process(self, ctx, line).await
    }

    pub fn reply(&self, reply: Reply) {
        if !self.handle.send(&reply) {
            debug!("Session {}: client writer gone, dropped reply", self.id);
        }
    }

    pub fn update_activity(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    fn connected_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds()
    }

    /// The username, or "Guest" before login
    pub fn display_name(&self) -> String {
        self.username.clone().unwrap_or_else(|| "Guest".to_string())
    }

    /// Bind an authenticated account: greet, flush memos, register presence, announce.
    ///
    /// The session only becomes visible to others once the greeting and its
    /// queued memos are out.
    pub async fn complete_login(&mut self, ctx: &ServerContext, username: &str, account: AccountRef, greeting: &str) {
        self.username = Some(username.to_string());
        self.account = Some(account);
        self.state = SessionState::Authenticated;
        metrics::inc_logins();
        info!("User {} logged in from {}", username, self.handle.peer_host());

        self.reply(Reply::info(greeting));
        let delivered = ctx.memos.deliver_and_register(&ctx.presence, username, self.handle.clone()).await;
        metrics::add_memos_delivered(delivered as u64);
        let notice = Reply::info(format!("System: {} has logged in.", username));
        ctx.relay().broadcast(username, &notice).await;
    }

    /// The single teardown path for logout, disconnect, timeout and refusals.
    ///
    /// Safe to call more than once; only the first call has any effect.
    pub async fn terminate(&mut self, ctx: &ServerContext, reason: TerminationReason) {
        if self.is_terminated() {
            return;
        }
        self.state = SessionState::Terminated;
        self.handle.cancel_pending();
        if let (Some(name), Some(account)) = (self.username.take(), self.account.take()) {
            // Presence goes first so a racing re-login never collides with it.
            ctx.presence.remove(&name, self.id).await;
            ctx.directory.logout(&account).await;
            let notice = Reply::info(format!("System: {} has logged out.", name));
            ctx.relay().broadcast(&name, &notice).await;
            info!("User {} logged out ({:?}) after {}s connected", name, reason, self.connected_secs());
        } else {
            debug!("Session {} ended before login ({:?}) after {}s", self.id, reason, self.connected_secs());
        }
        self.handle.close();
    }
}

/// Write side of a session's inbound line stream
pub struct Inbound {
    handle: SessionHandle,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Inbound {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Route one framed line: to the pending question if there is one,
    /// otherwise to the command queue. False once the session has ended.
    pub fn deliver(&self, line: String) -> bool {
        let event = match self.handle.answer(line) {
            Ok(()) => SessionEvent::Answered,
            Err(line) => SessionEvent::Line(line),
        };
        self.events.send(event).is_ok()
    }

    /// The connection is gone: wake any waits on this session and end it
    pub fn disconnect(self) {
        self.handle.close();
    }
}

/// Everything the transport needs to drive one session
pub struct SessionLink {
    pub inbound: Inbound,
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub task: JoinHandle<()>,
}

/// Start a session task for a client connected from `peer_host`
pub fn spawn(ctx: Arc<ServerContext>, peer_host: impl Into<String>) -> SessionLink {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (ev_tx, ev_rx) = mpsc::unbounded_channel();
    let handle = SessionHandle::new(peer_host, out_tx);
    let session = Session::new(handle.clone());
    let task = tokio::spawn(run(ctx, session, ev_rx));
    SessionLink { inbound: Inbound { handle, events: ev_tx }, outbound: out_rx, task }
}

/// Session main loop: one command at a time, with an inactivity deadline
/// re-armed after every handled command or answer.
pub async fn run(ctx: Arc<ServerContext>, mut session: Session, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    debug!("Session {} started for {}", session.id, session.handle.peer_host());
    session.reply(Reply::info(format!(
        "{} Enter \"login\" to begin.",
        ctx.settings.welcome_message
    )));

    while !session.is_terminated() {
        let next = tokio::select! {
            biased;
            ev = tokio::time::timeout(ctx.settings.inactivity_timeout, events.recv()) => ev,
            _ = session.handle.closed() => Ok(None),
        };
        match next {
            Err(_) => {
                info!("Session {} ({}) timed out", session.id, session.display_name());
                metrics::inc_session_timeouts();
                session.reply(Reply::terminal("Timeout, exiting client..."));
                session.terminate(&ctx, TerminationReason::Timeout).await;
            }
            Ok(None) => session.terminate(&ctx, TerminationReason::Disconnected).await,
            Ok(Some(SessionEvent::Answered)) => session.update_activity(),
            Ok(Some(SessionEvent::Line(line))) => {
                if let Err(e) = session.process_line(&ctx, &line).await {
                    warn!("Session {}: command failed: {e:?}", session.id);
                }
            }
        }
    }
    debug!("Session {} finished", session.id);
}
