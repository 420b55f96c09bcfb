//! Private chat negotiation between two sessions.
//!
//! The caller's session task drives the whole exchange; the callee only ever
//! sees two prompts (a `3` question and a `4` port request) whose answers are
//! routed back through its pending-answer slot by its connection reader. No
//! registry lock is held while waiting on the callee.

use std::time::Duration;

use log::{debug, info};

use super::error::ChatError;
use super::handle::{AskError, PendingAnswer, SessionHandle, WaitError};
use super::protocol::Reply;
use super::server::ServerContext;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteState {
    Invited,
    Accepted,
    Rejected,
    PortExchanged,
    Failed,
}

/// Lifecycle record of one `startprivate` request
#[derive(Debug, Clone)]
pub struct PrivateInvite {
    pub caller: String,
    pub callee: String,
    pub state: InviteState,
}

impl PrivateInvite {
    fn new(caller: &str, callee: &str) -> Self {
        PrivateInvite { caller: caller.to_string(), callee: callee.to_string(), state: InviteState::Invited }
    }

    fn advance(&mut self, next: InviteState) {
        debug!("Private invite {} -> {}: {:?} -> {:?}", self.caller, self.callee, self.state, next);
        self.state = next;
    }
}

/// What the caller's client needs to open the side-channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub caller: String,
    pub callee: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn to_reply(&self) -> Reply {
        Reply::private_accepted(&self.caller, &self.callee, &self.host, self.port)
    }
}

pub struct HandshakeCoordinator<'a> {
    ctx: &'a ServerContext,
    wait_limit: Duration,
}

impl<'a> HandshakeCoordinator<'a> {
    pub fn new(ctx: &'a ServerContext) -> Self {
        HandshakeCoordinator { ctx, wait_limit: ctx.settings.handshake_timeout }
    }

    /// Negotiate a private chat from `caller_name` (on `caller`) to `callee_name`
    pub async fn start_private(
        &self,
        caller: &SessionHandle,
        caller_name: &str,
        callee_name: &str,
    ) -> Result<Endpoint, ChatError> {
        let target = self.resolve_target(caller_name, callee_name).await?;

        let _engagement = target
            .try_engage()
            .ok_or_else(|| ChatError::AlreadyBusy(callee_name.to_string()))?;
        let mut invite = PrivateInvite::new(caller_name, callee_name);
        info!("{} invited {} to a private chat", caller_name, callee_name);

        let question = Reply::question(format!(
            "System: {} wants to have a private chat with you. Do you accept? (y/n): ",
            caller_name
        ));
        let answer = self.ask(&target, question, caller_name, callee_name, caller, &mut invite).await?;
        if !is_affirmative(&answer) {
            invite.advance(InviteState::Rejected);
            metrics::inc_handshakes_declined();
            return Err(ChatError::Declined(callee_name.to_string()));
        }
        invite.advance(InviteState::Accepted);

        let port_request = Reply::port_request(callee_name, caller_name);
        let answer = self.ask(&target, port_request, caller_name, callee_name, caller, &mut invite).await?;
        let port = match answer.trim().parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => {
                invite.advance(InviteState::Failed);
                target.send(&Reply::info(format!(
                    "Private chat with {} cancelled: \"{}\" is not a valid port.",
                    caller_name,
                    answer.trim()
                )));
                return Err(ChatError::InvalidPort(answer.trim().to_string()));
            }
        };
        invite.advance(InviteState::PortExchanged);
        metrics::inc_handshakes_completed();
        info!("Private chat {} -> {} negotiated on port {}", caller_name, callee_name, port);

        Ok(Endpoint {
            caller: caller_name.to_string(),
            callee: callee_name.to_string(),
            host: target.peer_host().to_string(),
            port,
        })
    }

    async fn resolve_target(&self, caller_name: &str, callee_name: &str) -> Result<SessionHandle, ChatError> {
        if self.ctx.directory.lookup(callee_name).await.is_none() {
            return Err(ChatError::UnknownUser(callee_name.to_string()));
        }
        if callee_name == caller_name {
            return Err(ChatError::SelfTargetNotAllowed);
        }
        let target = self
            .ctx
            .presence
            .get(callee_name)
            .await
            .ok_or_else(|| ChatError::Offline(callee_name.to_string()))?;
        if self.ctx.directory.has_blocked(callee_name, caller_name).await {
            return Err(ChatError::Blocked);
        }
        Ok(target)
    }

    /// Put one question to the callee and wait for the reply line
    async fn ask(
        &self,
        target: &SessionHandle,
        prompt: Reply,
        caller_name: &str,
        callee_name: &str,
        caller: &SessionHandle,
        invite: &mut PrivateInvite,
    ) -> Result<String, ChatError> {
        let pending: PendingAnswer = match target.ask(prompt) {
            Ok(p) => p,
            Err(AskError::Busy) => {
                invite.advance(InviteState::Failed);
                return Err(ChatError::AlreadyBusy(callee_name.to_string()));
            }
            Err(AskError::Closed) => {
                invite.advance(InviteState::Failed);
                return Err(ChatError::PeerDisconnected(callee_name.to_string()));
            }
        };
        let pending = pending.with_withdraw_notice(Reply::info(format!(
            "The private chat request from {} was withdrawn.",
            caller_name
        )));
        match pending.wait(self.wait_limit, caller).await {
            Ok(line) => Ok(line),
            Err(e) => {
                invite.advance(InviteState::Failed);
                debug!("Private invite {} -> {} ended: {:?}", caller_name, callee_name, e);
                Err(match e {
                    WaitError::Timeout => ChatError::Timeout,
                    WaitError::TargetGone => ChatError::PeerDisconnected(callee_name.to_string()),
                    WaitError::WaiterClosed => ChatError::SessionClosed,
                })
            }
        }
    }
}

/// `y` / `yes` in any case
pub fn is_affirmative(answer: &str) -> bool {
    let a = answer.trim();
    a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes")
}
