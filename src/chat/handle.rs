//! Cross-session handle to a live session.
//!
//! A [`SessionHandle`] is what other sessions hold: it can push reply lines to
//! the client, put the session into answer mode with a one-shot pending
//! answer slot, and observe when the session closes. The session's own state
//! machine lives in [`super::session::Session`] and is never shared.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::protocol::Reply;

struct PendingSlot {
    question_id: u64,
    tx: oneshot::Sender<String>,
}

struct Shared {
    id: Uuid,
    peer_host: String,
    outbound: mpsc::UnboundedSender<String>,
    pending: Mutex<Option<PendingSlot>>,
    next_question: AtomicU64,
    engaged: AtomicBool,
    closed: Arc<watch::Sender<bool>>,
}

#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

/// Why a question could not be asked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskError {
    /// Another question is already pending
    Busy,
    Closed,
}

/// Why waiting for an answer ended without one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    Timeout,
    /// The asked session closed or dropped the question
    TargetGone,
    /// The waiting session itself closed
    WaiterClosed,
}

impl SessionHandle {
    pub fn new(peer_host: impl Into<String>, outbound: mpsc::UnboundedSender<String>) -> Self {
        let (closed, _) = watch::channel(false);
        SessionHandle {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                peer_host: peer_host.into(),
                outbound,
                pending: Mutex::new(None),
                next_question: AtomicU64::new(1),
                engaged: AtomicBool::new(false),
                closed: Arc::new(closed),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Address the client connected from
    pub fn peer_host(&self) -> &str {
        &self.shared.peer_host
    }

    /// Queue a reply line for the client.
    ///
    /// False once the writer is gone, in which case the session is closed.
    pub fn send(&self, reply: &Reply) -> bool {
        if self.shared.outbound.send(reply.encode()).is_ok() {
            return true;
        }
        if !self.is_closed() {
            debug!("Session {}: client writer gone, closing", self.id());
            self.close();
        }
        false
    }

    fn slot(&self) -> MutexGuard<'_, Option<PendingSlot>> {
        self.shared.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn in_answer_mode(&self) -> bool {
        self.slot().is_some()
    }

    /// Enter answer mode and send `prompt` to the client.
    ///
    /// The slot is installed before the prompt goes out so a fast reply can
    /// never be mistaken for a command.
    pub fn ask(&self, prompt: Reply) -> Result<PendingAnswer, AskError> {
        if self.is_closed() {
            return Err(AskError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        let question_id = self.shared.next_question.fetch_add(1, Ordering::Relaxed);
        {
            let mut slot = self.slot();
            if slot.is_some() {
                return Err(AskError::Busy);
            }
            *slot = Some(PendingSlot { question_id, tx });
        }
        if !self.send(&prompt) {
            self.withdraw(question_id);
            return Err(AskError::Closed);
        }
        trace!("Session {} entered answer mode (question {})", self.id(), question_id);
        Ok(PendingAnswer { target: self.clone(), question_id, rx, withdraw_notice: None })
    }

    /// Hand an inbound line to the pending question, if any.
    ///
    /// Returns the line back when no question is pending so the caller can
    /// dispatch it as a command.
    pub fn answer(&self, line: String) -> Result<(), String> {
        let pending = self.slot().take();
        match pending {
            Some(slot) => {
                trace!("Session {} answered question {}", self.id(), slot.question_id);
                // A dropped waiter already withdrew; the line is still an answer.
                let _ = slot.tx.send(line);
                Ok(())
            }
            None => Err(line),
        }
    }

    /// Drop any pending question, waking its waiter with `TargetGone`
    pub fn cancel_pending(&self) {
        if self.slot().take().is_some() {
            trace!("Session {} cancelled its pending question", self.id());
        }
    }

    fn withdraw(&self, question_id: u64) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(p) if p.question_id == question_id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Reserve this session as the target of a private chat invitation
    pub fn try_engage(&self) -> Option<Engagement> {
        self.shared
            .engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Engagement { target: self.clone() })
    }

    pub fn is_engaged(&self) -> bool {
        self.shared.engaged.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.shared.closed.send_replace(true);
    }

    /// A way to close this session that does not keep its output open
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal { closed: self.shared.closed.clone() }
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("peer_host", &self.shared.peer_host)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// An outstanding question on another session.
///
/// Dropping it without an answer withdraws the question, returning the
/// target to command mode and optionally telling its client why.
pub struct PendingAnswer {
    target: SessionHandle,
    question_id: u64,
    rx: oneshot::Receiver<String>,
    withdraw_notice: Option<Reply>,
}

impl PendingAnswer {
    /// Line sent to the target if the question is withdrawn unanswered
    pub fn with_withdraw_notice(mut self, notice: Reply) -> Self {
        self.withdraw_notice = Some(notice);
        self
    }

    /// Wait for the answer, giving up after `limit` or when either side closes
    pub async fn wait(mut self, limit: Duration, waiter: &SessionHandle) -> Result<String, WaitError> {
        let target = self.target.clone();
        tokio::select! {
            res = &mut self.rx => res.map_err(|_| WaitError::TargetGone),
            _ = target.closed() => Err(WaitError::TargetGone),
            _ = waiter.closed() => Err(WaitError::WaiterClosed),
            _ = tokio::time::sleep(limit) => Err(WaitError::Timeout),
        }
    }
}

impl Drop for PendingAnswer {
    fn drop(&mut self) {
        if self.target.withdraw(self.question_id) {
            trace!("Question {} on session {} withdrawn", self.question_id, self.target.id());
            if let Some(notice) = self.withdraw_notice.take() {
                if !self.target.is_closed() {
                    self.target.send(&notice);
                }
            }
        }
    }
}

/// Closes a session from the transport side, e.g. when a write fails
#[derive(Clone)]
pub struct CloseSignal {
    closed: Arc<watch::Sender<bool>>,
}

impl CloseSignal {
    pub fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Held while a session is the target of an invitation
pub struct Engagement {
    target: SessionHandle,
}

impl Drop for Engagement {
    fn drop(&mut self) {
        self.target.shared.engaged.store(false, Ordering::Release);
    }
}
