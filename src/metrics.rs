//! Process-wide counters for logins, memos and private chat negotiation.
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static LOGINS: AtomicU64 = AtomicU64::new(0);
static FAILED_LOGINS: AtomicU64 = AtomicU64::new(0);
static LOCKOUTS: AtomicU64 = AtomicU64::new(0);
static MEMOS_QUEUED: AtomicU64 = AtomicU64::new(0);
static MEMOS_DELIVERED: AtomicU64 = AtomicU64::new(0);
static HANDSHAKES_COMPLETED: AtomicU64 = AtomicU64::new(0);
static HANDSHAKES_DECLINED: AtomicU64 = AtomicU64::new(0);
static SESSION_TIMEOUTS: AtomicU64 = AtomicU64::new(0);

pub fn inc_logins() { LOGINS.fetch_add(1, Ordering::Relaxed); }
pub fn inc_failed_logins() { FAILED_LOGINS.fetch_add(1, Ordering::Relaxed); }
pub fn inc_lockouts() { LOCKOUTS.fetch_add(1, Ordering::Relaxed); }
pub fn inc_memos_queued() { MEMOS_QUEUED.fetch_add(1, Ordering::Relaxed); }
pub fn add_memos_delivered(n: u64) { MEMOS_DELIVERED.fetch_add(n, Ordering::Relaxed); }
pub fn inc_handshakes_completed() { HANDSHAKES_COMPLETED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_handshakes_declined() { HANDSHAKES_DECLINED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_session_timeouts() { SESSION_TIMEOUTS.fetch_add(1, Ordering::Relaxed); }

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub logins: u64,
    pub failed_logins: u64,
    pub lockouts: u64,
    pub memos_queued: u64,
    pub memos_delivered: u64,
    pub handshakes_completed: u64,
    pub handshakes_declined: u64,
    pub session_timeouts: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        logins: LOGINS.load(Ordering::Relaxed),
        failed_logins: FAILED_LOGINS.load(Ordering::Relaxed),
        lockouts: LOCKOUTS.load(Ordering::Relaxed),
        memos_queued: MEMOS_QUEUED.load(Ordering::Relaxed),
        memos_delivered: MEMOS_DELIVERED.load(Ordering::Relaxed),
        handshakes_completed: HANDSHAKES_COMPLETED.load(Ordering::Relaxed),
        handshakes_declined: HANDSHAKES_DECLINED.load(Ordering::Relaxed),
        session_timeouts: SESSION_TIMEOUTS.load(Ordering::Relaxed),
    }
}
