//! Accounts and the directory that owns them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use tokio::sync::{Mutex, RwLock};

use super::error::{AuthFailure, ChatError};
use crate::storage::Credential;

/// Result of checking a password against an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    WrongPassword,
    AlreadyOnline,
    Locked,
}

impl AuthOutcome {
    pub fn into_result(self) -> Result<(), AuthFailure> {
        match self {
            AuthOutcome::Success => Ok(()),
            AuthOutcome::WrongPassword => Err(AuthFailure::WrongPassword),
            AuthOutcome::AlreadyOnline => Err(AuthFailure::AlreadyOnline),
            AuthOutcome::Locked => Err(AuthFailure::Locked),
        }
    }
}

/// Authentication and blocking state for one user
#[derive(Debug, Clone)]
pub struct Account {
    username: String,
    password: String,
    online: bool,
    last_login: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    blocked: HashSet<String>,
}

impl Account {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Account {
            username: username.into(),
            password: password.into(),
            online: false,
            last_login: None,
            locked_until: None,
            blocked: HashSet::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }

    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        self.locked_until
    }

    /// Check a password at time `now`.
    ///
    /// A lock wins over everything, even the right password. A correct
    /// password against an account that is already online is refused without
    /// touching its state.
    pub fn authenticate(&mut self, password: &str, now: DateTime<Utc>) -> AuthOutcome {
        if self.is_locked(now) {
            return AuthOutcome::Locked;
        }
        if password != self.password {
            return AuthOutcome::WrongPassword;
        }
        if self.online {
            return AuthOutcome::AlreadyOnline;
        }
        self.record_login(now);
        AuthOutcome::Success
    }

    /// Mark the account online with a login at `at`
    pub fn record_login(&mut self, at: DateTime<Utc>) {
        self.online = true;
        self.last_login = Some(at);
    }

    pub fn logout(&mut self) {
        self.online = false;
    }

    pub fn lock_until(&mut self, until: DateTime<Utc>) {
        self.locked_until = Some(until);
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }

    /// True when the last login happened no earlier than `window` before `now`
    pub fn is_recently_active(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.last_login {
            Some(at) => now <= at + window,
            None => false,
        }
    }

    /// Returns false if `username` was already blocked
    pub fn block(&mut self, username: &str) -> bool {
        self.blocked.insert(username.to_string())
    }

    /// Returns false if `username` was not blocked
    pub fn unblock(&mut self, username: &str) -> bool {
        self.blocked.remove(username)
    }

    pub fn has_blocked(&self, username: &str) -> bool {
        self.blocked.contains(username)
    }
}

/// Shared handle to a directory-owned account
pub type AccountRef = Arc<Mutex<Account>>;

/// Authoritative username -> account mapping.
///
/// Accounts are never removed, so an `AccountRef` stays valid for the life
/// of the process.
pub struct Directory {
    accounts: RwLock<HashMap<String, AccountRef>>,
    lock_duration: Duration,
}

impl Directory {
    pub fn new(lock_duration: Duration) -> Self {
        Directory { accounts: RwLock::new(HashMap::new()), lock_duration }
    }

    /// Seed the directory from persisted credentials. Later duplicates win.
    pub fn from_credentials(credentials: Vec<Credential>, lock_duration: Duration) -> Self {
        let accounts = credentials
            .into_iter()
            .map(|c| {
                let account = Account::new(c.username.clone(), c.password);
                (c.username, Arc::new(Mutex::new(account)))
            })
            .collect();
        Directory { accounts: RwLock::new(accounts), lock_duration }
    }

    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    pub async fn lookup(&self, username: &str) -> Option<AccountRef> {
        self.accounts.read().await.get(username).cloned()
    }

    pub async fn create(&self, username: &str, password: &str) -> Result<AccountRef, ChatError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(username) {
            return Err(ChatError::DuplicateUsername(username.to_string()));
        }
        let account = Arc::new(Mutex::new(Account::new(username, password)));
        accounts.insert(username.to_string(), account.clone());
        info!("Created account {}", username);
        Ok(account)
    }

    pub async fn authenticate(&self, account: &AccountRef, password: &str) -> AuthOutcome {
        let mut guard = account.lock().await;
        let outcome = guard.authenticate(password, Utc::now());
        debug!("Authentication for {} => {:?}", guard.username(), outcome);
        outcome
    }

    /// Lock the account for the configured duration starting now
    pub async fn lock(&self, account: &AccountRef) -> DateTime<Utc> {
        let until = Utc::now() + self.lock_duration;
        let mut guard = account.lock().await;
        guard.lock_until(until);
        info!("Account {} locked until {}", guard.username(), until.format("%H:%M:%S UTC"));
        until
    }

    pub async fn logout(&self, account: &AccountRef) {
        account.lock().await.logout();
    }

    /// Whether `blocker` exists and has blocked `target`
    pub async fn has_blocked(&self, blocker: &str, target: &str) -> bool {
        match self.lookup(blocker).await {
            Some(account) => account.lock().await.has_blocked(target),
            None => false,
        }
    }

    pub async fn is_recently_active(&self, username: &str, window: Duration) -> bool {
        match self.lookup(username).await {
            Some(account) => account.lock().await.is_recently_active(window, Utc::now()),
            None => false,
        }
    }
}
