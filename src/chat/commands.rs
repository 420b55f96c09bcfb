use anyhow::Result;
use log::{debug, info, warn};

use super::account::{AccountRef, AuthOutcome};
use super::error::ChatError;
use super::handshake::is_affirmative;
use super::memo::Delivery;
use super::protocol::Reply;
use super::server::ServerContext;
use super::session::{Session, SessionState, TerminationReason};
use crate::metrics;

/// Longest `whoelsesince` window honoured (100 years)
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

pub const HELP_TEXT: &str = "Commands: message <user> <text> | broadcast <text> | whoelse | \
whoelsesince <seconds> | block <user> | unblock <user> | startprivate <user> | \
private <user> <text> | stopprivate <user> | logout | help";

/// A parsed command-mode line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login,
    Message { to: String, text: String },
    Logout,
    WhoElse,
    WhoElseSince(u64),
    Broadcast(String),
    Block(String),
    Unblock(String),
    StartPrivate(String),
    /// Private chat payloads travel over the side-channel, not the server
    Private,
    StopPrivate,
    Help,
    /// Known command with bad arguments; carries the usage string
    Usage(&'static str),
    Unknown(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let trimmed = line.trim();
        let (name, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((n, r)) => (n, r.trim()),
            None => (trimmed, ""),
        };
        match name.to_ascii_lowercase().as_str() {
            "" => Command::Empty,
            "login" => Command::Login,
            "logout" => Command::Logout,
            "whoelse" => Command::WhoElse,
            "help" | "?" => Command::Help,
            "private" => Command::Private,
            "stopprivate" => Command::StopPrivate,
            "message" => match rest.split_once(char::is_whitespace) {
                Some((to, text)) if !text.trim().is_empty() => Command::Message {
                    to: to.to_string(),
                    text: text.trim().to_string(),
                },
                _ => Command::Usage("message <user> <text>"),
            },
            "whoelsesince" => match rest.parse::<u64>() {
                Ok(secs) => Command::WhoElseSince(secs),
                Err(_) => Command::Usage("whoelsesince <seconds>"),
            },
            "broadcast" if rest.is_empty() => Command::Usage("broadcast <text>"),
            "broadcast" => Command::Broadcast(rest.to_string()),
            "block" => single_target(rest, Command::Block, "block <user>"),
            "unblock" => single_target(rest, Command::Unblock, "unblock <user>"),
            "startprivate" => single_target(rest, Command::StartPrivate, "startprivate <user>"),
            _ => Command::Unknown(name.to_string()),
        }
    }
}

fn single_target(rest: &str, make: fn(String) -> Command, usage: &'static str) -> Command {
    match rest.split_whitespace().next() {
        Some(user) => make(user.to_string()),
        None => Command::Usage(usage),
    }
}

/// Drives a session through authentication and dispatches its commands
pub struct CommandProcessor;

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProcessor {
    pub fn new() -> Self {
        CommandProcessor
    }

    /// Process one line according to the session's current state
    pub async fn process(&self, session: &mut Session, ctx: &ServerContext, line: &str) -> Result<()> {
        match session.state.clone() {
            SessionState::Connecting => self.handle_initial_connection(session, line),
            SessionState::AwaitingUsername => self.handle_username(session, ctx, line).await,
            SessionState::AwaitingPassword { username, failures } => {
                self.handle_password(session, ctx, line, username, failures).await
            }
            SessionState::ConfirmRegistration { username } => {
                self.handle_registration_confirm(session, ctx, line, username).await
            }
            SessionState::AwaitingNewPassword { username } => {
                self.handle_new_password(session, ctx, line, username).await
            }
            SessionState::Authenticated => self.handle_command(session, ctx, line).await,
            SessionState::Terminated => Ok(()),
        }
    }

    fn handle_initial_connection(&self, session: &mut Session, line: &str) -> Result<()> {
        match Command::parse(line) {
            Command::Login => {
                session.state = SessionState::AwaitingUsername;
                session.reply(Reply::info("Username: "));
            }
            Command::Empty => {}
            _ => session.reply(Reply::info("Please log in first by entering \"login\".")),
        }
        Ok(())
    }

    async fn handle_username(&self, session: &mut Session, ctx: &ServerContext, line: &str) -> Result<()> {
        let username = line.trim();
        if username.is_empty() || username.contains(char::is_whitespace) {
            session.reply(Reply::info("Usernames are a single word. Username: "));
            return Ok(());
        }
        if ctx.directory.lookup(username).await.is_some() {
            session.state = SessionState::AwaitingPassword { username: username.to_string(), failures: 0 };
            session.reply(Reply::info("Password: "));
        } else {
            session.state = SessionState::ConfirmRegistration { username: username.to_string() };
            session.reply(Reply::info("Username does not exist, do you want to create it? (y/n): "));
        }
        Ok(())
    }

    async fn handle_password(
        &self,
        session: &mut Session,
        ctx: &ServerContext,
        line: &str,
        username: String,
        failures: u8,
    ) -> Result<()> {
        let Some(account) = ctx.directory.lookup(&username).await else {
            session.state = SessionState::AwaitingUsername;
            session.reply(Reply::info("Username: "));
            return Ok(());
        };
        let outcome = ctx.directory.authenticate(&account, line.trim()).await;
        if outcome == AuthOutcome::WrongPassword {
            metrics::inc_failed_logins();
            let failures = failures.saturating_add(1);
            let max = ctx.settings.max_password_attempts;
            if failures >= max {
                ctx.directory.lock(&account).await;
                metrics::inc_lockouts();
                warn!("Account {} locked after {} failed attempts from {}", username, failures, session.handle.peer_host());
                session.reply(Reply::terminal(format!(
                    "Invalid Password. Your account is locked for {} seconds. Please try again later.",
                    ctx.settings.lock_duration.as_secs()
                )));
                session.terminate(ctx, TerminationReason::LoginRefused).await;
            } else {
                let left = max - failures;
                session.state = SessionState::AwaitingPassword { username, failures };
                session.reply(Reply::info(format!(
                    "Password incorrect. You have {} more {} to try. Password: ",
                    left,
                    if left == 1 { "chance" } else { "chances" }
                )));
            }
            return Ok(());
        }
        let greeting = format!("Login successful! Welcome to {}!", ctx.settings.name);
        self.finish_authentication(session, ctx, &username, account, outcome, &greeting).await;
        Ok(())
    }

    async fn handle_registration_confirm(
        &self,
        session: &mut Session,
        ctx: &ServerContext,
        line: &str,
        username: String,
    ) -> Result<()> {
        if is_affirmative(line) {
            info!("Registering new account {} from {}", username, session.handle.peer_host());
            session.state = SessionState::AwaitingNewPassword { username };
            session.reply(Reply::info("Please enter a new password: "));
        } else {
            session.reply(Reply::terminal("Account not created. Goodbye!"));
            session.terminate(ctx, TerminationReason::LoginRefused).await;
        }
        Ok(())
    }

    async fn handle_new_password(
        &self,
        session: &mut Session,
        ctx: &ServerContext,
        line: &str,
        username: String,
    ) -> Result<()> {
        let password = line.trim();
        if password.is_empty() || password.contains(char::is_whitespace) {
            session.reply(Reply::info("Passwords are a single word. Please enter a new password: "));
            return Ok(());
        }
        let account = match ctx.directory.create(&username, password).await {
            Ok(account) => account,
            Err(e) => {
                session.state = SessionState::AwaitingUsername;
                session.reply(Reply::info(format!("{} Username: ", e)));
                return Ok(());
            }
        };
        if let Some(store) = &ctx.credentials {
            if let Err(e) = store.append(&username, password).await {
                warn!("Failed to persist credentials for {}: {e:?}", username);
            }
        }
        let outcome = ctx.directory.authenticate(&account, password).await;
        let greeting = format!("Account created! You are logged in! Welcome to {}!", ctx.settings.name);
        self.finish_authentication(session, ctx, &username, account, outcome, &greeting).await;
        Ok(())
    }

    async fn finish_authentication(
        &self,
        session: &mut Session,
        ctx: &ServerContext,
        username: &str,
        account: AccountRef,
        outcome: AuthOutcome,
        greeting: &str,
    ) {
        let notice = match outcome {
            AuthOutcome::Success => {
                session.complete_login(ctx, username, account, greeting).await;
                return;
            }
            AuthOutcome::AlreadyOnline => "This account is already logged in.",
            AuthOutcome::Locked => "This account is locked due to multiple login failures. Please try again later.",
            AuthOutcome::WrongPassword => "Invalid password.",
        };
        info!("Login for {} refused: {:?}", username, outcome);
        session.reply(Reply::terminal(notice));
        session.terminate(ctx, TerminationReason::LoginRefused).await;
    }

    async fn handle_command(&self, session: &mut Session, ctx: &ServerContext, line: &str) -> Result<()> {
        let me = session.display_name();
        match Command::parse(line) {
            Command::Empty | Command::Private | Command::StopPrivate => {}
            Command::Login => session.reply(Reply::info(format!("You are already logged in as {}.", me))),
            Command::Message { to, text } => self.send_direct(session, ctx, &me, &to, &text).await,
            Command::Logout => {
                session.reply(Reply::terminal(format!(
                    "You are logged out! Thank you for using {}!",
                    ctx.settings.name
                )));
                session.terminate(ctx, TerminationReason::Logout).await;
            }
            Command::WhoElse => self.who_else(session, ctx, &me, None).await,
            Command::WhoElseSince(secs) => self.who_else(session, ctx, &me, Some(secs)).await,
            Command::Broadcast(text) => {
                ctx.relay().broadcast(&me, &Reply::info(format!("{}: {}", me, text))).await;
            }
            Command::Block(target) => self.set_blocked(session, ctx, &me, &target, true).await,
            Command::Unblock(target) => self.set_blocked(session, ctx, &me, &target, false).await,
            Command::StartPrivate(target) => {
                match ctx.coordinator().start_private(&session.handle, &me, &target).await {
                    Ok(endpoint) => session.reply(endpoint.to_reply()),
                    Err(ChatError::SessionClosed) => debug!("{} left while negotiating with {}", me, target),
                    Err(e @ ChatError::Declined(_)) => session.reply(Reply::info(e.to_string())),
                    Err(e) => session.reply(Reply::info(format!("Error. {}", e))),
                }
            }
            Command::Help => session.reply(Reply::info(HELP_TEXT)),
            Command::Usage(usage) => session.reply(Reply::info(format!("Command usage: {}", usage))),
            Command::Unknown(name) => session.reply(Reply::info(format!(
                "Command \"{}\" does not exist, enter \"help\" to list all supported commands.",
                name
            ))),
        }
        Ok(())
    }

    async fn send_direct(&self, session: &mut Session, ctx: &ServerContext, me: &str, to: &str, text: &str) {
        let refusal = if ctx.directory.lookup(to).await.is_none() {
            Some(ChatError::UnknownUser(to.to_string()))
        } else if to == me {
            Some(ChatError::SelfTargetNotAllowed)
        } else if ctx.directory.has_blocked(to, me).await {
            Some(ChatError::Blocked)
        } else {
            None
        };
        if let Some(e) = refusal {
            session.reply(Reply::info(format!("Error. {}", e)));
            return;
        }

        let line = Reply::info(format!("{}: {}", me, text));
        // A failed live send closes that session, so the next pass either
        // finds a fresh login or queues the memo.
        loop {
            match ctx.memos.queue_unless_present(&ctx.presence, me, to, text).await {
                Delivery::Live(handle) => {
                    if handle.send(&line) {
                        return;
                    }
                    debug!("{} went away mid-delivery, retrying", to);
                }
                Delivery::Queued(_) => {
                    metrics::inc_memos_queued();
                    session.reply(Reply::info(format!(
                        "{} is offline. Your message will be delivered at their next login.",
                        to
                    )));
                    return;
                }
            }
        }
    }

    async fn who_else(&self, session: &mut Session, ctx: &ServerContext, me: &str, since: Option<u64>) {
        let window = since.map(|s| chrono::Duration::seconds(s.min(MAX_WINDOW_SECS) as i64));
        let mut names = Vec::new();
        for (name, _) in ctx.presence.snapshot().await {
            if name == me || ctx.directory.has_blocked(&name, me).await {
                continue;
            }
            if let Some(window) = window {
                if !ctx.directory.is_recently_active(&name, window).await {
                    continue;
                }
            }
            names.push(name);
        }
        let reply = match (names.is_empty(), since) {
            (true, None) => "No other users are online.".to_string(),
            (true, Some(s)) => format!("No other users logged in within the last {} seconds.", s),
            (false, _) => format!("Online users: {}", names.join(", ")),
        };
        session.reply(Reply::info(reply));
    }

    async fn set_blocked(&self, session: &mut Session, ctx: &ServerContext, me: &str, target: &str, block: bool) {
        let verb = if block { "block" } else { "unblock" };
        if ctx.directory.lookup(target).await.is_none() {
            session.reply(Reply::info(format!("Error. {}", ChatError::UnknownUser(target.to_string()))));
            return;
        }
        if target == me {
            session.reply(Reply::info(format!("Error. Can not {} yourself.", verb)));
            return;
        }
        let Some(account) = session.account.clone() else {
            return;
        };
        let changed = {
            let mut guard = account.lock().await;
            if block { guard.block(target) } else { guard.unblock(target) }
        };
        debug!("{} {}ed {} (changed: {})", me, verb, target, changed);
        let text = match (block, changed) {
            (true, true) => format!("{} is blocked.", target),
            (true, false) => format!("{} is already blocked.", target),
            (false, true) => format!("{} is unblocked.", target),
            (false, false) => format!("{} was not blocked.", target),
        };
        session.reply(Reply::info(text));
    }
}
