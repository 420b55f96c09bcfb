#![allow(dead_code)]
//! In-process clients driving sessions through the same line router the TCP
//! adapter uses.

use std::sync::Arc;
use std::time::Duration;

use skynet::chat::session::{self, Inbound, SessionLink};
use skynet::chat::{Reply, ServerContext, SessionHandle, Settings, StatusCode};
use skynet::storage::Credential;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const RECV_LIMIT: Duration = Duration::from_secs(3);

pub fn settings() -> Settings {
    Settings {
        name: "Skynet".into(),
        welcome_message: "Welcome to Skynet!".into(),
        lock_duration: Duration::from_secs(60),
        inactivity_timeout: Duration::from_secs(30),
        handshake_timeout: Duration::from_secs(10),
        max_password_attempts: 3,
    }
}

pub fn context_with(settings: Settings, users: &[(&str, &str)]) -> Arc<ServerContext> {
    let creds = users
        .iter()
        .map(|(u, p)| Credential { username: u.to_string(), password: p.to_string() })
        .collect();
    Arc::new(ServerContext::new(settings, creds, None))
}

pub fn context(users: &[(&str, &str)]) -> Arc<ServerContext> {
    context_with(settings(), users)
}

pub struct TestClient {
    ctx: Arc<ServerContext>,
    inbound: Option<Inbound>,
    outbound: mpsc::UnboundedReceiver<String>,
    pub handle: SessionHandle,
    task: Option<JoinHandle<()>>,
}

impl TestClient {
    pub fn connect(ctx: &Arc<ServerContext>, host: &str) -> Self {
        let SessionLink { inbound, outbound, task } = session::spawn(ctx.clone(), host);
        let handle = inbound.handle().clone();
        TestClient { ctx: ctx.clone(), inbound: Some(inbound), outbound, handle, task: Some(task) }
    }

    /// Connect and log in, returning once the login greeting arrived
    pub async fn logged_in(ctx: &Arc<ServerContext>, host: &str, user: &str, password: &str) -> Self {
        let mut client = TestClient::connect(ctx, host);
        client.login(user, password).await;
        client
    }

    pub fn send(&self, line: &str) {
        if let Some(inbound) = &self.inbound {
            inbound.deliver(line.to_string());
        }
    }

    pub async fn recv(&mut self) -> Reply {
        let line = tokio::time::timeout(RECV_LIMIT, self.outbound.recv())
            .await
            .expect("timed out waiting for a reply")
            .expect("session output closed");
        Reply::parse(&line).unwrap_or_else(|| panic!("not a status-coded line: {:?}", line))
    }

    pub async fn recv_until(&mut self, pred: impl Fn(&Reply) -> bool) -> Reply {
        loop {
            let reply = self.recv().await;
            if pred(&reply) {
                return reply;
            }
        }
    }

    pub async fn expect_contains(&mut self, needle: &str) -> Reply {
        self.recv_until(|r| r.body.contains(needle)).await
    }

    pub async fn expect_code(&mut self, code: StatusCode) -> Reply {
        self.recv_until(|r| r.code == code).await
    }

    /// Everything already queued for this client
    pub fn drain(&mut self) -> Vec<Reply> {
        let mut out = Vec::new();
        while let Ok(line) = self.outbound.try_recv() {
            if let Some(reply) = Reply::parse(&line) {
                out.push(reply);
            }
        }
        out
    }

    pub async fn login(&mut self, user: &str, password: &str) {
        self.send("login");
        self.expect_contains("Username: ").await;
        self.send(user);
        self.expect_contains("Password: ").await;
        self.send(password);
        self.expect_contains("Login successful").await;
        self.wait_until_present(user).await;
    }

    /// Wait until this session is the one registered for `user`
    pub async fn wait_until_present(&self, user: &str) {
        let registered = async {
            loop {
                if let Some(h) = self.ctx.presence.get(user).await {
                    if h.id() == self.handle.id() {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(RECV_LIMIT, registered)
            .await
            .expect("session never became present");
    }

    /// Stop taking replies, as if the client's writer had died
    pub fn drop_output(&mut self) {
        let (_tx, rx) = mpsc::unbounded_channel();
        self.outbound = rx;
    }

    /// Drop the connection without logging out
    pub fn disconnect(&mut self) {
        if let Some(inbound) = self.inbound.take() {
            inbound.disconnect();
        }
    }

    /// Wait for the session task to end
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            tokio::time::timeout(RECV_LIMIT, task)
                .await
                .expect("session did not finish")
                .expect("session task panicked");
        }
    }
}
