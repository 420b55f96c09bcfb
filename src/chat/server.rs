use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};
use tokio::net::TcpListener;

use crate::config::{Config, ServerConfig};
use crate::metrics;
use crate::storage::{Credential, CredentialStore};
use super::account::Directory;
use super::broadcast::BroadcastRelay;
use super::connection;
use super::handshake::HandshakeCoordinator;
use super::memo::MemoStore;
use super::presence::PresenceRegistry;
use super::protocol::Reply;

/// Runtime knobs every session reads
#[derive(Debug, Clone)]
pub struct Settings {
    pub name: String,
    pub welcome_message: String,
    pub lock_duration: Duration,
    pub inactivity_timeout: Duration,
    pub handshake_timeout: Duration,
    pub max_password_attempts: u8,
}

impl Settings {
    pub fn from_config(cfg: &ServerConfig) -> Self {
        Settings {
            name: cfg.name.clone(),
            welcome_message: cfg.welcome_message.clone(),
            lock_duration: Duration::from_secs(cfg.lock_duration),
            inactivity_timeout: Duration::from_secs(cfg.inactivity_timeout),
            handshake_timeout: Duration::from_secs(cfg.handshake_timeout),
            max_password_attempts: cfg.max_password_attempts,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_config(&ServerConfig::default())
    }
}

/// Shared state handed to every session
pub struct ServerContext {
    pub settings: Settings,
    pub directory: Directory,
    pub presence: PresenceRegistry,
    pub memos: MemoStore,
    pub credentials: Option<CredentialStore>,
}

impl ServerContext {
    pub fn new(settings: Settings, accounts: Vec<Credential>, credentials: Option<CredentialStore>) -> Self {
        let lock_duration = chrono::Duration::milliseconds(settings.lock_duration.as_millis() as i64);
        ServerContext {
            directory: Directory::from_credentials(accounts, lock_duration),
            presence: PresenceRegistry::new(),
            memos: MemoStore::new(),
            credentials,
            settings,
        }
    }

    pub fn relay(&self) -> BroadcastRelay<'_> {
        BroadcastRelay::new(&self.directory, &self.presence)
    }

    pub fn coordinator(&self) -> HandshakeCoordinator<'_> {
        HandshakeCoordinator::new(self)
    }
}

/// Accepts TCP clients and runs one session task per connection
pub struct ChatServer {
    config: Config,
    context: Arc<ServerContext>,
    listener: Option<TcpListener>,
}

impl ChatServer {
    /// Build the server context, loading accounts from the credential store
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = CredentialStore::open(&config.storage.credentials_file).await?;
        let accounts = store.load().await?;
        info!("Loaded {} account(s) from {}", accounts.len(), store.path().display());
        let context = Arc::new(ServerContext::new(Settings::from_config(&config.server), accounts, Some(store)));
        Ok(ChatServer { config, context, listener: None })
    }

    pub fn context(&self) -> Arc<ServerContext> {
        self.context.clone()
    }

    /// Bind the listening socket; returns the bound address
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.config.server.bind_address, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
        let local = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(local)
    }

    /// Accept connections until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self.listener.take().ok_or_else(|| anyhow!("listener not bound"))?;
        info!("{} listening on {}", self.config.server.name, listener.local_addr()?);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let ctx = self.context.clone();
                        tokio::spawn(async move {
                            if let Err(e) = connection::handle(stream, ctx).await {
                                warn!("Connection {} ended with error: {e:?}", peer);
                            }
                        });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                },
                _ = tokio::signal::ctrl_c() => { info!("Received shutdown signal"); break; }
            }
        }

        self.shutdown().await
    }

    /// Print a JSON summary of accounts, presence and counters
    pub async fn show_status(&self) -> Result<()> {
        let m = metrics::snapshot();
        let payload = serde_json::json!({
            "name": self.config.server.name,
            "listen": format!("{}:{}", self.config.server.bind_address, self.config.server.port),
            "credentials_file": self.config.storage.credentials_file,
            "accounts": self.context.directory.len().await,
            "online": self.context.presence.len().await,
            "pending_memos": self.context.memos.total_pending().await,
            "lock_duration_secs": self.config.server.lock_duration,
            "inactivity_timeout_secs": self.config.server.inactivity_timeout,
            "metrics": m,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down chat server...");
        for (name, handle) in self.context.presence.snapshot().await {
            info!("Closing session for {}", name);
            handle.send(&Reply::terminal("Server is shutting down."));
            handle.close();
        }
        let m = metrics::snapshot();
        info!(
            "Totals: {} login(s), {} lockout(s), {} memo(s) queued, {} private chat(s) negotiated",
            m.logins, m.lockouts, m.memos_queued, m.handshakes_completed
        );
        info!("Chat server shutdown complete");
        Ok(())
    }
}
