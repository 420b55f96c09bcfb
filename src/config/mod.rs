//! # Configuration Management Module
//!
//! Loads, validates and writes the server's TOML configuration.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - Listener address, server name, lockout and timeout policy
//! - [`StorageConfig`] - Location of the credential store
//! - [`LoggingConfig`] - Logging level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use skynet::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Listening on port {}", config.server.port);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! name = "Skynet"
//! bind_address = "0.0.0.0"
//! port = 9000
//! welcome_message = "Welcome to Skynet!"
//! lock_duration = 60        # seconds an account stays locked
//! inactivity_timeout = 300  # seconds of silence before a session is closed
//! handshake_timeout = 60    # seconds to wait for a private chat answer
//! max_password_attempts = 3
//!
//! [storage]
//! credentials_file = "./data/credentials.txt"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Missing keys fall back to defaults. Command line flags override values
//! from the file: CLI args > Config file > Defaults.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub bind_address: String,
    pub port: u16,
    pub welcome_message: String,
    pub lock_duration: u64,      // seconds
    pub inactivity_timeout: u64, // seconds
    pub handshake_timeout: u64,  // seconds
    pub max_password_attempts: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub credentials_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Config::load(path).await
        } else {
            Ok(Config::default())
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content).await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.name.trim().is_empty() {
            return Err(anyhow!("server.name must not be empty"));
        }
        if s.max_password_attempts == 0 {
            return Err(anyhow!("server.max_password_attempts must be at least 1"));
        }
        if s.inactivity_timeout == 0 {
            return Err(anyhow!("server.inactivity_timeout must be greater than 0"));
        }
        if s.handshake_timeout == 0 {
            return Err(anyhow!("server.handshake_timeout must be greater than 0"));
        }
        // Keeps lock expiry arithmetic far from chrono's range limits.
        if s.lock_duration > 10 * 365 * 24 * 60 * 60 {
            return Err(anyhow!("server.lock_duration must be at most ten years"));
        }
        if self.storage.credentials_file.trim().is_empty() {
            return Err(anyhow!("storage.credentials_file must not be empty"));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: "Skynet".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 9000,
            welcome_message: "Welcome to Skynet!".to_string(),
            lock_duration: 60,
            inactivity_timeout: 300,
            handshake_timeout: 60,
            max_password_attempts: 3,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig { credentials_file: "./data/credentials.txt".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: "info".to_string(), file: None }
    }
}
