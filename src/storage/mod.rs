//! Flat-file credential store.
//!
//! One `username password` pair per line, whitespace separated. The file is
//! read once at startup and only ever appended to afterwards.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use fs2::FileExt;
use log::warn;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

pub struct CredentialStore {
    path: PathBuf,
    // Serialises appends from this process; the file lock covers other processes.
    append_lock: Mutex<()>,
}

impl CredentialStore {
    /// Open (creating if needed) the credential file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await
                .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
        }
        if !fs::try_exists(&path).await.unwrap_or(false) {
            fs::write(&path, "").await
                .map_err(|e| anyhow!("Failed to create credentials file {}: {}", path.display(), e))?;
        }
        Ok(CredentialStore { path, append_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every credential in the file
    pub async fn load(&self) -> Result<Vec<Credential>> {
        let content = fs::read_to_string(&self.path).await
            .map_err(|e| anyhow!("Failed to read credentials file {}: {}", self.path.display(), e))?;
        Ok(parse_credentials(&content))
    }

    /// Append one credential, holding an exclusive lock on the file
    pub async fn append(&self, username: &str, password: &str) -> Result<()> {
        let _guard = self.append_lock.lock().await;
        let path = self.path.clone();
        let record = format!("{} {}\n", username, password);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.lock_exclusive()?;
            let written = file.write_all(record.as_bytes()).and_then(|_| file.flush());
            let unlocked = FileExt::unlock(&file);
            written?;
            unlocked?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("Credential append task failed: {}", e))?
    }
}

/// Parse credential records, skipping blank lines and malformed records
pub fn parse_credentials(content: &str) -> Vec<Credential> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => continue,
            (Some(username), Some(password), None) => out.push(Credential {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => warn!("Skipping malformed credential record on line {}", idx + 1),
        }
    }
    out
}
