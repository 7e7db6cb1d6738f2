//! API key storage.
//!
//! The key lives in one JSON file scoped to the user profile. Only the
//! initiator and the coordinator read it; renderers never see it.

use std::fmt;
use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Storage key the credential is saved under.
pub const CREDENTIAL_KEY: &str = "geminiApiKey";

/// The model API key. `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }

    /// First and last four characters, for display.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable key/value access to the credential.
pub trait CredentialStore: Send + Sync {
    fn read(&self) -> Result<Option<Credential>, StoreError>;
    fn write(&self, credential: &Credential) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEntries {
    #[serde(rename = "geminiApiKey", default, skip_serializing_if = "Option::is_none")]
    key: Option<Credential>,
}

/// Credential persisted as a small JSON document on disk.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/page-tour/storage.json`, or the working directory when
    /// the platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("page-tour"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("storage.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoredEntries, StoreError> {
        if !self.path.exists() {
            return Ok(StoredEntries::default());
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl CredentialStore for FileCredentialStore {
    fn read(&self) -> Result<Option<Credential>, StoreError> {
        let entries = self.load()?;
        Ok(entries.key.filter(|c| !c.is_blank()))
    }

    fn write(&self, credential: &Credential) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;

        let entries = StoredEntries {
            key: Some(credential.clone()),
        };
        serde_json::to_writer_pretty(file, &entries)?;
        debug!(path = %self.path.display(), "saved {}", CREDENTIAL_KEY);
        Ok(())
    }
}

/// Process-local store, used by tests and mock runs.
#[derive(Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn with(credential: Credential) -> Self {
        Self {
            value: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read(&self) -> Result<Option<Credential>, StoreError> {
        let guard = self.value.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    fn write(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut guard = self.value.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(credential.clone());
        Ok(())
    }
}
