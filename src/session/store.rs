//! Durable credential storage.
//!
//! Three string values survive a restart: the access token, the refresh
//! token and the access-token expiry as epoch milliseconds.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use crate::cache::mutex_lock;

const SOURCE: &str = "session::store";

pub const TOKEN_KEY: &str = "turnover_token";
pub const REFRESH_TOKEN_KEY: &str = "turnover_refresh_token";
pub const TOKEN_EXPIRY_KEY: &str = "turnover_token_expiry";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential file {path} is malformed: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Key-value storage for credential strings.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// The persisted token set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
}

impl Credentials {
    /// Both tokens, or `None` when either is missing. A missing or
    /// unparsable expiry reads as `0`, i.e. long expired.
    pub fn load(store: &dyn CredentialStore) -> Result<Option<Self>, StoreError> {
        let access_token = store.get(TOKEN_KEY)?;
        let refresh_token = store.get(REFRESH_TOKEN_KEY)?;
        let (Some(access_token), Some(refresh_token)) = (access_token, refresh_token) else {
            return Ok(None);
        };
        Ok(Some(Self {
            access_token,
            refresh_token,
            expires_at: load_expiry(store)?,
        }))
    }

    pub fn save(&self, store: &dyn CredentialStore) -> Result<(), StoreError> {
        store.set(TOKEN_KEY, &self.access_token)?;
        store.set(REFRESH_TOKEN_KEY, &self.refresh_token)?;
        store.set(TOKEN_EXPIRY_KEY, &self.expires_at.to_string())
    }

    pub fn clear(store: &dyn CredentialStore) -> Result<(), StoreError> {
        store.remove(TOKEN_KEY)?;
        store.remove(REFRESH_TOKEN_KEY)?;
        store.remove(TOKEN_EXPIRY_KEY)
    }
}

pub fn load_expiry(store: &dyn CredentialStore) -> Result<i64, StoreError> {
    Ok(store
        .get(TOKEN_EXPIRY_KEY)?
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(0))
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(mutex_lock(&self.values, SOURCE, "memory.get").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        mutex_lock(&self.values, SOURCE, "memory.set").insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        mutex_lock(&self.values, SOURCE, "memory.remove").remove(key);
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Credentials kept as a flat JSON object in a single file, readable only by
/// the owner on Unix.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&raw).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if values.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(err) if err.kind() != ErrorKind::NotFound => Err(io_err(err)),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_vec_pretty(values).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, body).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }

        debug!(path = %self.path.display(), keys = values.len(), "credentials written");
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _io = mutex_lock(&self.io, SOURCE, "file.get");
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _io = mutex_lock(&self.io, SOURCE, "file.set");
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _io = mutex_lock(&self.io, SOURCE, "file.remove");
        let mut values = self.read_all()?;
        if values.remove(key).is_none() {
            return Ok(());
        }
        self.write_all(&values)
    }
}
