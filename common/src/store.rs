//! # Endpoint Store
//!
//! Persists the last endpoint that accepted a connection so the next process
//! can try it before sweeping the subnet.
//!
//! Only the address is stored, under the single key `server_ip`; the port is
//! supplied by the running configuration when the endpoint is loaded.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::endpoint::Endpoint;

const STORE_FILE: &str = "endpoint.toml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("endpoint store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("endpoint store {path} is corrupt: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to encode endpoint store: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("no data directory available on this platform")]
    NoDataDir,
}

/// Durable home of the last-known-good endpoint.
pub trait EndpointStore: Send + Sync {
    fn load(&self) -> Result<Option<Endpoint>, StoreError>;
    fn save(&self, endpoint: &Endpoint) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Persisted {
    server_ip: Option<String>,
}

/// TOML file backend.
#[derive(Debug, Clone)]
pub struct FileEndpointStore {
    path: PathBuf,
    port: u16,
}

impl FileEndpointStore {
    pub fn new(path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            path: path.into(),
            port,
        }
    }

    /// Store file inside the platform data directory.
    pub fn in_data_dir(port: u16) -> Result<Self, StoreError> {
        let dir: PathBuf = config::default_data_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self::new(dir.join(STORE_FILE), port))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl EndpointStore for FileEndpointStore {
    fn load(&self) -> Result<Option<Endpoint>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content: String = std::fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        let persisted: Persisted = toml::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        Ok(persisted
            .server_ip
            .map(|ip| Endpoint::new(ip, self.port))
            .filter(|ep| !ep.is_empty()))
    }

    fn save(&self, endpoint: &Endpoint) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let persisted = Persisted {
            server_ip: Some(endpoint.address().to_string()),
        };
        let content: String = toml::to_string(&persisted)?;
        std::fs::write(&self.path, content).map_err(|e| self.io_err(e))
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

/// In-process backend, forgets everything on exit.
#[derive(Debug, Default)]
pub struct MemoryEndpointStore {
    slot: Mutex<Option<Endpoint>>,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(endpoint: Endpoint) -> Self {
        Self {
            slot: Mutex::new(Some(endpoint)),
        }
    }
}

impl EndpointStore for MemoryEndpointStore {
    fn load(&self) -> Result<Option<Endpoint>, StoreError> {
        Ok(self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, endpoint: &Endpoint) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(endpoint.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}
