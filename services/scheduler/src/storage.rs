//! Cluster state persistence.
//!
//! The scheduler saves its framework ID and node registry after every
//! change, so a restarted scheduler re-registers under the same framework
//! and reconciles the tasks it launched before.
//!
//! Storage is selected by URI:
//! - `file:<path>`: JSON file, replaced atomically (write temp, rename)
//! - `zk:<servers>/<chroot>`: ZooKeeper node; parsed, but no backend ships
//!   with this crate

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::registry::Nodes;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid storage: {0}")]
    InvalidUri(String),

    #[error("unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("unsupported storage: {0}")]
    Unsupported(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Where state is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    File(PathBuf),
    Zk { servers: String, chroot: String },
}

impl FromStr for StorageUri {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::InvalidUri(s.to_string());

        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::File(PathBuf::from(path)));
        }

        if let Some(rest) = s.strip_prefix("zk:") {
            let (servers, chroot) = rest.split_once('/').ok_or_else(invalid)?;
            if servers.is_empty() || chroot.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Zk {
                servers: servers.to_string(),
                chroot: format!("/{chroot}"),
            });
        }

        Err(invalid())
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Zk { servers, chroot } => write!(f, "zk:{servers}{chroot}"),
        }
    }
}

/// Everything the scheduler persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<String>,
    #[serde(default)]
    pub nodes: Nodes,
}

impl ClusterSnapshot {
    pub fn new(framework_id: Option<String>, nodes: Nodes) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            framework_id,
            nodes,
        }
    }
}

impl Default for ClusterSnapshot {
    fn default() -> Self {
        Self::new(None, Nodes::new())
    }
}

/// Snapshot store.
pub trait Storage: Send {
    /// Last saved snapshot, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<ClusterSnapshot>, StorageError>;

    fn save(&self, snapshot: &ClusterSnapshot) -> Result<(), StorageError>;
}

/// Open the storage named by `uri`.
pub fn open(uri: &StorageUri) -> Result<Box<dyn Storage>, StorageError> {
    match uri {
        StorageUri::File(path) => Ok(Box::new(FileStorage::new(path.clone()))),
        StorageUri::Zk { .. } => Err(StorageError::Unsupported(uri.to_string())),
    }
}

/// JSON file storage.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<Option<ClusterSnapshot>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file, starting fresh");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let snapshot: ClusterSnapshot = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        info!(
            path = %self.path.display(),
            framework_id = ?snapshot.framework_id,
            node_count = snapshot.nodes.len(),
            "Loaded state"
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &ClusterSnapshot) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp_path, content).map_err(|e| StorageError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;

        debug!(
            path = %self.path.display(),
            node_count = snapshot.nodes.len(),
            "Saved state"
        );
        Ok(())
    }
}

/// In-memory storage. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<ClusterSnapshot>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ClusterSnapshot) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(snapshot))),
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> Option<ClusterSnapshot> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Option<ClusterSnapshot>, StorageError> {
        let slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(slot.clone())
    }

    fn save(&self, snapshot: &ClusterSnapshot) -> Result<(), StorageError> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        *slot = Some(snapshot.clone());
        Ok(())
    }
}
