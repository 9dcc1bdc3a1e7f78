//! Registry persistence.
//!
//! The whole [`Registry`] is stored as one versioned YAML document. Parsing goes through
//! `serde_path_to_error` so a schema mismatch reports the path of the offending field (for
//! example `registry.statuses[3].state`) instead of a bare serde message.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::constants::SNAPSHOT_VERSION;
use crate::registry::Registry;
use crate::{RegistryError, RegistryResult};

/// Loads and saves whole registries.
pub trait RegistryStore: Send + Sync {
    /// Loads the stored registry, or `None` if nothing has been stored yet.
    fn load(&self) -> RegistryResult<Option<Registry>>;

    fn save(&self, registry: &Registry) -> RegistryResult<()>;

    /// Loads the stored registry, or an empty one if nothing has been stored yet.
    fn load_or_default(&self) -> RegistryResult<Registry> {
        Ok(self.load()?.unwrap_or_default())
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    registry: &'a Registry,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotIn {
    version: u32,
    registry: Registry,
}

/// Parses a snapshot document.
///
/// # Errors
///
/// Returns [`RegistryError::SnapshotParse`] with the failing path if the YAML does not match
/// the snapshot schema, or if it was written by an unsupported format version.
pub fn parse_snapshot(yaml_text: &str) -> RegistryResult<Registry> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    let snapshot: SnapshotIn = match serde_path_to_error::deserialize(deserializer) {
        Ok(parsed) => parsed,
        Err(err) => {
            let path = err.path().to_string();
            let path = if path.is_empty() || path == "." {
                "<root>".to_string()
            } else {
                path
            };
            return Err(RegistryError::SnapshotParse {
                path,
                message: err.into_inner().to_string(),
            });
        }
    };

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(RegistryError::SnapshotParse {
            path: "version".into(),
            message: format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            ),
        });
    }
    Ok(snapshot.registry)
}

/// Renders a registry as a snapshot document.
///
/// # Errors
///
/// Returns [`RegistryError::SnapshotRender`] if serialization fails.
pub fn render_snapshot(registry: &Registry) -> RegistryResult<String> {
    serde_yaml::to_string(&SnapshotOut {
        version: SNAPSHOT_VERSION,
        registry,
    })
    .map_err(RegistryError::SnapshotRender)
}

// ============================================================================
// Stores
// ============================================================================

/// Stores the registry in a single YAML file.
#[derive(Clone, Debug)]
pub struct YamlFileStore {
    path: PathBuf,
}

impl YamlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RegistryStore for YamlFileStore {
    fn load(&self) -> RegistryResult<Option<Registry>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(RegistryError::SnapshotRead(err)),
        };
        let registry = parse_snapshot(&text)?;
        tracing::debug!(path = %self.path.display(), "registry snapshot loaded");
        Ok(Some(registry))
    }

    /// Writes the snapshot to a sibling temporary file and renames it into place, so readers
    /// never observe a half-written document.
    fn save(&self, registry: &Registry) -> RegistryResult<()> {
        let text = render_snapshot(registry)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(RegistryError::SnapshotWrite)?;
        }
        let tmp = self.temp_path();
        fs::write(&tmp, text).map_err(RegistryError::SnapshotWrite)?;
        fs::rename(&tmp, &self.path).map_err(RegistryError::SnapshotWrite)?;
        tracing::debug!(path = %self.path.display(), "registry snapshot saved");
        Ok(())
    }
}

/// Keeps the registry in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stored: Mutex<Option<Registry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> RegistryResult<Option<Registry>> {
        Ok(self
            .stored
            .lock()
            .map_err(|_| RegistryError::LockPoisoned)?
            .clone())
    }

    fn save(&self, registry: &Registry) -> RegistryResult<()> {
        *self.stored.lock().map_err(|_| RegistryError::LockPoisoned)? = Some(registry.clone());
        Ok(())
    }
}
