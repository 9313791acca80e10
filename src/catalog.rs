use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CatalogError;

/// Read-only access to payload fixtures and header sidecars.
///
/// Implementations must never modify fixture bytes: a base payload is
/// sent exactly as stored.
pub trait FixtureCatalog: Send + Sync {
    /// Read a fixture as raw, unparsed text.
    fn read_fixture(&self, path: &Path) -> Result<String, CatalogError>;

    /// File names (not paths) directly inside `dir`.
    ///
    /// A missing or unreadable directory yields an empty list.
    fn list_files(&self, dir: &Path) -> Vec<String>;

    fn exists(&self, path: &Path) -> bool;
}

/// Catalog backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsCatalog;

impl FsCatalog {
    pub fn new() -> Self {
        Self
    }
}

impl FixtureCatalog for FsCatalog {
    fn read_fixture(&self, path: &Path) -> Result<String, CatalogError> {
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CatalogError::NotFound {
                path: path.to_path_buf(),
            },
            _ => CatalogError::Io {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })
    }

    fn list_files(&self, dir: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Directory holding a gateway's fixtures: `<root>/<gateway>/payloads`.
pub fn payloads_dir(root: &Path, gateway: &str) -> PathBuf {
    root.join(gateway).join("payloads")
}

/// Header sidecar of a gateway: `<root>/<gateway>/headers.json`.
pub fn headers_path(root: &Path, gateway: &str) -> PathBuf {
    root.join(gateway).join("headers.json")
}
