//! Store locations and opening of chunked-array stores
//!
//! A location is either a local path or an `http(s)://` URL. Locations ending in
//! `.zip` are treated as zip archives holding a Zarr hierarchy, which is how the
//! ClimateHack data is published. Remote archives are read with byte-range
//! requests through the zip adapter, so only the central directory and the
//! requested chunks are transferred.

use crate::errors::{Result, RuZaVisError};
use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::{
    ListableStorage, ListableStorageTraits, ReadableStorage, ReadableStorageTraits, StoreKey,
    StorePrefix,
};
use zarrs_http::HTTPStore;
use zarrs_zip::ZipStorageAdapter;

/// Where a store or a single file lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Local filesystem path
    Local(PathBuf),
    /// Remote `http://` or `https://` URL
    Remote(String),
}

impl StoreLocation {
    /// Parse a location string
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RuZaVisError::InvalidLocation {
                location: s.to_string(),
                message: "location is empty".to_string(),
            });
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = trimmed.trim_end_matches('/');
            if url.split("://").nth(1).map_or(true, str::is_empty) {
                return Err(RuZaVisError::InvalidLocation {
                    location: s.to_string(),
                    message: "URL has no host".to_string(),
                });
            }
            Ok(StoreLocation::Remote(url.to_string()))
        } else if trimmed.contains("://") {
            Err(RuZaVisError::InvalidLocation {
                location: s.to_string(),
                message: "only local paths and http(s) URLs are supported".to_string(),
            })
        } else {
            Ok(StoreLocation::Local(PathBuf::from(trimmed)))
        }
    }

    /// Whether the location names a zip archive
    #[must_use]
    pub fn is_archive(&self) -> bool {
        match self {
            StoreLocation::Local(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("zip")),
            StoreLocation::Remote(url) => url.to_ascii_lowercase().ends_with(".zip"),
        }
    }

    /// Whether the location is remote
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, StoreLocation::Remote(_))
    }

    /// Split a remote URL into its parent URL and final path segment
    fn split_remote(url: &str) -> Result<(&str, &str)> {
        let scheme_end = url.find("://").map_or(0, |i| i + 3);
        match url[scheme_end..].rfind('/') {
            Some(i) if i + scheme_end + 1 < url.len() => {
                let split = scheme_end + i;
                Ok((&url[..split], &url[split + 1..]))
            }
            _ => Err(RuZaVisError::InvalidLocation {
                location: url.to_string(),
                message: "URL has no file name".to_string(),
            }),
        }
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Local(path) => write!(f, "{}", path.display()),
            StoreLocation::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// An opened store: readable storage plus a listable view when the backend supports it
#[derive(Clone)]
pub struct StoreHandle {
    location: StoreLocation,
    readable: ReadableStorage,
    listable: Option<ListableStorage>,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("location", &self.location)
            .field("listable", &self.listable.is_some())
            .finish()
    }
}

impl StoreHandle {
    /// The location this store was opened from
    #[must_use]
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Readable storage for opening arrays
    #[must_use]
    pub fn readable(&self) -> ReadableStorage {
        self.readable.clone()
    }

    /// Whether the store can list its keys
    #[must_use]
    pub fn is_listable(&self) -> bool {
        self.listable.is_some()
    }

    /// Read a raw key, `None` when it does not exist
    pub fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let key = StoreKey::new(key).map_err(|e| RuZaVisError::Store(e.to_string()))?;
        Ok(self.readable.get(&key)?)
    }

    /// List the child prefixes directly under the root, without trailing slashes
    pub fn list_root_prefixes(&self) -> Result<Option<Vec<String>>> {
        let Some(listable) = &self.listable else {
            return Ok(None);
        };
        let listing = listable.list_dir(&StorePrefix::root())?;
        let names = listing
            .prefixes()
            .iter()
            .map(|p| p.as_str().trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Ok(Some(names))
    }
}

/// Open a store at the given location
///
/// Performs blocking I/O for archives (the zip central directory is read here).
pub fn open_store(location: &StoreLocation) -> Result<StoreHandle> {
    log::info!("Opening store {location}");
    let handle = match (location, location.is_archive()) {
        (StoreLocation::Local(path), false) => {
            ensure_local_exists(path)?;
            let store = Arc::new(
                FilesystemStore::new(path)
                    .map_err(|e| RuZaVisError::Store(format!("{}: {e}", path.display())))?,
            );
            StoreHandle {
                location: location.clone(),
                readable: store.clone(),
                listable: Some(store),
            }
        }
        (StoreLocation::Local(path), true) => {
            ensure_local_exists(path)?;
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| RuZaVisError::InvalidLocation {
                    location: path.display().to_string(),
                    message: "archive path has no file name".to_string(),
                })?;
            let inner = Arc::new(
                FilesystemStore::new(parent)
                    .map_err(|e| RuZaVisError::Store(format!("{}: {e}", parent.display())))?,
            );
            let store = Arc::new(zip_adapter(inner, file_name)?);
            StoreHandle {
                location: location.clone(),
                readable: store.clone(),
                listable: Some(store),
            }
        }
        (StoreLocation::Remote(url), false) => {
            let store = Arc::new(
                HTTPStore::new(url).map_err(|e| RuZaVisError::Store(format!("{url}: {e}")))?,
            );
            StoreHandle {
                location: location.clone(),
                readable: store,
                listable: None,
            }
        }
        (StoreLocation::Remote(url), true) => {
            let (base, file_name) = StoreLocation::split_remote(url)?;
            let inner = Arc::new(
                HTTPStore::new(base).map_err(|e| RuZaVisError::Store(format!("{base}: {e}")))?,
            );
            let store = Arc::new(zip_adapter(inner, file_name)?);
            StoreHandle {
                location: location.clone(),
                readable: store.clone(),
                listable: Some(store),
            }
        }
    };
    Ok(handle)
}

/// Read a whole file (parquet, JSON) from a local path or URL
pub fn read_file(location: &StoreLocation) -> Result<Bytes> {
    match location {
        StoreLocation::Local(path) => {
            ensure_local_exists(path)?;
            Ok(Bytes::from(std::fs::read(path)?))
        }
        StoreLocation::Remote(url) => {
            let (base, file_name) = StoreLocation::split_remote(url)?;
            let store =
                HTTPStore::new(base).map_err(|e| RuZaVisError::Store(format!("{base}: {e}")))?;
            let key =
                StoreKey::new(file_name).map_err(|e| RuZaVisError::Store(e.to_string()))?;
            log::info!("Fetching {url}");
            store
                .get(&key)?
                .ok_or_else(|| RuZaVisError::Store(format!("{url} not found")))
        }
    }
}

fn zip_adapter<T>(inner: Arc<T>, file_name: &str) -> Result<ZipStorageAdapter<T>>
where
    T: ReadableStorageTraits + 'static,
{
    let key = StoreKey::new(file_name).map_err(|e| RuZaVisError::Store(e.to_string()))?;
    ZipStorageAdapter::new(inner, key)
        .map_err(|e| RuZaVisError::Store(format!("cannot open archive '{file_name}': {e}")))
}

fn ensure_local_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(RuZaVisError::Store(format!(
            "path does not exist: {}",
            path.display()
        )))
    }
}
