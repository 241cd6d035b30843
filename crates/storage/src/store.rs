//! Artifact Stores over OpenDAL
//!
//! One store type, three backends: a local directory tree, process memory,
//! and Azure Data Lake Storage Gen2 for `abfs://` paths. Callers stay
//! synchronous; operator futures run on a dedicated runtime.

use crate::path::object_key;
use crate::StorageError;
use opendal::layers::{RetryLayer, TimeoutLayer};
use opendal::{ErrorKind, Operator};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

const RETRY_MAX_TIMES: usize = 3;
const RETRY_MIN_DELAY: Duration = Duration::from_millis(200);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

static STORE_RUNTIME: OnceLock<Result<tokio::runtime::Runtime, String>> = OnceLock::new();

/// Byte-level access to artifacts addressed by storage path strings
pub trait ArtifactStore: Send + Sync {
    /// Read the whole artifact
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or overwrite an artifact
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Whether an artifact exists at `path`
    fn exists(&self, path: &str) -> bool;
}

/// Shared-key credentials for an ADLS Gen2 account
#[derive(Clone)]
pub struct AzureCredentials {
    pub account_key: String,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("account_key", &"<redacted>")
            .finish()
    }
}

/// Account host and filesystem named by an `abfs://` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbfsLocation {
    /// `account.dfs.core.windows.net`
    pub host: String,
    pub filesystem: String,
    /// Path inside the filesystem, without leading `/`
    pub key: String,
}

impl AbfsLocation {
    /// Parse `abfs://host/filesystem/key` or `abfs://filesystem@host/key`
    pub fn parse(path: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidPath(path.to_string());
        let rest = path
            .strip_prefix("abfss://")
            .or_else(|| path.strip_prefix("abfs://"))
            .ok_or_else(invalid)?;
        let (authority, tail) = rest.split_once('/').unwrap_or((rest, ""));

        let (host, filesystem, key) = match authority.split_once('@') {
            Some((filesystem, host)) => (host, filesystem, tail),
            None => {
                let (filesystem, key) = tail.split_once('/').unwrap_or((tail, ""));
                (authority, filesystem, key)
            }
        };
        if host.is_empty() || filesystem.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            filesystem: filesystem.to_string(),
            key: key.trim_matches('/').to_string(),
        })
    }

    /// Storage account name (first label of the host)
    pub fn account(&self) -> &str {
        self.host.split('.').next().unwrap_or(&self.host)
    }

    pub fn endpoint(&self) -> String {
        format!("https://{}", self.host)
    }
}

/// How storage paths become operator keys
#[derive(Debug, Clone)]
enum KeyLayout {
    /// Scheme stripped, remainder kept (`abfs://acct/fs/a` -> `acct/fs/a`)
    Mirrored,
    /// Paths must sit in one ADLS filesystem; the key is relative to it
    Filesystem { host: String, filesystem: String },
}

/// Artifact store backed by an OpenDAL operator
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
    layout: KeyLayout,
}

impl OpendalStore {
    /// Store that maps object paths onto a local directory tree.
    ///
    /// `abfs://account.dfs.core.windows.net/container/refined/model.bin` lands at
    /// `<root>/account.dfs.core.windows.net/container/refined/model.bin`.
    pub fn local(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = absolute(root.as_ref())?;
        let root_str = root.to_string_lossy();
        let staging = root.join(".staging");
        let builder = opendal::services::Fs::default()
            .root(&root_str)
            .atomic_write_dir(&staging.to_string_lossy());
        let op = Operator::new(builder)
            .map_err(|e| StorageError::Io(format!("init opendal fs operator: {}", e)))?
            .finish();
        info!("Creating local artifact store at {}", root.display());
        Ok(Self {
            op,
            layout: KeyLayout::Mirrored,
        })
    }

    /// In-process store for tests and dry runs
    pub fn memory() -> Result<Self, StorageError> {
        let op = Operator::new(opendal::services::Memory::default())
            .map_err(|e| StorageError::Io(format!("init opendal memory operator: {}", e)))?
            .finish();
        Ok(Self {
            op,
            layout: KeyLayout::Mirrored,
        })
    }

    /// Store for the ADLS Gen2 filesystem named by `base` (an `abfs://` path)
    pub fn azure(base: &str, credentials: &AzureCredentials) -> Result<Self, StorageError> {
        let location = AbfsLocation::parse(base)?;
        let builder = opendal::services::Azdls::default()
            .filesystem(&location.filesystem)
            .endpoint(&location.endpoint())
            .account_name(location.account())
            .account_key(&credentials.account_key);
        let op = Operator::new(builder)
            .map_err(|e| StorageError::Io(format!("init opendal azdls operator: {}", e)))?
            .layer(
                TimeoutLayer::new()
                    .with_timeout(REQUEST_TIMEOUT)
                    .with_io_timeout(REQUEST_TIMEOUT),
            )
            .layer(
                RetryLayer::new()
                    .with_jitter()
                    .with_min_delay(RETRY_MIN_DELAY)
                    .with_max_delay(RETRY_MAX_DELAY)
                    .with_max_times(RETRY_MAX_TIMES),
            )
            .finish();
        info!(
            "Creating azure artifact store for {}/{}",
            location.host, location.filesystem
        );
        Ok(Self {
            op,
            layout: KeyLayout::Filesystem {
                host: location.host,
                filesystem: location.filesystem,
            },
        })
    }

    /// Operator key backing a storage path
    pub fn key(&self, path: &str) -> Result<String, StorageError> {
        let key = match &self.layout {
            KeyLayout::Mirrored => object_key(path).to_string(),
            KeyLayout::Filesystem { host, filesystem } => {
                let location = AbfsLocation::parse(path)?;
                if &location.host != host || &location.filesystem != filesystem {
                    return Err(StorageError::InvalidPath(format!(
                        "{} is outside {}/{}",
                        path, host, filesystem
                    )));
                }
                location.key
            }
        };

        if key.is_empty()
            || Path::new(&key)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(key)
    }
}

impl ArtifactStore for OpendalStore {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key(path)?;
        let buffer = block_on(self.op.read(&key))?.map_err(|e| map_error(path, e))?;
        let bytes = buffer.to_vec();
        debug!("Read {} bytes from {}", bytes.len(), key);
        Ok(bytes)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let key = self.key(path)?;
        block_on(self.op.write(&key, bytes.to_vec()))?.map_err(|e| map_error(path, e))?;
        debug!("Wrote {} bytes to {}", bytes.len(), key);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let Ok(key) = self.key(path) else {
            return false;
        };
        matches!(block_on(self.op.stat(&key)), Ok(Ok(_)))
    }
}

fn map_error(path: &str, err: opendal::Error) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
        _ => StorageError::Io(format!("{}: {}", path, err)),
    }
}

fn absolute(root: &Path) -> Result<PathBuf, StorageError> {
    if root.is_absolute() {
        Ok(root.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}

fn store_runtime() -> Result<&'static tokio::runtime::Runtime, StorageError> {
    match STORE_RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("artifact-store")
            .enable_all()
            .build()
            .map_err(|e| format!("init tokio runtime failed: {}", e))
    }) {
        Ok(rt) => Ok(rt),
        Err(err) => Err(StorageError::Io(err.clone())),
    }
}

/// Drive an operator future to completion from synchronous code.
///
/// Must not be called from a task on another runtime; async callers go
/// through `tokio::task::block_in_place` or `spawn_blocking`.
fn block_on<F: Future>(future: F) -> Result<F::Output, StorageError> {
    Ok(store_runtime()?.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "abfs://acct.dfs.core.windows.net/testing/refined/project1/models/model.bin";

    #[test]
    fn test_local_store_maps_object_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = OpendalStore::local(dir.path()).unwrap();
        store.write(MODEL, b"weights").unwrap();

        let expected = dir
            .path()
            .join("acct.dfs.core.windows.net/testing/refined/project1/models/model.bin");
        assert!(expected.exists());
        assert!(store.exists(MODEL));
        assert_eq!(store.read(MODEL).unwrap(), b"weights");
    }

    #[test]
    fn test_local_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = OpendalStore::local(dir.path()).unwrap();
        store.write(MODEL, b"v1").unwrap();
        store.write(MODEL, b"v2").unwrap();
        assert_eq!(store.read(MODEL).unwrap(), b"v2");
    }

    #[test]
    fn test_local_store_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = OpendalStore::local(dir.path()).unwrap();
        assert!(!store.exists("abfs://acct/none.bin"));
        assert!(matches!(
            store.read("abfs://acct/none.bin"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_rejects_parent_traversal() {
        let store = OpendalStore::memory().unwrap();
        assert!(matches!(
            store.key("abfs://acct/../../etc/passwd"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            store.write("abfs://acct/../x.bin", b"x"),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_memory_store() {
        let store = OpendalStore::memory().unwrap();
        assert!(!store.exists(MODEL));
        store.write(MODEL, b"abc").unwrap();
        assert!(store.exists(MODEL));
        assert_eq!(store.read(MODEL).unwrap(), b"abc");
    }

    #[test]
    fn test_memory_stores_are_independent() {
        let a = OpendalStore::memory().unwrap();
        let b = OpendalStore::memory().unwrap();
        a.write(MODEL, b"abc").unwrap();
        assert!(!b.exists(MODEL));
    }

    #[test]
    fn test_parse_abfs_host_first() {
        let location = AbfsLocation::parse(MODEL).unwrap();
        assert_eq!(location.host, "acct.dfs.core.windows.net");
        assert_eq!(location.account(), "acct");
        assert_eq!(location.filesystem, "testing");
        assert_eq!(location.key, "refined/project1/models/model.bin");
        assert_eq!(location.endpoint(), "https://acct.dfs.core.windows.net");
    }

    #[test]
    fn test_parse_abfs_filesystem_at_host() {
        let location =
            AbfsLocation::parse("abfss://testing@acct.dfs.core.windows.net/input/readings.xlsx")
                .unwrap();
        assert_eq!(location.host, "acct.dfs.core.windows.net");
        assert_eq!(location.filesystem, "testing");
        assert_eq!(location.key, "input/readings.xlsx");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(AbfsLocation::parse("s3://bucket/key").is_err());
        assert!(AbfsLocation::parse("abfs://acct.dfs.core.windows.net").is_err());
    }

    #[test]
    fn test_azure_keys_relative_to_filesystem() {
        let credentials = AzureCredentials {
            account_key: "a2V5".to_string(),
        };
        let store =
            OpendalStore::azure("abfs://acct.dfs.core.windows.net/testing", &credentials).unwrap();
        assert_eq!(store.key(MODEL).unwrap(), "refined/project1/models/model.bin");
        assert!(matches!(
            store.key("abfs://acct.dfs.core.windows.net/other/model.bin"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(!format!("{:?}", credentials).contains("a2V5"));
    }
}
