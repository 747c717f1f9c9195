use dashmap::DashMap;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};
use crate::error::{DecompressError, FetchError, StoreError};
use crate::storage::ObjectStore;
use crate::storage::codec::{Decompressor, is_compressed};
use crate::storage::retry::{RetryPolicy, retry};

/// Identity of one remote artifact. `path` is a directory-style prefix
/// (normally ending in `/`) that is concatenated with `filename`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub bucket: String,
    pub path: String,
    pub filename: String,
}

impl FetchKey {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
            filename: filename.into(),
        }
    }

    pub fn object_name(&self) -> String {
        format!("{}{}", self.path, self.filename)
    }

    /// `<root>/<path>/<filename>`. Root and `.` components of `path` are
    /// dropped; `..` or a multi-component filename is refused so the result
    /// always stays under `root`.
    pub fn local_path(&self, root: &Path) -> Result<PathBuf, FetchError> {
        let unsafe_path = || FetchError::UnsafePath { key: self.to_string() };

        let mut local = root.to_path_buf();
        for component in Path::new(&self.path).components() {
            match component {
                Component::Normal(part) => local.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => return Err(unsafe_path()),
            }
        }

        let mut filename = Path::new(&self.filename).components();
        match (filename.next(), filename.next()) {
            (Some(Component::Normal(name)), None) => local.push(name),
            _ => return Err(unsafe_path()),
        }
        Ok(local)
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.bucket, self.path, self.filename)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub downloads: u64,
}

/// On-disk cache of remote artifacts shared by every worker.
///
/// Each local file has exactly one lock. The lock is held across the
/// existence check, the download and the write, so concurrent first reads
/// of a key download once and the rest read the finished file.
pub struct FetchCache {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
    decompressor: Arc<dyn Decompressor>,
    download_policy: RetryPolicy,
    decompress_policy: RetryPolicy,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    hits: AtomicU64,
    downloads: AtomicU64,
}

impl FetchCache {
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<dyn ObjectStore>,
        decompressor: Arc<dyn Decompressor>,
    ) -> Self {
        Self {
            root: root.into(),
            store,
            decompressor,
            download_policy: RetryPolicy::download(),
            decompress_policy: RetryPolicy::decompress(),
            locks: DashMap::new(),
            hits: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
        }
    }

    pub fn with_download_policy(mut self, policy: RetryPolicy) -> Self {
        self.download_policy = policy;
        self
    }

    pub fn with_decompress_policy(mut self, policy: RetryPolicy) -> Self {
        self.decompress_policy = policy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::SeqCst),
            downloads: self.downloads.load(Ordering::SeqCst),
        }
    }

    /// Number of distinct keys that have been touched so far.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Returns the artifact's bytes, decompressed when the filename says so.
    pub async fn get(&self, key: &FetchKey) -> Result<Vec<u8>, FetchError> {
        let path = key.local_path(&self.root)?;
        let lock = self.lock_for(&path);

        let raw = {
            let _guard = lock.lock().await;
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    self.hits.fetch_add(1, Ordering::SeqCst);
                    debug!(key = %key, "cache hit");
                    bytes
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    let bytes = self.download(key).await?;
                    persist(&path, bytes.clone()).await?;
                    bytes
                }
                Err(source) => return Err(FetchError::Io { path, source }),
            }
        };

        if is_compressed(&key.filename) {
            self.decompress(key, raw).await
        } else {
            Ok(raw)
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        // entry() holds the shard lock, so two first readers get the same Arc.
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    async fn download(&self, key: &FetchKey) -> Result<Vec<u8>, FetchError> {
        let object = key.object_name();
        info!(key = %key, "not cached, downloading");

        let bytes = retry(
            &self.download_policy,
            "download",
            |e: &StoreError| e.is_transient(),
            |_| self.store.get(&key.bucket, &object),
        )
        .await
        .map_err(|source| FetchError::Download { key: key.to_string(), source })?;

        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(bytes)
    }

    async fn decompress(&self, key: &FetchKey, raw: Vec<u8>) -> Result<Vec<u8>, FetchError> {
        let raw = Arc::new(raw);
        retry(&self.decompress_policy, "decompress", |_: &DecompressError| true, |_| {
            let raw = raw.clone();
            let decompressor = self.decompressor.clone();
            async move {
                tokio::task::spawn_blocking(move || decompressor.decompress(&raw))
                    .await
                    .unwrap_or_else(|e| Err(DecompressError::Interrupted(e.to_string())))
            }
        })
        .await
        .map_err(|source| FetchError::Decompress {
            key: key.to_string(),
            attempts: self.decompress_policy.max_attempts().unwrap_or(1),
            source,
        })
    }
}

/// Writes into a sibling temp file and renames it over `path`, so readers
/// never observe a partial artifact.
async fn persist(path: &Path, bytes: Vec<u8>) -> Result<(), FetchError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), FetchError> {
        let dir = target.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let io_err = |source: std::io::Error| FetchError::Io { path: target.clone(), source };

        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&target).map_err(|e| io_err(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| FetchError::Interrupted { path: path.to_path_buf(), message: e.to_string() })?
}
