//! # Store - Strata Versioned File Store
//!
//! Keeps an append-only history of immutable *versions* for each key, every
//! version protected by a checksum sidecar, and reads back the newest version
//! that still verifies.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                     STORE                        │
//! │                                                  │
//! │ write.rs  → allocate name → data file + Sum      │
//! │              commit: fsync → sidecar.tmp → rename│
//! │                                                  │
//! │ read.rs   → list versions → stream + re-hash     │
//! │              EOF/close: compare with sidecar     │
//! │                                                  │
//! │ recovery.rs → newest → older → ... until one     │
//! │               verifies                           │
//! └──────────────────────────────────────────────────┘
//!        |                        |
//!        v                        v
//!   dir.rs (FsDir)          memdir.rs (MemDir, tests)
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                             |
//! |--------------|-----------------------------------------------------|
//! | `lib.rs`     | `Store` struct, `open`, listing, deletion, metrics  |
//! | [`version`]  | file naming, parsing, chronological ordering        |
//! | [`write`]    | `Writer`, commit/abort protocol                     |
//! | [`read`]     | `Reader`, streaming verification                    |
//! | [`recovery`] | fail-over to the newest verifiable version          |
//! | [`options`]  | store/writer options, version selection             |
//! | [`metrics`]  | shared counters and snapshots                       |
//! | [`dir`]      | storage directory trait and filesystem backend      |
//!
//! ## On-disk Layout
//!
//! ```text
//! <root>/<key>/<nanos:020>              data
//! <root>/<key>/<nanos:020>.<algorithm>  checksum sidecar
//! ```
//!
//! A data file without a sidecar is invisible: it is either being written or
//! was left behind by a crash.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::io::Write;
//! use store::{Store, StoreOptions};
//!
//! let store = Store::open_path("data", StoreOptions::new()).unwrap();
//! let mut w = store.writer("config").unwrap();
//! w.write_all(b"hello").unwrap();
//! w.commit().unwrap();
//!
//! let (bytes, version) = store.read_latest_bytes("config").unwrap();
//! assert_eq!(bytes, b"hello");
//! println!("read {} bytes written at {:?}", version.size, version.time);
//! ```
mod dir;
mod error;
mod memdir;
mod metrics;
mod options;
mod read;
mod recovery;
mod version;
mod write;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use checksum::Algorithm;
use tracing::{debug, info};

pub use dir::{Dir, DirEntry, FileSink, FsDir};
pub use error::{Attempt, Result, StoreError};
pub use memdir::MemDir;
pub use metrics::{Metrics, ReadMetrics, WriteMetrics};
use metrics::MetricsRecorder;
pub use options::{StoreOptions, VersionSelector, WriterOptions};
pub use read::Reader;
pub use version::Version;
use version::StoredVersion;
pub use write::Writer;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 255;

/// A collection of versioned states rooted in one directory.
///
/// Each key maps to a sub-directory holding that key's versions. A `Store`
/// is `Send + Sync`; readers may be opened concurrently, and name allocation
/// for writers is serialized internally so two writers created through the
/// same store never collide.
pub struct Store {
    pub(crate) dir: Arc<dyn Dir>,
    pub(crate) algorithm: Arc<dyn Algorithm>,
    /// If `false`, every digest comparison is treated as a match.
    pub(crate) verify: bool,
    pub(crate) metrics: Arc<MetricsRecorder>,
    /// Last timestamp handed to an automatically timed writer, per key.
    pub(crate) allocated: Mutex<HashMap<String, u64>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dir", &self.dir)
            .field("algorithm", &self.algorithm.name())
            .field("verify", &self.verify)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl Store {
    /// Opens a store backed by `dir`.
    ///
    /// # Steps
    ///
    /// 1. Validate `options` (algorithm name, algorithm chosen at most once).
    /// 2. Check that `dir` exists; create it unless
    ///    [`StoreOptions::fail_when_missing_dir`] was set.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] for invalid options, a missing directory with
    /// `fail_when_missing_dir`, or a path that is not a directory.
    pub fn open<D: Dir + 'static>(dir: D, options: StoreOptions) -> Result<Self> {
        Self::open_shared(Arc::new(dir), options)
    }

    /// Opens a store in a filesystem directory.
    pub fn open_path<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(StoreError::Config(
                "store path is empty: must be a valid directory path".to_string(),
            ));
        }
        Self::open(FsDir::new(path), options)
    }

    /// Opens a store backed by an already shared directory.
    pub fn open_shared(dir: Arc<dyn Dir>, options: StoreOptions) -> Result<Self> {
        let config = options.validate()?;
        let location = dir.display_path("");

        let exists = dir.exists().map_err(|e| match e.kind() {
            io::ErrorKind::InvalidInput => StoreError::Config(e.to_string()),
            _ => StoreError::io("stat", location.clone(), e),
        })?;
        if !exists {
            if config.fail_when_missing_dir {
                return Err(StoreError::Config(format!(
                    "store directory {} does not exist",
                    location
                )));
            }
            dir.create()
                .map_err(|e| StoreError::io("mkdir", location.clone(), e))?;
            info!(dir = %location, "created store directory");
        }

        info!(
            dir = %location,
            algorithm = config.algorithm.name(),
            verify = config.verify,
            "store opened"
        );

        Ok(Self {
            dir,
            algorithm: config.algorithm,
            verify: config.verify,
            metrics: Arc::new(MetricsRecorder::default()),
            allocated: Mutex::new(HashMap::new()),
        })
    }

    /// The algorithm used for new versions.
    #[must_use]
    pub fn algorithm(&self) -> &dyn Algorithm {
        &*self.algorithm
    }

    /// `false` when the store was opened with
    /// [`StoreOptions::no_integrity_check`].
    #[must_use]
    pub fn verifies_checksums(&self) -> bool {
        self.verify
    }

    /// Committed versions of `key`, oldest first. Empty if the key has never
    /// been written.
    pub fn versions(&self, key: &str) -> Result<Vec<Version>> {
        let dir = self.key_dir(key)?;
        Ok(self
            .stored_versions(&*dir)?
            .into_iter()
            .map(|v| v.version)
            .collect())
    }

    /// Deletes the version of `key` created at `time`: its sidecars first
    /// (which hides it from readers), then the data file.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no committed version has that time.
    pub fn delete_version(&self, key: &str, time: SystemTime) -> Result<()> {
        let dir = self.key_dir(key)?;
        let missing = || StoreError::NotFound(format!("version {:?} of key {:?}", time, key));

        let nanos = version::to_nanos(time).map_err(|_| missing())?;
        let entries = match self.list_entries(&*dir)? {
            Some(entries) => entries,
            None => return Err(missing()),
        };
        let stored = version::list(&entries, self.algorithm.name())
            .into_iter()
            .find(|v| v.nanos == nanos)
            .ok_or_else(missing)?;

        let prefix = format!("{}.", stored.data_name);
        for entry in entries.iter().filter(|e| e.name.starts_with(&prefix)) {
            remove_if_present(&*dir, &entry.name)?;
        }
        remove_if_present(&*dir, &stored.data_name)?;

        debug!(key, version = nanos, "version deleted");
        Ok(())
    }

    /// Snapshot of the store's counters.
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    pub(crate) fn key_dir(&self, key: &str) -> Result<Arc<dyn Dir>> {
        validate_key(key)?;
        Ok(self.dir.child(key))
    }

    /// Lists `dir`, or `None` when it does not exist.
    pub(crate) fn list_entries(&self, dir: &dyn Dir) -> Result<Option<Vec<DirEntry>>> {
        let location = || dir.display_path("");
        let exists = dir
            .exists()
            .map_err(|e| StoreError::io("stat", location(), e))?;
        if !exists {
            return Ok(None);
        }
        dir.list()
            .map(Some)
            .map_err(|e| StoreError::io("list", location(), e))
    }

    pub(crate) fn stored_versions(&self, dir: &dyn Dir) -> Result<Vec<StoredVersion>> {
        Ok(self
            .list_entries(dir)?
            .map(|entries| version::list(&entries, self.algorithm.name()))
            .unwrap_or_default())
    }

    /// The algorithm that wrote a sidecar with extension `name`.
    pub(crate) fn resolve_algorithm(&self, name: &str) -> Result<Arc<dyn Algorithm>> {
        if name == self.algorithm.name() {
            return Ok(Arc::clone(&self.algorithm));
        }
        Ok(Arc::new(*checksum::builtin(name)?))
    }
}

/// Removes `name`, treating an already missing file as success.
pub(crate) fn remove_if_present(dir: &dyn Dir, name: &str) -> Result<()> {
    match dir.remove(name) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io("remove", dir.display_path(name), e)),
    }
}

/// Keys become directory names, so they are restricted to a portable subset.
fn validate_key(key: &str) -> Result<()> {
    let reject = |reason| StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    if key.is_empty() {
        return Err(reject("key is empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(reject("key is too long"));
    }
    if key == "." || key == ".." {
        return Err(reject("key is a relative path component"));
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err(reject("only ASCII letters, digits, '-', '_' and '.' are allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
