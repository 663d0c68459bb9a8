/// Error kinds surfaced by the store.
///
/// Callers branch on these: a checksum mismatch is retryable by the
/// fail-over reader, a missing version is not, and raw I/O failures carry the
/// operation and path that failed.
use std::io;

use checksum::ChecksumError;
use thiserror::Error;

use crate::Version;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid options or storage location. Fatal to `Store::open`.
    #[error("configuration error: {0}")]
    Config(String),

    /// The key cannot be mapped to a storage directory.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No version exists, or none matches the selector.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write was pinned to a time that already names a version.
    #[error("version {0} already exists")]
    AlreadyExists(String),

    /// The recomputed digest differs from the stored sidecar.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Data file that failed verification.
        path: String,
        /// Hex digest read from the sidecar.
        expected: String,
        /// Hex digest recomputed from the data.
        actual: String,
    },

    /// The fail-over reader tried every version and none verified.
    #[error("no valid version found after {} attempt(s)", .0.len())]
    NoValidVersion(Vec<Attempt>),

    /// API misuse, e.g. writing to a committed writer.
    #[error("usage error: {0}")]
    Usage(String),

    /// An I/O failure from the storage directory.
    #[error("{op} {path}: {source}")]
    Io {
        /// What was being done.
        op: &'static str,
        /// Where.
        path: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

/// One failed version visited by the fail-over reader.
#[derive(Debug)]
pub struct Attempt {
    /// The version that was tried.
    pub version: Version,
    /// Why it was rejected.
    pub error: StoreError,
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Recovers a `StoreError` that travelled through an `io::Error` (as
    /// returned by [`Reader`](crate::Reader)'s `Read` impl or
    /// [`Writer`](crate::Writer)'s `Write` impl). Any other I/O error is
    /// wrapped with `op` and `path` as context.
    pub fn from_io(err: io::Error, op: &'static str, path: &str) -> Self {
        if !err.get_ref().map_or(false, |inner| inner.is::<StoreError>()) {
            return StoreError::io(op, path, err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<StoreError>()) {
            Some(Ok(store_err)) => *store_err,
            _ => StoreError::io(op, path, io::Error::from(kind)),
        }
    }

    /// Wraps the error so it can be returned from `Read`/`Write` impls.
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match &self {
            StoreError::NotFound(_) => io::ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            StoreError::ChecksumMismatch { .. } | StoreError::NoValidVersion(_) => {
                io::ErrorKind::InvalidData
            }
            StoreError::Io { source, .. } => source.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, self)
    }

    /// `true` for missing versions or keys.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// `true` when stored data failed checksum verification.
    #[must_use]
    pub fn is_verification(&self) -> bool {
        matches!(self, StoreError::ChecksumMismatch { .. })
    }

    /// Versions tried by the fail-over reader; empty for other errors.
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            StoreError::NoValidVersion(attempts) => attempts,
            _ => &[],
        }
    }
}

impl From<ChecksumError> for StoreError {
    fn from(err: ChecksumError) -> Self {
        StoreError::Config(err.to_string())
    }
}

/// Shorthand used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
