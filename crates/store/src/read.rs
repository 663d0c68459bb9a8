use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Instant;

use checksum::{hex, Sum};
use tracing::{debug, warn};

use crate::dir::Dir;
use crate::error::{Result, StoreError};
use crate::metrics::MetricsRecorder;
use crate::options::VersionSelector;
use crate::version::{self, StoredVersion, Version};
use crate::Store;

/// Sidecar contents that make any digest acceptable.
///
/// Lets an operator hand-edit a data file and keep it readable by writing
/// this word into its sidecar.
const ALTERED_MARKER: &[u8] = b"ALTERED";

impl Store {
    /// Opens the newest committed version of `key`.
    pub fn reader(&self, key: &str) -> Result<Reader> {
        self.reader_with(key, VersionSelector::Latest)
    }

    /// Opens the version of `key` chosen by `selector`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the key has no committed version or none
    /// matches the selected time.
    pub fn reader_with(&self, key: &str, selector: VersionSelector) -> Result<Reader> {
        self.metrics.reader_opened();
        let dir = self.key_dir(key)?;
        let versions = self.stored_versions(&*dir)?;
        let stored = select(versions, selector, key)?;
        self.open_version(dir, stored)
    }

    pub(crate) fn open_version(&self, dir: Arc<dyn Dir>, stored: StoredVersion) -> Result<Reader> {
        let algorithm = self.resolve_algorithm(&stored.algorithm)?;
        let path = dir.display_path(&stored.data_name);
        let file = dir
            .open_file(&stored.data_name)
            .map_err(|e| StoreError::io("open", path.clone(), e))?;
        debug!(path = %path, algorithm = %stored.algorithm, "reader opened");

        Ok(Reader {
            dir,
            file: Some(file),
            sum: algorithm.new_sum(),
            stored,
            verify: self.verify,
            verified: false,
            metrics: Arc::clone(&self.metrics),
        })
    }
}

fn select(
    mut versions: Vec<StoredVersion>,
    selector: VersionSelector,
    key: &str,
) -> Result<StoredVersion> {
    match selector {
        VersionSelector::Latest => versions
            .pop()
            .ok_or_else(|| StoreError::NotFound(format!("no version of key {:?}", key))),
        VersionSelector::Time(time) => {
            let missing = || StoreError::NotFound(format!("version {:?} of key {:?}", time, key));
            let nanos = version::to_nanos(time).map_err(|_| missing())?;
            versions
                .into_iter()
                .find(|v| v.nanos == nanos)
                .ok_or_else(missing)
        }
    }
}

/// Streams one committed version and checks it against its sidecar.
///
/// The digest is compared when the data reaches EOF, and again on
/// [`close`](Reader::close) if EOF was never reached. A mismatch surfaces as
/// an `io::Error` of kind `InvalidData` from `read` (recover the typed error
/// with [`StoreError::from_io`]) or as [`StoreError::ChecksumMismatch`] from
/// `close`.
pub struct Reader {
    dir: Arc<dyn Dir>,
    /// `None` after close.
    file: Option<Box<dyn Read + Send>>,
    sum: Box<dyn Sum>,
    stored: StoredVersion,
    verify: bool,
    verified: bool,
    metrics: Arc<MetricsRecorder>,
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("path", &self.path())
            .field("algorithm", &self.stored.algorithm)
            .field("version", &self.stored.version)
            .field("verified", &self.verified)
            .finish()
    }
}

impl Reader {
    #[must_use]
    pub fn version(&self) -> Version {
        self.stored.version
    }

    /// `true` once the digest has been checked and accepted.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Releases the data file and verifies whatever was read so far.
    ///
    /// Safe to call more than once; a version that already verified keeps
    /// returning `Ok`.
    pub fn close(&mut self) -> Result<()> {
        let start = Instant::now();
        self.file = None;
        let result = self.check_digest();
        self.metrics.add_read_time(start.elapsed());
        result
    }

    fn path(&self) -> String {
        self.dir.display_path(&self.stored.data_name)
    }

    fn check_digest(&mut self) -> Result<()> {
        if self.verified {
            return Ok(());
        }
        if !self.verify {
            self.verified = true;
            return Ok(());
        }

        let actual = self.sum.marshal();
        let expected = self.read_sidecar()?;
        if expected == actual {
            self.verified = true;
            return Ok(());
        }
        if is_altered_marker(&expected) {
            warn!(path = %self.path(), "sidecar marks the data as altered; accepting it");
            self.verified = true;
            return Ok(());
        }

        self.metrics.verification_failed();
        let err = StoreError::ChecksumMismatch {
            path: self.path(),
            expected: hex(&expected),
            actual: hex(&actual),
        };
        warn!(error = %err, "verification failed");
        Err(err)
    }

    fn read_sidecar(&self) -> Result<Vec<u8>> {
        let name = self.stored.sidecar_name();
        let path = self.dir.display_path(&name);
        let mut file = self
            .dir
            .open_file(&name)
            .map_err(|e| StoreError::io("open", path.clone(), e))?;
        let mut digest = Vec::new();
        file.read_to_end(&mut digest)
            .map_err(|e| StoreError::io("read", path, e))?;
        Ok(digest)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let path = self.path();
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                return Err(StoreError::Usage(format!("read after close of {}", path)).into_io())
            }
        };
        let n = match file.read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
            Err(e) => return Err(StoreError::io("read", path, e).into_io()),
        };
        if n == 0 {
            self.check_digest().map_err(StoreError::into_io)?;
            return Ok(0);
        }
        self.sum.update(&buf[..n]);
        self.metrics.add_bytes_read(n);
        Ok(n)
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = Instant::now();
        let result = self.read_inner(buf);
        self.metrics.add_read_time(start.elapsed());
        result
    }
}

/// `ALTERED`, optionally followed by one line ending.
fn is_altered_marker(sidecar: &[u8]) -> bool {
    let trimmed = sidecar
        .strip_suffix(b"\r\n")
        .or_else(|| sidecar.strip_suffix(b"\n"))
        .unwrap_or(sidecar);
    trimmed == ALTERED_MARKER
}
