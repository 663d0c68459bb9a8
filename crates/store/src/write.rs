use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, PoisonError};
use std::time::SystemTime;

use checksum::{Algorithm, Sum};
use tracing::debug;

use crate::dir::{Dir, FileSink};
use crate::error::{Result, StoreError};
use crate::metrics::MetricsRecorder;
use crate::options::WriterOptions;
use crate::version::{self, Version, TMP_SUFFIX};
use crate::{remove_if_present, Store};

/// How many successive timestamps are tried before giving up on a name.
const MAX_NAME_ATTEMPTS: usize = 8;

impl Store {
    /// Opens a writer for a new version of `key`, timed "now".
    pub fn writer(&self, key: &str) -> Result<Writer> {
        self.writer_with(key, WriterOptions::default())
    }

    /// Opens a writer for a new version of `key`.
    ///
    /// The data file is created immediately but stays invisible to readers
    /// until [`Writer::commit`] writes its checksum sidecar.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidKey`] if `key` cannot be a directory name.
    /// - [`StoreError::AlreadyExists`] if [`WriterOptions::time`] names an
    ///   existing version.
    /// - [`StoreError::Io`] if the key directory or data file cannot be
    ///   created.
    pub fn writer_with(&self, key: &str, options: WriterOptions) -> Result<Writer> {
        self.metrics.writer_opened();
        let dir = self.key_dir(key)?;
        let exists = dir
            .exists()
            .map_err(|e| StoreError::io("stat", dir.display_path(""), e))?;
        if !exists {
            dir.create()
                .map_err(|e| StoreError::io("mkdir", dir.display_path(""), e))?;
            debug!(key, "created key directory");
        }

        let (nanos, file) = match options.time {
            Some(time) => self.create_pinned(&*dir, time)?,
            None => self.create_next(key, &*dir)?,
        };
        let data_name = version::data_name(nanos);
        debug!(key, version = nanos, sync = options.sync, "writer opened");

        Ok(Writer {
            dir,
            file: Some(file),
            sum: self.algorithm.new_sum(),
            algorithm: Arc::clone(&self.algorithm),
            data_name,
            version: Version {
                time: version::from_nanos(nanos),
                size: 0,
            },
            sync: options.sync,
            state: WriterState::Open,
            metrics: Arc::clone(&self.metrics),
        })
    }

    fn create_pinned(&self, dir: &dyn Dir, time: SystemTime) -> Result<(u64, Box<dyn FileSink>)> {
        let nanos = version::to_nanos(time)?;
        let name = version::data_name(nanos);
        match dir.create_file(&name) {
            Ok(file) => Ok((nanos, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(dir.display_path(&name)))
            }
            Err(e) => Err(StoreError::io("create", dir.display_path(&name), e)),
        }
    }

    /// Picks a name strictly newer than every data file of the key and every
    /// name this store has handed out, then claims it with an exclusive create.
    fn create_next(&self, key: &str, dir: &dyn Dir) -> Result<(u64, Box<dyn FileSink>)> {
        let entries = dir
            .list()
            .map_err(|e| StoreError::io("list", dir.display_path(""), e))?;

        let mut allocated = self
            .allocated
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let floor = version::latest_data_nanos(&entries)
            .max(allocated.get(key).copied())
            .map_or(0, |n| n.saturating_add(1));
        let mut nanos = version::to_nanos(SystemTime::now())?.max(floor);

        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = version::data_name(nanos);
            match dir.create_file(&name) {
                Ok(file) => {
                    allocated.insert(key.to_string(), nanos);
                    return Ok((nanos, file));
                }
                // another process got there first
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    nanos = nanos.checked_add(1).ok_or_else(|| {
                        StoreError::Usage("version time is too far in the future".to_string())
                    })?;
                }
                Err(e) => return Err(StoreError::io("create", dir.display_path(&name), e)),
            }
        }
        Err(StoreError::AlreadyExists(
            dir.display_path(&version::data_name(nanos)),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Committed,
    Aborted,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterState::Open => f.write_str("open"),
            WriterState::Committed => f.write_str("committed"),
            WriterState::Aborted => f.write_str("aborted"),
        }
    }
}

/// Streams one new version to disk.
///
/// Bytes go to the data file and the running checksum at the same time.
/// [`commit`](Writer::commit) makes the version visible, in this order:
///
/// 1. flush + fsync the data file
/// 2. write the digest to `<name>.<alg>.tmp` and fsync it
/// 3. rename the temp file to `<name>.<alg>` (fsyncs the directory)
///
/// A crash at any point before step 3 leaves a data file with no sidecar,
/// which readers never see.
///
/// Any write or commit failure aborts the writer: the data file is removed
/// and every later call returns a usage error. Dropping an open writer also
/// aborts it.
pub struct Writer {
    dir: Arc<dyn Dir>,
    /// `None` once committed or aborted.
    file: Option<Box<dyn FileSink>>,
    sum: Box<dyn Sum>,
    algorithm: Arc<dyn Algorithm>,
    data_name: String,
    version: Version,
    sync: bool,
    state: WriterState,
    metrics: Arc<MetricsRecorder>,
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("path", &self.dir.display_path(&self.data_name))
            .field("algorithm", &self.algorithm.name())
            .field("version", &self.version)
            .field("state", &self.state)
            .finish()
    }
}

impl Writer {
    /// The version being written; `size` grows with every write.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Makes the version visible and returns it.
    ///
    /// On error the writer is aborted and the partial data removed.
    pub fn commit(&mut self) -> Result<Version> {
        self.ensure_open("commit")?;
        match self.finish() {
            Ok(()) => {
                self.state = WriterState::Committed;
                self.metrics.committed();
                debug!(
                    path = %self.dir.display_path(&self.data_name),
                    size = self.version.size,
                    "version committed"
                );
                Ok(self.version)
            }
            Err(e) => {
                // the commit error is the one worth reporting
                let _ = self.discard();
                Err(e)
            }
        }
    }

    /// Discards the version. No file written by this writer remains.
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_open("abort")?;
        self.discard()
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.state == WriterState::Open {
            Ok(())
        } else {
            Err(StoreError::Usage(format!(
                "{} called on {} writer for {}",
                op,
                self.state,
                self.dir.display_path(&self.data_name)
            )))
        }
    }

    fn finish(&mut self) -> Result<()> {
        let data_path = self.dir.display_path(&self.data_name);
        let mut file = self
            .file
            .take()
            .ok_or_else(|| StoreError::Usage(format!("{} has no open file", data_path)))?;
        file.flush()
            .map_err(|e| StoreError::io("flush", data_path.clone(), e))?;
        if self.sync {
            file.sync()
                .map_err(|e| StoreError::io("sync", data_path.clone(), e))?;
        }
        drop(file);

        let sidecar = version::sidecar_name(&self.data_name, self.algorithm.name());
        let tmp = format!("{}{}", sidecar, TMP_SUFFIX);
        let tmp_path = self.dir.display_path(&tmp);

        // left behind by an interrupted commit of the same name
        remove_if_present(&*self.dir, &tmp)?;

        let mut out = self
            .dir
            .create_file(&tmp)
            .map_err(|e| StoreError::io("create", tmp_path.clone(), e))?;
        out.write_all(&self.sum.marshal())
            .map_err(|e| StoreError::io("write", tmp_path.clone(), e))?;
        out.flush()
            .map_err(|e| StoreError::io("flush", tmp_path.clone(), e))?;
        if self.sync {
            out.sync()
                .map_err(|e| StoreError::io("sync", tmp_path.clone(), e))?;
        }
        drop(out);

        self.dir
            .rename(&tmp, &sidecar, self.sync)
            .map_err(|e| StoreError::io("rename", tmp_path, e))
    }

    /// Closes and removes the data file and any temp sidecar.
    fn discard(&mut self) -> Result<()> {
        self.file = None;
        self.state = WriterState::Aborted;
        self.metrics.aborted();

        let tmp = format!(
            "{}{}",
            version::sidecar_name(&self.data_name, self.algorithm.name()),
            TMP_SUFFIX
        );
        let tmp_result = remove_if_present(&*self.dir, &tmp);
        let data_result = remove_if_present(&*self.dir, &self.data_name);
        debug!(path = %self.dir.display_path(&self.data_name), "version aborted");
        tmp_result.and(data_result)
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open("write").map_err(StoreError::into_io)?;
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(StoreError::Usage("writer has no open file".into()).into_io()),
        };
        match file.write(buf) {
            Ok(n) => {
                self.sum.update(&buf[..n]);
                self.version.size += n as u64;
                self.metrics.add_bytes_written(n);
                Ok(n)
            }
            // retried by write_all; not a failure
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                let err = StoreError::io("write", self.dir.display_path(&self.data_name), e);
                let _ = self.discard();
                Err(err.into_io())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open("flush").map_err(StoreError::into_io)?;
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if self.state == WriterState::Open {
            debug!(path = %self.dir.display_path(&self.data_name), "writer dropped while open");
            let _ = self.discard();
        }
    }
}
