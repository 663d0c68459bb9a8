/// Storage directory abstraction.
///
/// The store never touches the filesystem directly: every existence check,
/// listing, open and removal goes through [`Dir`]. [`FsDir`] is the real
/// implementation; [`MemDir`](crate::MemDir) is an in-memory fake for tests.
///
/// Only append-on-write and sequential reads are required; nothing seeks.
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file found by [`Dir::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Base name (no directory components).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// An exclusively created, append-only file.
pub trait FileSink: Write + Send {
    /// Flushes buffers and makes the written bytes durable.
    fn sync(&mut self) -> io::Result<()>;
}

/// A directory holding versions (or, at the root, one sub-directory per key).
pub trait Dir: Send + Sync + fmt::Debug {
    /// Returns `Ok(false)` when the directory does not exist.
    fn exists(&self) -> io::Result<bool>;

    /// Creates the directory (and parents) if missing.
    fn create(&self) -> io::Result<()>;

    /// Lists the regular files directly inside this directory.
    fn list(&self) -> io::Result<Vec<DirEntry>>;

    /// Creates a new file; fails with `AlreadyExists` if `name` is taken.
    fn create_file(&self, name: &str) -> io::Result<Box<dyn FileSink>>;

    /// Opens an existing file for sequential reading.
    fn open_file(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Removes a file.
    fn remove(&self, name: &str) -> io::Result<()>;

    /// Atomically renames `from` to `to`, replacing `to` if present.
    ///
    /// With `sync`, the directory itself is flushed afterwards so the rename
    /// survives a crash.
    fn rename(&self, from: &str, to: &str, sync: bool) -> io::Result<()>;

    /// Returns the sub-directory `name` (which may not exist yet).
    fn child(&self, name: &str) -> Arc<dyn Dir>;

    /// Human-readable path of `name` inside this directory, for errors and logs.
    fn display_path(&self, name: &str) -> String;
}

/// A [`Dir`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsDir {
    path: PathBuf,
}

impl FsDir {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The directory's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct FsFile {
    inner: BufWriter<File>,
}

impl Write for FsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl FileSink for FsFile {
    fn sync(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()
    }
}

impl Dir for FsDir {
    fn exists(&self) -> io::Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", self.path.display()),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.path)
    }

    fn list(&self) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            // Non-UTF-8 names can never be version files.
            if let Ok(name) = entry.file_name().into_string() {
                entries.push(DirEntry {
                    name,
                    size: meta.len(),
                });
            }
        }
        Ok(entries)
    }

    fn create_file(&self, name: &str) -> io::Result<Box<dyn FileSink>> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path.join(name))?;
        Ok(Box::new(FsFile {
            inner: BufWriter::new(file),
        }))
    }

    fn open_file(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.path.join(name))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path.join(name))
    }

    fn rename(&self, from: &str, to: &str, sync: bool) -> io::Result<()> {
        fs::rename(self.path.join(from), self.path.join(to))?;
        if !sync {
            return Ok(());
        }

        // Opening a directory fails on some platforms; that is not an error.
        if let Ok(dir) = File::open(&self.path) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    fn child(&self, name: &str) -> Arc<dyn Dir> {
        Arc::new(FsDir::new(self.path.join(name)))
    }

    fn display_path(&self, name: &str) -> String {
        self.path.join(name).display().to_string()
    }
}
