/// In-memory [`Dir`] used to isolate tests from the filesystem.
///
/// Clones share the same backing tree, so a test can keep a handle to
/// inspect or corrupt files after handing another clone to a `Store`.
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dir::{Dir, DirEntry, FileSink};

#[derive(Debug, Default)]
struct MemFs {
    dirs: BTreeSet<String>,
    /// Full path -> contents.
    files: BTreeMap<String, Vec<u8>>,
    fail_writes: bool,
    list_calls: u64,
    dir_syncs: u64,
}

/// A shareable in-memory directory tree.
#[derive(Debug, Clone)]
pub struct MemDir {
    fs: Arc<Mutex<MemFs>>,
    path: String,
}

const ROOT: &str = "mem:";

impl Default for MemDir {
    fn default() -> Self {
        Self::new()
    }
}

impl MemDir {
    /// An existing, empty root directory.
    pub fn new() -> Self {
        let dir = Self::missing();
        dir.lock().dirs.insert(ROOT.to_string());
        dir
    }

    /// A root directory that has not been created yet.
    pub fn missing() -> Self {
        Self {
            fs: Arc::new(Mutex::new(MemFs::default())),
            path: ROOT.to_string(),
        }
    }

    /// The sub-directory `name`, as a concrete `MemDir`.
    #[must_use]
    pub fn sub(&self, name: &str) -> MemDir {
        MemDir {
            fs: Arc::clone(&self.fs),
            path: format!("{}/{}", self.path, name),
        }
    }

    /// Contents of file `name`, if present.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&self.file_key(name)).cloned()
    }

    /// Creates or overwrites file `name`. Used to simulate corruption.
    pub fn put_file(&self, name: &str, contents: &[u8]) {
        let key = self.file_key(name);
        self.lock().files.insert(key, contents.to_vec());
    }

    /// Names of files directly inside this directory, sorted.
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.name).collect()
    }

    /// Makes every subsequent write or sync on any sink fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Number of [`Dir::list`] calls on any directory of this tree.
    #[must_use]
    pub fn list_calls(&self) -> u64 {
        self.lock().list_calls
    }

    /// Number of synced renames on any directory of this tree.
    #[must_use]
    pub fn dir_syncs(&self) -> u64 {
        self.lock().dir_syncs
    }

    fn lock(&self) -> MutexGuard<'_, MemFs> {
        self.fs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn file_key(&self, name: &str) -> String {
        format!("{}/{}", self.path, name)
    }

    fn entries(&self) -> Vec<DirEntry> {
        let prefix = format!("{}/", self.path);
        self.lock()
            .files
            .iter()
            .filter_map(|(key, contents)| {
                let name = key.strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                Some(DirEntry {
                    name: name.to_string(),
                    size: contents.len() as u64,
                })
            })
            .collect()
    }

    fn require_dir(&self, fs: &MemFs) -> io::Result<()> {
        if fs.dirs.contains(&self.path) {
            Ok(())
        } else {
            Err(not_found(&self.path))
        }
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path))
}

struct MemSink {
    fs: Arc<Mutex<MemFs>>,
    key: String,
}

impl MemSink {
    fn lock(&self) -> MutexGuard<'_, MemFs> {
        self.fs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for MemSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut fs = self.lock();
        if fs.fail_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        let contents = fs.files.get_mut(&self.key).ok_or_else(|| not_found(&self.key))?;
        contents.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileSink for MemSink {
    fn sync(&mut self) -> io::Result<()> {
        if self.lock().fail_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "injected sync failure"));
        }
        Ok(())
    }
}

impl Dir for MemDir {
    fn exists(&self) -> io::Result<bool> {
        Ok(self.lock().dirs.contains(&self.path))
    }

    fn create(&self) -> io::Result<()> {
        let mut fs = self.lock();
        let mut current = String::new();
        for part in self.path.split('/') {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            fs.dirs.insert(current.clone());
        }
        Ok(())
    }

    fn list(&self) -> io::Result<Vec<DirEntry>> {
        {
            let mut fs = self.lock();
            self.require_dir(&fs)?;
            fs.list_calls += 1;
        }
        Ok(self.entries())
    }

    fn create_file(&self, name: &str) -> io::Result<Box<dyn FileSink>> {
        let key = self.file_key(name);
        let mut fs = self.lock();
        self.require_dir(&fs)?;
        if fs.files.contains_key(&key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", key),
            ));
        }
        fs.files.insert(key.clone(), Vec::new());
        Ok(Box::new(MemSink {
            fs: Arc::clone(&self.fs),
            key,
        }))
    }

    fn open_file(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let key = self.file_key(name);
        let contents = self
            .lock()
            .files
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(&key))?;
        Ok(Box::new(Cursor::new(contents)))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        let key = self.file_key(name);
        self.lock()
            .files
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| not_found(&key))
    }

    fn rename(&self, from: &str, to: &str, sync: bool) -> io::Result<()> {
        let from_key = self.file_key(from);
        let mut fs = self.lock();
        let contents = fs.files.remove(&from_key).ok_or_else(|| not_found(&from_key))?;
        fs.files.insert(self.file_key(to), contents);
        if sync {
            fs.dir_syncs += 1;
        }
        Ok(())
    }

    fn child(&self, name: &str) -> Arc<dyn Dir> {
        Arc::new(self.sub(name))
    }

    fn display_path(&self, name: &str) -> String {
        self.file_key(name)
    }
}
