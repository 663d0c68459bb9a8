/// Fail-over reads.
///
/// A version that fails at any stage (opening, decoding, verification) is
/// recorded and the next older one is tried, so a torn or bit-rotted newest
/// state never hides an intact older one.
use std::io::{self, Read};
use std::sync::Arc;

use tracing::{info, warn};

use crate::dir::Dir;
use crate::error::{Attempt, Result, StoreError};
use crate::read::Reader;
use crate::version::{StoredVersion, Version};
use crate::Store;

impl Store {
    /// Decodes the newest version of `key` that both decodes and verifies.
    ///
    /// `decode` may stop early; whatever it leaves unread is drained so the
    /// whole version is checked before the value is returned.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the key has no committed version.
    /// - [`StoreError::NoValidVersion`] with one [`Attempt`] per version,
    ///   newest first, if every version failed.
    pub fn read_latest<T, F>(&self, key: &str, mut decode: F) -> Result<(T, Version)>
    where
        F: FnMut(&mut Reader) -> io::Result<T>,
    {
        let dir = self.key_dir(key)?;
        let versions = self.stored_versions(&*dir)?;
        if versions.is_empty() {
            return Err(StoreError::NotFound(format!("no version of key {:?}", key)));
        }

        let mut attempts = Vec::new();
        for stored in versions.into_iter().rev() {
            let version = stored.version;
            let nanos = stored.nanos;
            match self.try_version(Arc::clone(&dir), stored, &mut decode) {
                Ok(value) => {
                    if !attempts.is_empty() {
                        info!(
                            key,
                            version = nanos,
                            skipped = attempts.len(),
                            "fell back to older version"
                        );
                    }
                    return Ok((value, version));
                }
                Err(error) => {
                    warn!(key, version = nanos, error = %error, "skipping unreadable version");
                    attempts.push(Attempt { version, error });
                }
            }
        }
        Err(StoreError::NoValidVersion(attempts))
    }

    /// [`read_latest`](Store::read_latest) returning the raw bytes.
    pub fn read_latest_bytes(&self, key: &str) -> Result<(Vec<u8>, Version)> {
        self.read_latest(key, |reader| {
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            Ok(data)
        })
    }

    fn try_version<T, F>(
        &self,
        dir: Arc<dyn Dir>,
        stored: StoredVersion,
        decode: &mut F,
    ) -> Result<T>
    where
        F: FnMut(&mut Reader) -> io::Result<T>,
    {
        self.metrics.reader_opened();
        let path = dir.display_path(&stored.data_name);
        let mut reader = self.open_version(dir, stored)?;

        let value = decode(&mut reader).map_err(|e| StoreError::from_io(e, "decode", &path))?;
        io::copy(&mut reader, &mut io::sink()).map_err(|e| StoreError::from_io(e, "read", &path))?;
        reader.close()?;
        Ok(value)
    }
}
