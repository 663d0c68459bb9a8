/// Version naming and ordering.
///
/// ## File names
///
/// ```text
/// 01718000000123456789              data file: nanos since the Unix epoch, 20 digits
/// 01718000000123456789.fnv128a      checksum sidecar: data name + "." + algorithm
/// 01718000000123456789.fnv128a.tmp  sidecar being committed (ignored)
/// ```
///
/// Fixed-width zero padding makes lexicographic order equal chronological
/// order, so a plain string sort of the directory orders versions.
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::dir::DirEntry;
use crate::error::{Result, StoreError};

/// Digits in a data file name (`u64::MAX` has 20).
pub(crate) const NAME_WIDTH: usize = 20;

/// Suffix of a sidecar that has not been renamed into place yet.
pub(crate) const TMP_SUFFIX: &str = ".tmp";

/// One committed, immutable version of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Creation time; uniquely identifies the version within its key.
    pub time: SystemTime,
    /// Size of the data file in bytes.
    pub size: u64,
}

/// A version as discovered on disk, with the names needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredVersion {
    pub version: Version,
    pub nanos: u64,
    pub data_name: String,
    /// Extension of the sidecar that will be used to verify it.
    pub algorithm: String,
}

impl StoredVersion {
    pub fn sidecar_name(&self) -> String {
        sidecar_name(&self.data_name, &self.algorithm)
    }
}

/// Converts a time to the integer encoded in file names.
pub(crate) fn to_nanos(time: SystemTime) -> Result<u64> {
    let since_epoch = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| StoreError::Usage("version time is before the Unix epoch".to_string()))?;
    u64::try_from(since_epoch.as_nanos())
        .map_err(|_| StoreError::Usage("version time is too far in the future".to_string()))
}

pub(crate) fn from_nanos(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

pub(crate) fn data_name(nanos: u64) -> String {
    format!("{:0width$}", nanos, width = NAME_WIDTH)
}

pub(crate) fn sidecar_name(data_name: &str, algorithm: &str) -> String {
    format!("{}.{}", data_name, algorithm)
}

/// Parses a data file name; `None` for anything else.
pub(crate) fn parse_data_name(name: &str) -> Option<u64> {
    if name.len() != NAME_WIDTH || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Parses a sidecar name into its timestamp and algorithm extension.
pub(crate) fn parse_sidecar_name(name: &str) -> Option<(u64, &str)> {
    let (stem, ext) = name.split_once('.')?;
    let nanos = parse_data_name(stem)?;
    checksum::validate_name(ext).ok()?;
    Some((nanos, ext))
}

/// Orders directory entries into committed versions, oldest first.
///
/// A data file counts only when a sidecar for it exists whose algorithm is
/// either `active` or a built-in that can be resolved by name. When several
/// sidecars exist, `active` is preferred.
pub(crate) fn list(entries: &[DirEntry], active: &str) -> Vec<StoredVersion> {
    let mut sorted: Vec<&DirEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut data: BTreeMap<u64, &DirEntry> = BTreeMap::new();
    let mut sidecars: HashMap<u64, Vec<&str>> = HashMap::new();
    for entry in sorted {
        if let Some(nanos) = parse_data_name(&entry.name) {
            // later entries replace earlier ones
            data.insert(nanos, entry);
        } else if let Some((nanos, ext)) = parse_sidecar_name(&entry.name) {
            sidecars.entry(nanos).or_default().push(ext);
        }
    }

    data.into_iter()
        .filter_map(|(nanos, entry)| {
            let exts = sidecars.get(&nanos)?;
            let algorithm = if exts.contains(&active) {
                active
            } else {
                exts.iter()
                    .copied()
                    .find(|ext| checksum::builtin(ext).is_ok())?
            };
            Some(StoredVersion {
                version: Version {
                    time: from_nanos(nanos),
                    size: entry.size,
                },
                nanos,
                data_name: entry.name.clone(),
                algorithm: algorithm.to_string(),
            })
        })
        .collect()
}

/// Largest timestamp used by any data file, committed or not.
pub(crate) fn latest_data_nanos(entries: &[DirEntry]) -> Option<u64> {
    entries.iter().filter_map(|e| parse_data_name(&e.name)).max()
}
