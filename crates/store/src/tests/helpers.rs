use std::io::{self, Read, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use checksum::{Algorithm, Sum};

use crate::version::{data_name, to_nanos};
use crate::*;

pub const KEY: &str = "state";

/// A store over a fresh in-memory directory, plus a handle to inspect it.
pub fn mem_store() -> (MemDir, Store) {
    mem_store_with(StoreOptions::new())
}

pub fn mem_store_with(options: StoreOptions) -> (MemDir, Store) {
    let dir = MemDir::new();
    let store = Store::open(dir.clone(), options).unwrap();
    (dir, store)
}

pub fn put(store: &Store, key: &str, data: &[u8]) -> Version {
    let mut w = store.writer_with(key, WriterOptions::new().no_sync()).unwrap();
    w.write_all(data).unwrap();
    w.commit().unwrap()
}

pub fn put_at(store: &Store, key: &str, nanos: u64, data: &[u8]) -> Version {
    let options = WriterOptions::new().no_sync().time(at(nanos));
    let mut w = store.writer_with(key, options).unwrap();
    w.write_all(data).unwrap();
    w.commit().unwrap()
}

pub fn at(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

pub fn read_all(reader: &mut Reader) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// Data file name of `version`.
pub fn stem(version: &Version) -> String {
    data_name(to_nanos(version.time).unwrap())
}

pub fn sidecar(version: &Version, algorithm: &str) -> String {
    format!("{}.{}", stem(version), algorithm)
}

/// Digest is always `[1, 2, 3, 4]`, whatever the input.
#[derive(Debug)]
pub struct FixedAlgorithm;

struct FixedSum;

impl Sum for FixedSum {
    fn update(&mut self, _bytes: &[u8]) {}

    fn marshal(&self) -> Vec<u8> {
        vec![1, 2, 3, 4]
    }
}

impl Algorithm for FixedAlgorithm {
    fn name(&self) -> &str {
        "fixed"
    }

    fn new_sum(&self) -> Box<dyn Sum> {
        Box::new(FixedSum)
    }
}
