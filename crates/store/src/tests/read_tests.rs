use std::io::{self, Read};

use anyhow::Result;

use super::helpers::*;
use crate::*;

// --------------------- Selection ---------------------

#[test]
fn reader_opens_latest_version() -> Result<()> {
    let (_dir, store) = mem_store();
    put(&store, KEY, b"one");
    put(&store, KEY, b"two");
    let latest = put(&store, KEY, b"three");

    let mut r = store.reader(KEY)?;
    assert_eq!(r.version(), latest);
    assert_eq!(read_all(&mut r)?, b"three");
    Ok(())
}

#[test]
fn time_selector_opens_exact_version() -> Result<()> {
    let (_dir, store) = mem_store();
    let first = put(&store, KEY, b"one");
    put(&store, KEY, b"two");

    let mut r = store.reader_with(KEY, VersionSelector::Time(first.time))?;
    assert_eq!(read_all(&mut r)?, b"one");
    Ok(())
}

#[test]
fn time_selector_without_match_is_not_found() {
    let (_dir, store) = mem_store();
    put_at(&store, KEY, 1_000, b"one");

    let err = store
        .reader_with(KEY, VersionSelector::Time(at(1_001)))
        .unwrap_err();
    assert!(err.is_not_found(), "got {:?}", err);
}

#[test]
fn unknown_key_is_not_found() {
    let (_dir, store) = mem_store();
    assert!(store.reader("missing").unwrap_err().is_not_found());
    assert!(store.versions("missing").unwrap().is_empty());
}

// --------------------- Verification ---------------------

#[test]
fn reader_verifies_at_eof() -> Result<()> {
    let (_dir, store) = mem_store();
    put(&store, KEY, b"payload");

    let mut r = store.reader(KEY)?;
    assert!(!r.is_verified());
    read_all(&mut r)?;
    assert!(r.is_verified());
    r.close()?;
    r.close()?;
    Ok(())
}

#[test]
fn corrupted_data_fails_at_eof() -> Result<()> {
    let (dir, store) = mem_store();
    let version = put(&store, KEY, b"hello");
    dir.sub(KEY).put_file(&stem(&version), b"jello");

    let mut r = store.reader(KEY)?;
    let err = read_all(&mut r).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    let err = StoreError::from_io(err, "read", "test");
    assert!(err.is_verification(), "got {:?}", err);
    assert!(!r.is_verified());
    assert_eq!(store.metrics().read.verification_failures, 1);
    Ok(())
}

#[test]
fn corrupted_sidecar_fails_verification() -> Result<()> {
    let (dir, store) = mem_store();
    let version = put(&store, KEY, b"hello");
    dir.sub(KEY)
        .put_file(&sidecar(&version, "fnv128a"), &[0u8; 16]);

    let mut r = store.reader(KEY)?;
    let err = StoreError::from_io(read_all(&mut r).unwrap_err(), "read", "test");
    match err {
        StoreError::ChecksumMismatch { expected, actual, .. } => {
            assert_eq!(expected, "0".repeat(32));
            assert_eq!(actual.len(), 32);
        }
        other => panic!("expected checksum mismatch, got {:?}", other),
    }
    Ok(())
}

#[test]
fn close_catches_truncated_read() -> Result<()> {
    let (_dir, store) = mem_store();
    put(&store, KEY, b"hello");

    let mut r = store.reader(KEY)?;
    let mut head = [0u8; 2];
    r.read_exact(&mut head)?;
    assert_eq!(&head, b"he");

    assert!(r.close().unwrap_err().is_verification());
    Ok(())
}

#[test]
fn close_after_full_read_is_ok() -> Result<()> {
    let (_dir, store) = mem_store();
    put(&store, KEY, b"hello");

    let mut r = store.reader(KEY)?;
    let mut all = [0u8; 5];
    r.read_exact(&mut all)?;
    // EOF not reached yet; close does the comparison
    r.close()?;
    assert!(r.is_verified());
    Ok(())
}

#[test]
fn read_after_close_is_usage_error() -> Result<()> {
    let (_dir, store) = mem_store();
    put(&store, KEY, b"hello");

    let mut r = store.reader(KEY)?;
    read_all(&mut r)?;
    r.close()?;

    let err = StoreError::from_io(r.read(&mut [0u8; 4]).unwrap_err(), "read", "test");
    assert!(matches!(err, StoreError::Usage(_)), "got {:?}", err);
    Ok(())
}

#[test]
fn altered_marker_accepts_edited_data() -> Result<()> {
    let (dir, store) = mem_store();
    let version = put(&store, KEY, b"hello");
    let key_dir = dir.sub(KEY);
    key_dir.put_file(&stem(&version), b"hand-edited");

    let markers: [&[u8]; 3] = [b"ALTERED", b"ALTERED\n", b"ALTERED\r\n"];
    for marker in markers {
        key_dir.put_file(&sidecar(&version, "fnv128a"), marker);
        let mut r = store.reader(KEY)?;
        assert_eq!(read_all(&mut r)?, b"hand-edited");
        assert!(r.is_verified());
    }

    key_dir.put_file(&sidecar(&version, "fnv128a"), b"ALTERED!");
    assert!(read_all(&mut store.reader(KEY)?).is_err());
    Ok(())
}

#[test]
fn no_integrity_check_returns_corrupted_data() -> Result<()> {
    let (dir, store) = mem_store_with(StoreOptions::new().no_integrity_check());
    assert!(!store.verifies_checksums());
    let version = put(&store, KEY, b"hello");
    dir.sub(KEY).put_file(&stem(&version), b"jello");

    let mut r = store.reader(KEY)?;
    assert_eq!(read_all(&mut r)?, b"jello");
    r.close()?;
    assert_eq!(store.metrics().read.verification_failures, 0);
    Ok(())
}

// --------------------- Algorithms ---------------------

#[test]
fn fixed_algorithm_sidecar_holds_its_digest() -> Result<()> {
    let (dir, store) = mem_store_with(StoreOptions::new().algorithm(FixedAlgorithm));
    let version = put(&store, KEY, b"anything at all");

    assert_eq!(
        dir.sub(KEY).file(&sidecar(&version, "fixed")).unwrap(),
        vec![1, 2, 3, 4]
    );
    let mut r = store.reader(KEY)?;
    assert_eq!(read_all(&mut r)?, b"anything at all");
    assert!(r.is_verified());
    Ok(())
}

#[test]
fn versions_from_another_builtin_stay_readable() -> Result<()> {
    let dir = MemDir::new();
    let sha = Store::open(dir.clone(), StoreOptions::new().builtin_algorithm("sha256"))?;
    put(&sha, KEY, b"written with sha256");

    let fnv = Store::open(dir.clone(), StoreOptions::new())?;
    assert_eq!(fnv.versions(KEY)?.len(), 1);
    assert_eq!(read_all(&mut fnv.reader(KEY)?)?, b"written with sha256");

    let newer = put(&fnv, KEY, b"written with fnv128a");
    assert!(dir.sub(KEY).file(&sidecar(&newer, "fnv128a")).is_some());
    assert_eq!(fnv.versions(KEY)?.len(), 2);
    Ok(())
}

#[test]
fn md5_history_is_readable_by_default_store() -> Result<()> {
    let dir = MemDir::new();
    let md5 = Store::open(dir.clone(), StoreOptions::new().builtin_algorithm("md5"))?;
    let version = put(&md5, KEY, b"data");
    assert_eq!(
        checksum::hex(&dir.sub(KEY).file(&sidecar(&version, "md5")).unwrap()),
        "8d777f385d3dfec8815d20f7496026dc"
    );

    let store = Store::open(dir, StoreOptions::new())?;
    let mut r = store.reader(KEY)?;
    assert_eq!(read_all(&mut r)?, b"data");
    assert!(r.is_verified());
    Ok(())
}

#[test]
fn unknown_algorithm_sidecar_hides_version() -> Result<()> {
    let (dir, writer_store) = mem_store_with(StoreOptions::new().algorithm(FixedAlgorithm));
    put(&writer_store, KEY, b"fixed");

    let store = Store::open(dir, StoreOptions::new())?;
    assert!(store.versions(KEY)?.is_empty());
    assert!(store.reader(KEY).unwrap_err().is_not_found());
    Ok(())
}

// --------------------- Metrics ---------------------

#[test]
fn read_metrics_count_calls_and_bytes() -> Result<()> {
    let (_dir, store) = mem_store();
    put(&store, KEY, b"0123456789");

    for _ in 0..3 {
        let mut r = store.reader(KEY)?;
        read_all(&mut r)?;
        r.close()?;
    }
    let _ = store.reader("missing");

    let m = store.metrics().read;
    assert_eq!(m.reader_calls, 4);
    assert_eq!(m.total_bytes_read, 30);
    assert_eq!(m.verification_failures, 0);
    Ok(())
}
