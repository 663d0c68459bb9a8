//! # CLI - Strata Interactive Shell
//!
//! A REPL-style command-line interface for the Strata versioned file store.
//! Reads commands from stdin, executes them against the store, and prints
//! results to stdout. Works interactively or with commands piped via stdin.
//!
//! ## Commands
//!
//! ```text
//! PUT key value       Commit a new version of key
//! GET key             Newest version that verifies (falls back to older ones)
//! GET key nanos       Exactly the version created at nanos
//! VERSIONS key        List committed versions, oldest first
//! DELETE key nanos    Delete one version
//! ALGORITHMS          List built-in checksum algorithms
//! STATS               Print store metrics
//! EXIT / QUIT         Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! STRATA_DIR           store directory                 (default: "data")
//! STRATA_ALGORITHM     checksum for new versions       (default: "fnv128a")
//! STRATA_VERIFY        verify checksums on read        (default: "true")
//! STRATA_SYNC          fsync every commit              (default: "true")
//! STRATA_FAIL_MISSING  refuse to create STRATA_DIR     (default: "false")
//! RUST_LOG             log filter, written to stderr   (default: errors only)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! Strata started (dir=data, algorithm=fnv128a, verify=true, sync=true)
//! > PUT config {"retries":3}
//! OK 01718000000123456789
//! > GET config
//! {"retries":3}
//! > VERSIONS config
//! 01718000000123456789 13
//! (1 versions)
//! > EXIT
//! bye
//! ```

use std::io::{self, BufRead, Read, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use checksum::Algorithm;
use store::{Store, StoreError, StoreOptions, Version, VersionSelector, WriterOptions};
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    env_or(key, if default { "true" } else { "false" })
        .parse()
        .unwrap_or(default)
}

/// Version identifier printed and accepted by the shell.
fn nanos_of(version: &Version) -> u128 {
    version
        .time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

fn parse_time(arg: &str) -> Result<SystemTime> {
    let nanos: u64 = arg
        .parse()
        .with_context(|| format!("invalid version {:?}: expected nanoseconds", arg))?;
    Ok(UNIX_EPOCH + Duration::from_nanos(nanos))
}

fn put(store: &Store, key: &str, value: &str, sync: bool) -> Result<Version> {
    let options = if sync {
        WriterOptions::new()
    } else {
        WriterOptions::new().no_sync()
    };
    let mut writer = store.writer_with(key, options)?;
    writer
        .write_all(value.as_bytes())
        .map_err(|e| StoreError::from_io(e, "write", key))?;
    Ok(writer.commit()?)
}

fn get_exact(store: &Store, key: &str, time: SystemTime) -> Result<Vec<u8>> {
    let mut reader = store.reader_with(key, VersionSelector::Time(time))?;
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| StoreError::from_io(e, "read", key))?;
    reader.close()?;
    Ok(data)
}

fn get(store: &Store, key: &str, time: Option<&str>) -> Result<Option<Vec<u8>>> {
    let result = match time {
        Some(arg) => get_exact(store, key, parse_time(arg)?),
        None => store
            .read_latest_bytes(key)
            .map(|(data, _)| data)
            .map_err(anyhow::Error::from),
    };
    match result {
        Ok(data) => Ok(Some(data)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StoreError>()
        .map_or(false, StoreError::is_not_found)
}

fn delete(store: &Store, key: &str, time: &str) -> Result<()> {
    store.delete_version(key, parse_time(time)?)?;
    Ok(())
}

fn open_store() -> Result<(Store, bool)> {
    // Configuration via environment variables with sensible defaults.
    let dir = env_or("STRATA_DIR", "data");
    let algorithm = env_or("STRATA_ALGORITHM", "fnv128a");
    let verify = env_flag("STRATA_VERIFY", true);
    let sync = env_flag("STRATA_SYNC", true);
    let fail_missing = env_flag("STRATA_FAIL_MISSING", false);

    let mut options = StoreOptions::new().builtin_algorithm(&algorithm);
    if !verify {
        options = options.no_integrity_check();
    }
    if fail_missing {
        options = options.fail_when_missing_dir();
    }
    let store = Store::open_path(&dir, options)
        .with_context(|| format!("failed to open store at {}", dir))?;

    println!(
        "Strata started (dir={}, algorithm={}, verify={}, sync={})",
        dir,
        store.algorithm().name(),
        verify,
        sync
    );
    Ok((store, sync))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let (store, sync) = open_store()?;

    println!("Commands: PUT key value | GET key [nanos] | VERSIONS key");
    println!("          DELETE key nanos | ALGORITHMS | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: PUT key value");
                        } else {
                            match put(&store, k, &v, sync) {
                                Ok(version) => println!("OK {:020}", nanos_of(&version)),
                                Err(e) => println!("ERR put failed: {:#}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: PUT key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match get(&store, k, parts.next()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {:#}", e),
                        }
                    } else {
                        println!("ERR usage: GET key [nanos]");
                    }
                }
                "VERSIONS" => {
                    if let Some(k) = parts.next() {
                        match store.versions(k) {
                            Ok(versions) if versions.is_empty() => println!("(empty)"),
                            Ok(versions) => {
                                for v in &versions {
                                    println!("{:020} {}", nanos_of(v), v.size);
                                }
                                println!("({} versions)", versions.len());
                            }
                            Err(e) => println!("ERR list failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: VERSIONS key");
                    }
                }
                "DELETE" => match (parts.next(), parts.next()) {
                    (Some(k), Some(t)) => match delete(&store, k, t) {
                        Ok(()) => println!("OK"),
                        Err(e) if is_not_found(&e) => println!("(nil)"),
                        Err(e) => println!("ERR delete failed: {:#}", e),
                    },
                    _ => println!("ERR usage: DELETE key nanos"),
                },
                "ALGORITHMS" => {
                    let active = store.algorithm().name();
                    for alg in checksum::BUILTINS.iter() {
                        let marker = if alg.name() == active { " *" } else { "" };
                        println!("{}{}", alg.name(), marker);
                    }
                }
                "STATS" => {
                    println!("{:?}", store.metrics());
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
