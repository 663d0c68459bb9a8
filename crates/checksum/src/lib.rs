//! # Checksum - Pluggable Digest Algorithms
//!
//! Named, swappable hashing algorithms used by the Strata store to protect
//! every committed version.
//!
//! An [`Algorithm`] is a pair of capabilities: a **name** and a factory for
//! fresh [`Sum`] accumulators. The name doubles as the file extension of the
//! checksum sidecar written next to each data file, so it is restricted to
//! lowercase ASCII letters and digits (see [`validate_name`]).
//!
//! ## Built-in algorithms
//!
//! | Name      | Digest   | Kind                         |
//! |-----------|----------|------------------------------|
//! | `crc32`   | 32 bit   | CRC-32 (IEEE)                |
//! | `crc64`   | 64 bit   | CRC-64 (ISO polynomial)      |
//! | `fnv32`   | 32 bit   | FNV-1                        |
//! | `fnv32a`  | 32 bit   | FNV-1a                       |
//! | `fnv64`   | 64 bit   | FNV-1                        |
//! | `fnv64a`  | 64 bit   | FNV-1a                       |
//! | `fnv128`  | 128 bit  | FNV-1                        |
//! | `fnv128a` | 128 bit  | FNV-1a (default)             |
//! | `md5`     | 128 bit  | MD5                          |
//! | `sha256`  | 256 bit  | SHA-2                        |
//! | `sha512`  | 512 bit  | SHA-2                        |
//! | `xxh3`    | 64 bit   | XXH3                         |
//!
//! Integer digests are marshaled big-endian.
//!
//! ## Example
//!
//! ```rust
//! use checksum::{Algorithm, FNV128A};
//!
//! let mut sum = FNV128A.new_sum();
//! sum.update(b"da");
//! sum.update(b"ta");
//! assert_eq!(checksum::hex(&sum.marshal()), "695b598c64757277b806e9704d5d6a5d");
//! ```

mod crc;
mod digest;
mod fnv;

use std::fmt;

use thiserror::Error;

/// Longest accepted algorithm name.
pub const MAX_NAME_LEN: usize = 32;

/// A stateful, incremental digest accumulator.
///
/// `update` calls are order-sensitive: feeding `"da"` then `"ta"` yields the
/// same digest as feeding `"data"` once.
pub trait Sum: Send {
    /// Feeds more bytes into the digest.
    fn update(&mut self, bytes: &[u8]);

    /// Returns the digest of everything fed so far.
    ///
    /// Does not reset the accumulator; further `update` calls continue from
    /// the current state.
    fn marshal(&self) -> Vec<u8>;
}

/// A named digest algorithm.
pub trait Algorithm: Send + Sync {
    /// Name used as the checksum sidecar's file extension.
    fn name(&self) -> &str;

    /// Creates a fresh accumulator.
    fn new_sum(&self) -> Box<dyn Sum>;
}

/// Errors produced while resolving or validating algorithms.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// The name cannot be used as a file extension.
    #[error("invalid algorithm name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No built-in algorithm has this name.
    #[error("unknown checksum algorithm {0:?}")]
    Unknown(String),
}

/// A built-in algorithm: a static name plus a constructor.
#[derive(Clone, Copy)]
pub struct Builtin {
    name: &'static str,
    new_sum: fn() -> Box<dyn Sum>,
}

impl Algorithm for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn new_sum(&self) -> Box<dyn Sum> {
        (self.new_sum)()
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Builtin").field(&self.name).finish()
    }
}

pub static CRC32: Builtin = Builtin {
    name: "crc32",
    new_sum: crc::new_crc32,
};

pub static CRC64: Builtin = Builtin {
    name: "crc64",
    new_sum: crc::new_crc64,
};

pub static FNV32: Builtin = Builtin {
    name: "fnv32",
    new_sum: fnv::new_fnv32,
};

pub static FNV32A: Builtin = Builtin {
    name: "fnv32a",
    new_sum: fnv::new_fnv32a,
};

pub static FNV64: Builtin = Builtin {
    name: "fnv64",
    new_sum: fnv::new_fnv64,
};

pub static FNV64A: Builtin = Builtin {
    name: "fnv64a",
    new_sum: fnv::new_fnv64a,
};

pub static FNV128: Builtin = Builtin {
    name: "fnv128",
    new_sum: fnv::new_fnv128,
};

pub static FNV128A: Builtin = Builtin {
    name: "fnv128a",
    new_sum: fnv::new_fnv128a,
};

pub static MD5: Builtin = Builtin {
    name: "md5",
    new_sum: digest::new_md5,
};

pub static SHA256: Builtin = Builtin {
    name: "sha256",
    new_sum: digest::new_sha256,
};

pub static SHA512: Builtin = Builtin {
    name: "sha512",
    new_sum: digest::new_sha512,
};

pub static XXH3: Builtin = Builtin {
    name: "xxh3",
    new_sum: digest::new_xxh3,
};

/// Every built-in algorithm, in registry order.
pub static BUILTINS: [&Builtin; 12] = [
    &CRC32, &CRC64, &FNV32, &FNV32A, &FNV64, &FNV64A, &FNV128, &FNV128A, &MD5, &SHA256, &SHA512,
    &XXH3,
];

/// The algorithm used when a store is opened without choosing one.
#[must_use]
pub fn default_algorithm() -> &'static Builtin {
    &FNV128A
}

/// Looks up a built-in algorithm by name.
pub fn builtin(name: &str) -> Result<&'static Builtin, ChecksumError> {
    BUILTINS
        .iter()
        .copied()
        .find(|a| a.name == name)
        .ok_or_else(|| ChecksumError::Unknown(name.to_string()))
}

/// Checks that `name` can be used as a sidecar file extension.
///
/// Accepted: 1 to [`MAX_NAME_LEN`] characters, each `a-z` or `0-9`.
pub fn validate_name(name: &str) -> Result<(), ChecksumError> {
    let reject = |reason| ChecksumError::InvalidName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(reject("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(reject("name is too long"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return Err(reject("only lowercase ASCII letters and digits are allowed"));
    }
    Ok(())
}

/// Lowercase hex encoding, used to print digests.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    use fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
