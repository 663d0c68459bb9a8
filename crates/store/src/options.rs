/// Store, writer and reader options.
///
/// `StoreOptions` is a plain builder; nothing is checked until
/// [`Store::open`](crate::Store::open) validates it in one step. Choosing an
/// algorithm twice, or choosing one whose name cannot be a file extension,
/// fails construction rather than the first write.
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use checksum::Algorithm;

use crate::error::{Result, StoreError};

#[derive(Clone)]
enum AlgorithmChoice {
    Custom(Arc<dyn Algorithm>),
    Builtin(String),
}

impl AlgorithmChoice {
    fn describe(&self) -> &str {
        match self {
            AlgorithmChoice::Custom(a) => a.name(),
            AlgorithmChoice::Builtin(name) => name,
        }
    }
}

/// Options applied once when a store is opened.
#[derive(Clone)]
pub struct StoreOptions {
    fail_when_missing_dir: bool,
    verify: bool,
    algorithm: Option<AlgorithmChoice>,
    /// Names of algorithms chosen after the first one.
    extra_algorithms: Vec<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            fail_when_missing_dir: false,
            verify: true,
            algorithm: None,
            extra_algorithms: Vec::new(),
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("fail_when_missing_dir", &self.fail_when_missing_dir)
            .field("verify", &self.verify)
            .field("algorithm", &self.algorithm.as_ref().map(|a| a.describe()))
            .field("extra_algorithms", &self.extra_algorithms)
            .finish()
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail instead of creating the store directory when it is missing.
    pub fn fail_when_missing_dir(mut self) -> Self {
        self.fail_when_missing_dir = true;
        self
    }

    /// Treat every digest comparison as a match.
    ///
    /// Only meant for inspection and salvage tooling: corrupted data will be
    /// returned without complaint.
    pub fn no_integrity_check(mut self) -> Self {
        self.verify = false;
        self
    }

    /// Uses a custom checksum algorithm.
    pub fn algorithm<A: Algorithm + 'static>(self, algorithm: A) -> Self {
        self.choose(AlgorithmChoice::Custom(Arc::new(algorithm)))
    }

    /// Uses a shared checksum algorithm.
    pub fn shared_algorithm(self, algorithm: Arc<dyn Algorithm>) -> Self {
        self.choose(AlgorithmChoice::Custom(algorithm))
    }

    /// Uses a built-in checksum algorithm by name, e.g. `"sha256"`.
    pub fn builtin_algorithm(self, name: &str) -> Self {
        self.choose(AlgorithmChoice::Builtin(name.to_string()))
    }

    fn choose(mut self, choice: AlgorithmChoice) -> Self {
        if self.algorithm.is_some() {
            self.extra_algorithms.push(choice.describe().to_string());
        } else {
            self.algorithm = Some(choice);
        }
        self
    }

    pub(crate) fn validate(self) -> Result<Config> {
        if let Some(first) = &self.algorithm {
            if !self.extra_algorithms.is_empty() {
                return Err(StoreError::Config(format!(
                    "checksum algorithm configured twice ({} and {})",
                    first.describe(),
                    self.extra_algorithms.join(", ")
                )));
            }
        }

        let algorithm: Arc<dyn Algorithm> = match self.algorithm {
            Some(AlgorithmChoice::Custom(a)) => a,
            Some(AlgorithmChoice::Builtin(name)) => Arc::new(*checksum::builtin(&name)?),
            None => Arc::new(*checksum::default_algorithm()),
        };
        checksum::validate_name(algorithm.name())?;

        Ok(Config {
            fail_when_missing_dir: self.fail_when_missing_dir,
            verify: self.verify,
            algorithm,
        })
    }
}

/// Validated store configuration.
pub(crate) struct Config {
    pub fail_when_missing_dir: bool,
    pub verify: bool,
    pub algorithm: Arc<dyn Algorithm>,
}

/// Options for a single writer.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub(crate) time: Option<SystemTime>,
    pub(crate) sync: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            time: None,
            sync: true,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits the version under `time` instead of "now".
    ///
    /// The time must not name an existing version of the key.
    pub fn time(mut self, time: SystemTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Skips every fsync on commit, including the directory flush after the
    /// sidecar rename.
    pub fn no_sync(mut self) -> Self {
        self.sync = false;
        self
    }
}

/// Which version a reader opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionSelector {
    /// The newest committed version.
    #[default]
    Latest,
    /// The version created at exactly this time.
    Time(SystemTime),
}
