//! Store configuration, read from a file and layered with `LIGATURE_*` environment variables.
//!
//! ```toml
//! path = "ligature.db"
//! read_only = false
//! write_timeout_ms = 500
//! ```

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const ENVIRONMENT_PREFIX: &str = "LIGATURE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. Without one the store lives in memory only.
    pub path: Option<PathBuf>,
    /// Refuse write transactions.
    pub read_only: bool,
    /// How long a write transaction waits for the active one before giving up.
    /// Without a timeout it waits for as long as it takes.
    pub write_timeout_ms: Option<u64>,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
    /// Reads the file (any format the `config` crate recognises by extension), then lets the
    /// environment override it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::layered(
            Some(path.as_ref()),
            Environment::with_prefix(ENVIRONMENT_PREFIX),
        )
    }
    /// Reads the environment alone.
    pub fn from_env() -> Result<Self> {
        Self::layered(None, Environment::with_prefix(ENVIRONMENT_PREFIX))
    }
    fn layered(file: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }
        let settings = builder
            .add_source(environment.try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
