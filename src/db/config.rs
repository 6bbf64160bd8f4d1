use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::format::{DEFAULT_CAPACITY, DEFAULT_MAX_CLIENTS, DEFAULT_TABLE_SLOTS};
use crate::types::{MeowError, Result};

/// When mutations reach stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    /// fsync after every mutating call.
    #[default]
    Full,
    /// fsync only on `sync_to_disk` and `close`.
    Off,
}

/// Options applied when a database file is opened.
///
/// `capacity_bytes`, `table_slots` and `max_clients` only matter when the file
/// is created; an existing file keeps the values recorded in its header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Fixed file size written on creation.
    pub capacity_bytes: u64,
    /// Directory slot count written on creation.
    pub table_slots: usize,
    /// Registration limit written on creation.
    pub max_clients: u32,
    /// Durability mode.
    pub synchronous: Synchronous,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY,
            table_slots: DEFAULT_TABLE_SLOTS,
            max_clients: DEFAULT_MAX_CLIENTS,
            synchronous: Synchronous::Full,
        }
    }
}

impl EngineOptions {
    /// Default layout with an fsync after every mutation.
    pub fn durable() -> Self {
        Self::default()
    }

    /// Small file for tests and tooling: `capacity_bytes` total, 64 slots.
    pub fn small(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            table_slots: 64,
            max_clients: 64,
            synchronous: Synchronous::Off,
        }
    }

    /// Parses options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let opts: Self = toml::from_str(text).map_err(|err| MeowError::Config(err.to_string()))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| MeowError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Rejects option combinations that cannot describe a file.
    pub fn validate(&self) -> Result<()> {
        if self.table_slots == 0 {
            return Err(MeowError::Config("table_slots must be at least 1".into()));
        }
        if self.max_clients == 0 {
            return Err(MeowError::Config("max_clients must be at least 1".into()));
        }
        Ok(())
    }
}
