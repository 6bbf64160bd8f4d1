#![forbid(unsafe_code)]

//! Reporting and verification over an open database.
//!
//! Both entry points take the engine lock for the duration of the walk, so the
//! numbers they return describe a single consistent moment.

mod stats;
mod verify;

/// Usage and counter summary.
///
/// Gathers file usage, client counts, per-kind event totals, and free-list
/// lengths into one serializable report.
pub use stats::{stats, ClientSection, EventSection, FileSection, StatsReport};

/// Structural verification of the header, directory, and every tree.
pub use verify::{verify, TreeFinding, VerifyReport};

use crate::db::Database;
use crate::types::Result;

impl Database {
    /// Usage summary; see [`stats`].
    pub fn stats(&self) -> Result<StatsReport> {
        stats(self)
    }

    /// Prints the usage summary to stdout.
    pub fn print_stats(&self) -> Result<()> {
        let report = stats(self)?;
        println!("{report}");
        Ok(())
    }

    /// Structural check; see [`verify`].
    pub fn verify(&self) -> Result<VerifyReport> {
        verify(self)
    }
}
