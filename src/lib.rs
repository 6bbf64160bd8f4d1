//! MeowKey: an embedded single-file store for per-client event streams.
//!
//! A database file holds a fixed header, an open-addressed client directory,
//! and for every client three B+ trees (keystrokes, clipboard captures, window
//! changes) keyed by event timestamp. The file is pre-allocated to a fixed
//! capacity and never grows.
//!
//! ```no_run
//! use meowkey::{Database, EngineOptions, Keystroke};
//!
//! # fn main() -> meowkey::Result<()> {
//! let db = Database::open("capture.meow", EngineOptions::default())?;
//! let (alice, _) = db.register_client("alice")?;
//! db.insert_keystroke(alice.client_hash, &Keystroke::new(100, 0, "A"))?;
//! let events = db.query_client_all_events("alice")?;
//! assert_eq!(events.keystrokes.len(), 1);
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod admin;
pub mod db;
pub mod primitives;
pub mod storage;
pub mod types;

pub use admin::{StatsReport, VerifyReport};
pub use db::{ClientSession, Database, EngineOptions, EventSink, QueryResult, Synchronous};
pub use storage::{ClientRecord, Clipboard, EventRecord, Keystroke, WindowEvent};
pub use types::{client_hash, now_micros, EventKind, MeowError, Result};
