use std::fmt;

use serde::Serialize;

use crate::db::Database;
use crate::storage::FreeListLengths;
use crate::types::{EventKind, Result};

/// Snapshot of file usage, clients, and event counters.
///
/// Serializes to JSON for the inspector and renders as a short text block
/// through `Display`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Space accounting for the file.
    pub file: FileSection,
    /// Directory occupancy.
    pub clients: ClientSection,
    /// Event counters summed over every live client.
    pub events: EventSection,
    /// Lengths of the in-memory free lists.
    pub free_lists: FreeListLengths,
}

/// Space accounting for the file.
#[derive(Debug, Clone, Serialize)]
pub struct FileSection {
    /// Fixed capacity chosen at creation.
    pub capacity_bytes: u64,
    /// Bytes below the bump cursor, freed blocks included.
    pub used_bytes: u64,
    /// `used_bytes` as a percentage of `capacity_bytes`.
    pub usage_percent: f64,
    /// Where the next fresh allocation starts.
    pub next_free_offset: u64,
    /// Slots in the client directory.
    pub table_slots: usize,
}

/// Directory occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSection {
    /// Live clients according to the header.
    pub registered: u32,
    /// Registration limit.
    pub max_clients: u32,
    /// Live clients currently marked active.
    pub active: usize,
    /// Records held in the directory cache.
    pub cached: usize,
}

/// Event counters summed over every live client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventSection {
    /// Stored keystrokes.
    pub keystrokes: u64,
    /// Stored clipboard captures.
    pub clipboard: u64,
    /// Stored window changes.
    pub windows: u64,
}

impl EventSection {
    /// Events across all kinds.
    pub fn total(&self) -> u64 {
        self.keystrokes + self.clipboard + self.windows
    }
}

/// Builds a [`StatsReport`] from the header, the directory, and the free lists.
pub fn stats(db: &Database) -> Result<StatsReport> {
    db.with_state(|state, io| {
        let header = &state.header;
        let live = state.directory.scan(io)?;
        let mut events = EventSection::default();
        for (_, record) in &live {
            events.keystrokes += record.total(EventKind::Keystroke);
            events.clipboard += record.total(EventKind::Clipboard);
            events.windows += record.total(EventKind::Window);
        }
        let usage_percent = if header.file_size == 0 {
            0.0
        } else {
            header.next_free_offset as f64 * 100.0 / header.file_size as f64
        };
        Ok(StatsReport {
            file: FileSection {
                capacity_bytes: header.file_size,
                used_bytes: header.next_free_offset,
                usage_percent,
                next_free_offset: header.next_free_offset,
                table_slots: state.directory.slots(),
            },
            clients: ClientSection {
                registered: header.num_clients,
                max_clients: header.max_clients,
                active: live.iter().filter(|(_, r)| r.is_active).count(),
                cached: state.directory.cached(),
            },
            events,
            free_lists: state.free.lengths(),
        })
    })
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== MeowKey Database Stats ===")?;
        writeln!(
            f,
            "File: {} of {} used ({:.2}%)",
            format_bytes(self.file.used_bytes),
            format_bytes(self.file.capacity_bytes),
            self.file.usage_percent
        )?;
        writeln!(f, "Next free offset: {}", self.file.next_free_offset)?;
        writeln!(
            f,
            "Clients: {} registered / {} max, {} active, {} cached, {} slots",
            self.clients.registered,
            self.clients.max_clients,
            self.clients.active,
            self.clients.cached,
            self.file.table_slots
        )?;
        writeln!(
            f,
            "Events: {} keystrokes, {} clipboard, {} windows",
            self.events.keystrokes, self.events.clipboard, self.events.windows
        )?;
        write!(
            f,
            "Free lists: {} node pages, {} keystroke / {} clipboard / {} window blocks",
            self.free_lists.node_pages,
            self.free_lists.keystroke_blocks,
            self.free_lists.clipboard_blocks,
            self.free_lists.window_blocks
        )
    }
}
