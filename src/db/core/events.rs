use serde::Serialize;
use tracing::{debug, warn};

use super::{traced, Database, Inner};
use crate::primitives::io::FileIo;
use crate::storage::btree::{self, FileNodeStore};
use crate::storage::{BlockClass, ClientRecord, Clipboard, EventRecord, Keystroke, WindowEvent};
use crate::types::{EventKind, MeowError, Offset, Result};

/// Events of one client across the three kinds, each list in timestamp order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    /// Client the events belong to.
    pub client_id: String,
    /// Keystrokes in range.
    pub keystrokes: Vec<Keystroke>,
    /// Clipboard captures in range.
    pub clipboard: Vec<Clipboard>,
    /// Window changes in range.
    pub windows: Vec<WindowEvent>,
}

impl QueryResult {
    /// Events across all kinds.
    pub fn len(&self) -> usize {
        self.keystrokes.len() + self.clipboard.len() + self.windows.len()
    }

    /// No events in any kind.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Database {
    /// Stores a keystroke for the client owning `client_hash`; returns its payload offset.
    pub fn insert_keystroke(&self, client_hash: u32, event: &Keystroke) -> Result<Offset> {
        self.insert_event(client_hash, event)
    }

    /// Stores a clipboard capture for the client owning `client_hash`.
    pub fn insert_clipboard(&self, client_hash: u32, event: &Clipboard) -> Result<Offset> {
        self.insert_event(client_hash, event)
    }

    /// Stores a window change for the client owning `client_hash`.
    pub fn insert_window(&self, client_hash: u32, event: &WindowEvent) -> Result<Offset> {
        self.insert_event(client_hash, event)
    }

    /// Kind-generic insert behind the three typed entry points.
    pub fn insert_event<E: EventRecord>(&self, client_hash: u32, event: &E) -> Result<Offset> {
        let op = match E::KIND {
            EventKind::Keystroke => "insert_keystroke",
            EventKind::Clipboard => "insert_clipboard",
            EventKind::Window => "insert_window",
        };
        traced(op, self.with_state(|state, io| insert(state, io, client_hash, event)))
    }

    /// Events of `id` with `start <= timestamp <= end`.
    pub fn query_client_events_by_time_range(
        &self,
        id: &str,
        start: u64,
        end: u64,
    ) -> Result<QueryResult> {
        traced(
            "query_client_events_by_time_range",
            self.with_state(|state, io| query(state, io, id, start, end)),
        )
    }

    /// Every event of `id`.
    pub fn query_client_all_events(&self, id: &str) -> Result<QueryResult> {
        self.query_client_events_by_time_range(id, 0, u64::MAX)
    }
}

fn insert<E: EventRecord>(state: &mut Inner, io: &dyn FileIo, client_hash: u32, event: &E) -> Result<Offset> {
    let (slot, mut record) = state
        .directory
        .find_by_hash(io, client_hash)?
        .ok_or(MeowError::UnknownClientHash(client_hash))?;
    let kind = E::KIND;
    let class = BlockClass::Data(kind);
    let mut event = event.clone();
    event.set_client_hash(record.client_hash);

    let block = state.free.allocate(&mut state.header, class)?;
    let cursor = if block.bumped { state.write_header(io) } else { Ok(()) };
    if let Err(err) = cursor.and_then(|()| io.write_at(block.offset, &event.encode())) {
        state.free.release(class, block.offset);
        return Err(err);
    }

    let mut store = FileNodeStore::new(io, &mut state.header, &mut state.free);
    resolve_root(&mut store, &mut record, kind)?;
    let anchor = record.root(kind);
    let root = match link(&mut store, anchor, event.timestamp(), block.offset) {
        Ok(root) => root,
        Err(err @ MeowError::CapacityExhausted { .. }) => {
            // Reservation failed before any page was written.
            state.free.release(class, block.offset);
            return Err(err);
        }
        Err(err) => {
            match settle(&mut store, &mut record, kind, anchor, event.timestamp()) {
                Ok(reachable) => {
                    if !reachable {
                        state.free.release(class, block.offset);
                    }
                    // A failed write is retried by the next call.
                    let _ = state.directory.store_or_defer(io, slot, &record);
                }
                Err(recount) => {
                    warn!(client = %record.client_id, %kind, error = %recount, "db.recount_failed");
                }
            }
            return Err(err);
        }
    };

    record.roots[kind.index()] = root;
    record.totals[kind.index()] += 1;
    record.last_seen = event.timestamp();
    state.directory.store_or_defer(io, slot, &record)?;
    state.commit(io)?;
    debug!(
        client = %record.client_id,
        %kind,
        ts = event.timestamp(),
        offset = block.offset,
        "db.event_stored"
    );
    Ok(block.offset)
}

/// Inserts into the tree at `root`, planting the tree first when the client has none.
fn link(store: &mut FileNodeStore<'_>, root: Offset, key: u64, value: Offset) -> Result<Offset> {
    let root = if root == 0 { btree::create_root(store)? } else { root };
    btree::insert(store, root, key, value)
}

/// Moves `record` onto the root its `kind` tree has grown to. Returns whether
/// the stored root was stale.
fn resolve_root(store: &mut FileNodeStore<'_>, record: &mut ClientRecord, kind: EventKind) -> Result<bool> {
    let stored = record.root(kind);
    let root = btree::current_root(store, stored)?;
    if root == stored {
        return Ok(false);
    }
    // The record missed a split, so its counter may have missed entries too.
    let held = btree::range(store, root, 0, u64::MAX)?.len() as u64;
    debug!(client = %record.client_id, %kind, stale = stored, root, held, "db.root_resolved");
    record.roots[kind.index()] = root;
    record.totals[kind.index()] = held;
    Ok(true)
}

/// Brings `record` in line with a tree that a failed insert may have changed.
///
/// Counts what the tree now holds from its resolved root. Returns whether the
/// new entry became reachable.
fn settle(
    store: &mut FileNodeStore<'_>,
    record: &mut ClientRecord,
    kind: EventKind,
    anchor: Offset,
    ts: u64,
) -> Result<bool> {
    let root = btree::current_root(store, anchor)?;
    let held = btree::range(store, root, 0, u64::MAX)?.len() as u64;
    let reachable = held > record.total(kind);
    record.roots[kind.index()] = root;
    record.totals[kind.index()] = held;
    if reachable {
        record.last_seen = ts;
    }
    debug!(client = %record.client_id, %kind, held, reachable, "db.counter_settled");
    Ok(reachable)
}

fn query(state: &mut Inner, io: &dyn FileIo, id: &str, start: u64, end: u64) -> Result<QueryResult> {
    let (slot, mut record) = state
        .directory
        .lookup(io, id)?
        .ok_or_else(|| MeowError::ClientNotFound(id.to_owned()))?;
    let mut store = FileNodeStore::new(io, &mut state.header, &mut state.free);
    let mut moved = false;
    for kind in EventKind::ALL {
        moved |= resolve_root(&mut store, &mut record, kind)?;
    }
    let result = QueryResult {
        keystrokes: collect(io, &mut store, record.root(Keystroke::KIND), start, end)?,
        clipboard: collect(io, &mut store, record.root(Clipboard::KIND), start, end)?,
        windows: collect(io, &mut store, record.root(WindowEvent::KIND), start, end)?,
        client_id: record.client_id.clone(),
    };
    if moved {
        if let Err(err) = state.directory.store_or_defer(io, slot, &record) {
            warn!(client = %record.client_id, error = %err, "db.root_update_deferred");
        }
    }
    debug!(client = %result.client_id, start, end, events = result.len(), "db.query");
    Ok(result)
}

fn collect<E: EventRecord>(
    io: &dyn FileIo,
    store: &mut FileNodeStore<'_>,
    root: Offset,
    start: u64,
    end: u64,
) -> Result<Vec<E>> {
    let entries = btree::range(store, root, start, end)?;
    let mut buf = vec![0u8; E::LEN];
    let mut out = Vec::with_capacity(entries.len());
    for (_, offset) in entries {
        io.read_at(offset, &mut buf)?;
        out.push(E::decode(&buf)?);
    }
    Ok(out)
}
