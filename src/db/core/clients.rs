use rustc_hash::FxHashSet;
use tracing::{debug, info};

use super::{traced, Database, Inner};
use crate::primitives::io::FileIo;
use crate::storage::btree::{self, FileNodeStore, NodeStore};
use crate::storage::record::stored_id;
use crate::storage::{BlockClass, ClientRecord};
use crate::types::{now_micros, EventKind, MeowError, Result};

impl Database {
    /// Registers `id`, or reactivates it when a live record already exists.
    ///
    /// Returns the stored record and whether it existed. Reactivation bumps the
    /// session counter and keeps every event counter and tree.
    pub fn register_client(&self, id: &str) -> Result<(ClientRecord, bool)> {
        traced("register_client", self.with_state(|state, io| register(state, io, id)))
    }

    /// Marks `id` inactive without touching its events.
    pub fn deactivate_client(&self, id: &str) -> Result<()> {
        traced(
            "deactivate_client",
            self.with_state(|state, io| {
                let (slot, mut record) = state
                    .directory
                    .lookup(io, id)?
                    .ok_or_else(|| MeowError::ClientNotFound(id.to_owned()))?;
                if !record.is_active {
                    debug!(client = %record.client_id, "db.already_inactive");
                    return Ok(());
                }
                record.is_active = false;
                record.last_seen = now_micros();
                state.directory.store(io, slot, &record)?;
                state.commit(io)?;
                info!(client = %record.client_id, "db.client_deactivated");
                Ok(())
            }),
        )
    }

    /// Removes `id` and hands its pages and payload blocks to the free lists.
    ///
    /// The directory entry is gone and synced before reclamation starts, so a
    /// failure while walking the trees leaks space but never resurrects the client.
    pub fn delete_client(&self, id: &str) -> Result<()> {
        traced("delete_client", self.with_state(|state, io| delete(state, io, id)))
    }

    /// Whether a live record exists for `id`.
    pub fn client_exists(&self, id: &str) -> Result<bool> {
        traced(
            "client_exists",
            self.with_state(|state, io| Ok(state.directory.lookup(io, id)?.is_some())),
        )
    }

    /// Current record for `id`.
    pub fn get_client_stats(&self, id: &str) -> Result<ClientRecord> {
        traced(
            "get_client_stats",
            self.with_state(|state, io| {
                state
                    .directory
                    .lookup(io, id)?
                    .map(|(_, record)| record)
                    .ok_or_else(|| MeowError::ClientNotFound(id.to_owned()))
            }),
        )
    }

    /// Identifiers of every live client, in slot order.
    pub fn get_all_clients(&self) -> Result<Vec<String>> {
        traced(
            "get_all_clients",
            self.with_state(|state, io| {
                let mut ids: Vec<String> = state
                    .directory
                    .scan(io)?
                    .into_iter()
                    .map(|(_, record)| record.client_id)
                    .collect();
                let mut seen: FxHashSet<String> = ids.iter().cloned().collect();
                for cached in state.directory.cached_ids() {
                    if seen.insert(cached.to_owned()) {
                        ids.push(cached.to_owned());
                    }
                }
                Ok(ids)
            }),
        )
    }
}

fn register(state: &mut Inner, io: &dyn FileIo, id: &str) -> Result<(ClientRecord, bool)> {
    if stored_id(id).is_empty() {
        return Err(MeowError::Invalid("client id must not be empty"));
    }
    let now = now_micros();
    if let Some((slot, mut record)) = state.directory.lookup(io, id)? {
        record.is_active = true;
        record.session_count = record.session_count.saturating_add(1);
        record.last_seen = now;
        state.directory.store(io, slot, &record)?;
        state.commit(io)?;
        info!(client = %record.client_id, sessions = record.session_count, "db.client_resumed");
        return Ok((record, true));
    }

    if state.header.num_clients >= state.header.max_clients {
        return Err(MeowError::ClientLimit(state.header.max_clients));
    }
    let slot = state.directory.vacant_slot(io, id)?;
    let mut record = ClientRecord::new(id, now);

    let mut store = FileNodeStore::new(io, &mut state.header, &mut state.free);
    for kind in EventKind::ALL {
        match btree::create_root(&mut store) {
            Ok(root) => record.roots[kind.index()] = root,
            Err(err) => {
                for root in record.roots.iter().filter(|r| **r != 0) {
                    store.release_node(*root);
                }
                return Err(err);
            }
        }
    }

    state.directory.store(io, slot, &record)?;
    state.header.num_clients += 1;
    state.write_header(io)?;
    state.commit(io)?;
    info!(client = %record.client_id, slot, "db.client_registered");
    Ok((record, false))
}

fn delete(state: &mut Inner, io: &dyn FileIo, id: &str) -> Result<()> {
    let record = state
        .directory
        .remove(io, id)?
        .ok_or_else(|| MeowError::ClientNotFound(id.to_owned()))?;
    state.header.num_clients = state.header.num_clients.saturating_sub(1);
    state.write_header(io)?;
    io.sync_all()?;

    let mut first_err = None;
    let mut pages = 0;
    let mut blocks = 0;
    for kind in EventKind::ALL {
        let mut store = FileNodeStore::new(io, &mut state.header, &mut state.free);
        let reclaimed = btree::current_root(&mut store, record.root(kind))
            .and_then(|root| btree::reclaim(&mut store, root));
        match reclaimed {
            Ok(reclaimed) => {
                pages += reclaimed.nodes;
                blocks += reclaimed.values.len();
                for offset in reclaimed.values {
                    state.free.release(BlockClass::Data(kind), offset);
                }
            }
            Err(err) => {
                first_err.get_or_insert(err);
            }
        }
    }
    info!(client = %record.client_id, pages, blocks, "db.client_deleted");
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
