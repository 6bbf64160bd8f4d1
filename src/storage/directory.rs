//! On-disk client directory: an open-addressed table of fixed slots with
//! linear probing, fronted by an identifier-keyed cache.
//!
//! Removal shifts the rest of the probe run backwards instead of leaving a
//! hole, so every live identifier stays reachable from its home slot without
//! any tombstone marker on disk.

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::primitives::io::FileIo;
use crate::storage::record::{stored_id, ClientRecord};
use crate::types::format::CLIENT_RECORD_LEN;
use crate::types::{client_hash, MeowError, Offset, Result};

#[derive(Clone, Debug)]
struct Cached {
    slot: usize,
    record: ClientRecord,
}

/// Slot table plus its cache.
#[derive(Debug)]
pub struct Directory {
    table_offset: Offset,
    slots: usize,
    cache: FxHashMap<String, Cached>,
    lagging: FxHashMap<usize, ClientRecord>,
}

/// A live record and the slot it occupies.
pub type SlotEntry = (usize, ClientRecord);

impl Directory {
    /// Directory over `slots` slots starting at `table_offset`.
    pub fn new(table_offset: Offset, slots: usize) -> Self {
        Self {
            table_offset,
            slots,
            cache: FxHashMap::default(),
            lagging: FxHashMap::default(),
        }
    }

    /// Slot count.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Number of cached records.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Home slot of an identifier hash.
    pub fn home(&self, hash: u32) -> usize {
        hash as usize % self.slots
    }

    fn slot_offset(&self, slot: usize) -> Offset {
        self.table_offset + (slot * CLIENT_RECORD_LEN) as u64
    }

    /// Reads one slot from disk.
    pub fn read_slot(&self, io: &dyn FileIo, slot: usize) -> Result<Option<ClientRecord>> {
        let mut buf = [0u8; CLIENT_RECORD_LEN];
        io.read_at(self.slot_offset(slot), &mut buf)?;
        ClientRecord::decode(&buf)
    }

    fn write_slot(&self, io: &dyn FileIo, slot: usize, record: &ClientRecord) -> Result<()> {
        io.write_at(self.slot_offset(slot), &record.encode())
    }

    fn clear_slot(&self, io: &dyn FileIo, slot: usize) -> Result<()> {
        io.write_at(self.slot_offset(slot), &[0u8; CLIENT_RECORD_LEN])
    }

    /// Finds `id` through the cache, then by probing from its home slot.
    pub fn lookup(&mut self, io: &dyn FileIo, id: &str) -> Result<Option<SlotEntry>> {
        let id = stored_id(id);
        if let Some(hit) = self.cache.get(id) {
            return Ok(Some((hit.slot, hit.record.clone())));
        }
        let mut slot = self.home(client_hash(id));
        for _ in 0..self.slots {
            match self.read_slot(io, slot)? {
                None => return Ok(None),
                Some(record) if record.client_id == id => {
                    trace!(client = %id, slot, "directory.probe_hit");
                    self.remember(slot, record.clone());
                    return Ok(Some((slot, record)));
                }
                Some(_) => slot = (slot + 1) % self.slots,
            }
        }
        Ok(None)
    }

    /// Finds the record owning `hash`: cache first, then a full table scan.
    pub fn find_by_hash(&mut self, io: &dyn FileIo, hash: u32) -> Result<Option<SlotEntry>> {
        if let Some(hit) = self.cache.values().find(|c| c.record.client_hash == hash) {
            return Ok(Some((hit.slot, hit.record.clone())));
        }
        for slot in 0..self.slots {
            if let Some(record) = self.read_slot(io, slot)? {
                if record.client_hash == hash {
                    self.remember(slot, record.clone());
                    return Ok(Some((slot, record)));
                }
            }
        }
        Ok(None)
    }

    /// First empty slot on the probe sequence of `id`.
    pub fn vacant_slot(&self, io: &dyn FileIo, id: &str) -> Result<usize> {
        let mut slot = self.home(client_hash(stored_id(id)));
        for _ in 0..self.slots {
            if self.read_slot(io, slot)?.is_none() {
                return Ok(slot);
            }
            slot = (slot + 1) % self.slots;
        }
        Err(MeowError::DirectoryFull(self.slots))
    }

    /// Writes `record` into `slot` and refreshes the cache.
    pub fn store(&mut self, io: &dyn FileIo, slot: usize, record: &ClientRecord) -> Result<()> {
        self.write_slot(io, slot, record)?;
        self.lagging.remove(&slot);
        self.remember(slot, record.clone());
        Ok(())
    }

    /// Like [`Directory::store`], but the cache takes `record` even when the
    /// write fails. The slot is then retried by [`Directory::catch_up`].
    ///
    /// For records that describe trees already changed on disk.
    pub fn store_or_defer(&mut self, io: &dyn FileIo, slot: usize, record: &ClientRecord) -> Result<()> {
        let written = self.store(io, slot, record);
        if written.is_err() {
            warn!(client = %record.client_id, slot, "directory.slot_deferred");
            self.remember(slot, record.clone());
            self.lagging.insert(slot, record.clone());
        }
        written
    }

    /// Slots whose on-disk record trails the cache.
    pub fn lagging(&self) -> usize {
        self.lagging.len()
    }

    /// Rewrites every deferred slot from its cached record.
    pub fn catch_up(&mut self, io: &dyn FileIo) -> Result<()> {
        let mut slots: Vec<usize> = self.lagging.keys().copied().collect();
        slots.sort_unstable();
        for slot in slots {
            if let Some(record) = self.lagging.get(&slot) {
                self.write_slot(io, slot, record)?;
                debug!(client = %record.client_id, slot, "directory.slot_caught_up");
            }
            self.lagging.remove(&slot);
        }
        Ok(())
    }

    fn remember(&mut self, slot: usize, record: ClientRecord) {
        self.cache.insert(record.client_id.clone(), Cached { slot, record });
    }

    /// Removes `id`, closing the gap in its probe run. Returns the removed record.
    pub fn remove(&mut self, io: &dyn FileIo, id: &str) -> Result<Option<ClientRecord>> {
        // The shift below moves records as they are on disk.
        self.catch_up(io)?;
        let Some((slot, record)) = self.lookup(io, id)? else {
            return Ok(None);
        };
        self.cache.remove(&record.client_id);
        self.clear_slot(io, slot)?;

        let mut hole = slot;
        let mut probe = slot;
        for _ in 1..self.slots {
            probe = (probe + 1) % self.slots;
            let Some(moved) = self.read_slot(io, probe)? else {
                break;
            };
            let home = self.home(moved.client_hash);
            // Entries whose home lies cyclically in (hole, probe] stay put.
            let stays = if hole <= probe {
                hole < home && home <= probe
            } else {
                hole < home || home <= probe
            };
            if stays {
                continue;
            }
            self.write_slot(io, hole, &moved)?;
            self.clear_slot(io, probe)?;
            debug!(client = %moved.client_id, from = probe, to = hole, "directory.shift");
            if let Some(cached) = self.cache.get_mut(&moved.client_id) {
                cached.slot = hole;
            }
            hole = probe;
        }
        Ok(Some(record))
    }

    /// Every live record on disk, in slot order.
    pub fn scan(&self, io: &dyn FileIo) -> Result<Vec<SlotEntry>> {
        let mut out = Vec::new();
        for slot in 0..self.slots {
            if let Some(record) = self.read_slot(io, slot)? {
                out.push((slot, record));
            }
        }
        Ok(out)
    }

    /// Identifiers currently cached.
    pub fn cached_ids(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }
}
