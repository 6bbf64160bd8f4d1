//! The `Database` engine: one file, one lock, three trees per client.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::db::config::{EngineOptions, Synchronous};
use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::{Directory, FreeSpace, Header};
use crate::types::format::{CLIENT_RECORD_LEN, HEADER_LEN};
use crate::types::{MeowError, Result};

mod clients;
mod events;

pub use events::QueryResult;

/// Engine state guarded by the database lock.
pub(crate) struct Inner {
    pub(crate) io: Option<Arc<dyn FileIo>>,
    pub(crate) header: Header,
    pub(crate) free: FreeSpace,
    pub(crate) directory: Directory,
    pub(crate) synchronous: Synchronous,
}

impl Inner {
    pub(crate) fn io(&self) -> Result<Arc<dyn FileIo>> {
        self.io.clone().ok_or(MeowError::Closed)
    }

    /// Persists the in-memory header.
    pub(crate) fn write_header(&self, io: &dyn FileIo) -> Result<()> {
        io.write_at(0, &self.header.encode())
    }

    /// Ends a mutating call according to the durability mode.
    pub(crate) fn commit(&self, io: &dyn FileIo) -> Result<()> {
        match self.synchronous {
            Synchronous::Full => io.sync_all(),
            Synchronous::Off => Ok(()),
        }
    }
}

/// Embedded single-file event store.
///
/// Every public operation takes the same lock for its whole duration, so calls
/// from many threads are serialized. Between calls the directory cache matches
/// the slots on disk, except for records whose write failed; those are
/// rewritten at the start of the next call.
pub struct Database {
    inner: Mutex<Inner>,
}

/// Logs a failed public operation before handing the error back.
pub(crate) fn traced<T>(op: &'static str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        match err {
            MeowError::Io(_) | MeowError::Corruption(_) => error!(op, error = %err, "db.failed"),
            _ => warn!(op, error = %err, "db.failed"),
        }
    }
    result
}

impl Database {
    /// Opens `path`, creating and pre-allocating it when absent or empty.
    pub fn open(path: impl AsRef<Path>, opts: EngineOptions) -> Result<Self> {
        let path = path.as_ref();
        let db = traced(
            "open",
            StdFileIo::open(path).and_then(|io| Self::open_with_io(Arc::new(io), opts)),
        )?;
        info!(path = %path.display(), "db.opened");
        Ok(db)
    }

    /// [`Database::open`] with [`EngineOptions::default`].
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, EngineOptions::default())
    }

    /// Opens a database over an arbitrary [`FileIo`].
    pub fn open_with_io(io: Arc<dyn FileIo>, opts: EngineOptions) -> Result<Self> {
        opts.validate()?;
        let len = io.len()?;
        let header = if len == 0 {
            initialize(io.as_ref(), &opts)?
        } else {
            load_header(io.as_ref(), len)?
        };
        let directory = Directory::new(header.client_table_offset, header.table_slots());
        Ok(Self {
            inner: Mutex::new(Inner {
                io: Some(io),
                header,
                free: FreeSpace::new(),
                directory,
                synchronous: opts.synchronous,
            }),
        })
    }

    /// Writes deferred client records and the header, syncs, and releases the file. Later calls fail with
    /// [`MeowError::Closed`]; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.inner.lock();
        let Some(io) = state.io.clone() else {
            return Ok(());
        };
        let flushed = state
            .directory
            .catch_up(io.as_ref())
            .and_then(|()| state.write_header(io.as_ref()))
            .and_then(|()| io.sync_all());
        traced("close", flushed)?;
        state.io = None;
        info!(clients = state.header.num_clients, "db.closed");
        Ok(())
    }

    /// Writes deferred client records and the header, then syncs regardless
    /// of the durability mode.
    pub fn sync_to_disk(&self) -> Result<()> {
        let mut state = self.inner.lock();
        let result = state.io().and_then(|io| {
            state.directory.catch_up(io.as_ref())?;
            state.write_header(io.as_ref())?;
            io.sync_all()
        });
        traced("sync_to_disk", result)
    }

    /// Copy of the in-memory header.
    pub fn header(&self) -> Result<Header> {
        let state = self.inner.lock();
        state.io()?;
        Ok(state.header.clone())
    }

    /// Whether [`Database::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().io.is_none()
    }

    /// Runs `f` under the engine lock with the open file, first retrying any
    /// client record whose write failed earlier.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut Inner, &dyn FileIo) -> Result<R>) -> Result<R> {
        let mut state = self.inner.lock();
        let io = state.io()?;
        if state.directory.lagging() > 0 {
            if let Err(err) = state.directory.catch_up(io.as_ref()) {
                warn!(error = %err, lagging = state.directory.lagging(), "db.catch_up_failed");
            }
        }
        f(&mut *state, io.as_ref())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "db.close_on_drop_failed");
        }
    }
}

fn initialize(io: &dyn FileIo, opts: &EngineOptions) -> Result<Header> {
    let header = Header::new(opts.capacity_bytes, opts.table_slots, opts.max_clients)?;
    io.truncate(header.file_size)?;
    io.write_at(0, &header.encode())?;
    let table = vec![0u8; header.table_slots() * CLIENT_RECORD_LEN];
    io.write_at(header.client_table_offset, &table)?;
    io.sync_all()?;
    info!(
        capacity = header.file_size,
        slots = header.table_slots(),
        max_clients = header.max_clients,
        "db.initialized"
    );
    Ok(header)
}

fn load_header(io: &dyn FileIo, len: u64) -> Result<Header> {
    if len < HEADER_LEN as u64 {
        return Err(MeowError::Corruption(format!(
            "file of {len} bytes cannot hold a header"
        )));
    }
    let mut buf = [0u8; HEADER_LEN];
    io.read_at(0, &mut buf)?;
    let header = Header::decode(&buf)?;
    header.validate()?;
    if len < header.file_size {
        return Err(MeowError::Corruption(format!(
            "file is {len} bytes, header records capacity {}",
            header.file_size
        )));
    }
    info!(
        clients = header.num_clients,
        used = header.next_free_offset,
        capacity = header.file_size,
        "db.loaded"
    );
    Ok(header)
}
