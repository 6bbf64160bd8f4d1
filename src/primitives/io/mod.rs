//! Positioned reads and writes against the database file.
//!
//! The engine only ever touches the file through [`FileIo`]: whole-buffer
//! reads and writes at absolute offsets, a length, a resize, and a sync.
//! [`StdFileIo`] serves a real file; [`MemFileIo`] keeps the bytes on the heap
//! and can be told to start failing writes.
#![forbid(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::types::{MeowError, Result};

/// Offset-addressed access to one file.
///
/// Reads and writes either move the whole buffer or fail; a short read at the
/// end of the file is an error, never a partial fill.
pub trait FileIo: Send + Sync + 'static {
    /// Fills `dst` from `off`.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` at `off`.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Flushes data and metadata to stable storage.
    fn sync_all(&self) -> Result<()>;
    /// Current length in bytes.
    fn len(&self) -> Result<u64>;
    /// Whether the file has no bytes yet.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Grows or shrinks the file to `len`; new bytes read as zero.
    fn truncate(&self, len: u64) -> Result<()>;
}

/// [`FileIo`] over an open [`File`], shareable across clones.
#[derive(Clone)]
pub struct StdFileIo {
    file: Arc<File>,
}

impl StdFileIo {
    /// Wraps an already opened handle.
    pub fn new(file: File) -> Self {
        Self { file: Arc::new(file) }
    }

    /// Opens `path` for reading and writing, creating it empty when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::new(file))
    }
}

#[cfg(unix)]
fn pread(file: &File, off: u64, dst: &mut [u8]) -> io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, dst, off)
}

#[cfg(unix)]
fn pwrite(file: &File, off: u64, src: &[u8]) -> io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, src, off)
}

#[cfg(windows)]
fn pread(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !dst.is_empty() {
        match file.seek_read(dst, off)? {
            0 => return Err(io::ErrorKind::UnexpectedEof.into()),
            n => {
                dst = &mut dst[n..];
                off += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn pwrite(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !src.is_empty() {
        match file.seek_write(src, off)? {
            0 => return Err(io::ErrorKind::WriteZero.into()),
            n => {
                src = &src[n..];
                off += n as u64;
            }
        }
    }
    Ok(())
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        Ok(pread(&self.file, off, dst)?)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        Ok(pwrite(&self.file, off, src)?)
    }

    fn sync_all(&self) -> Result<()> {
        self.file.sync_all().map_err(|err| {
            error!(error = %err, "io.sync_failed");
            MeowError::from(err)
        })
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        Ok(self.file.set_len(len)?)
    }
}

/// Heap-backed [`FileIo`] used by tests and tooling.
///
/// Writes past the current end grow the buffer like a sparse file would. A
/// write budget can be armed to make later writes fail, which is how I/O
/// failures are exercised without a real device.
#[derive(Clone, Default)]
pub struct MemFileIo {
    state: Arc<Mutex<MemState>>,
}

#[derive(Default)]
struct MemState {
    data: Vec<u8>,
    writes_left: Option<usize>,
    syncs: u64,
}

impl MemFileIo {
    /// Creates an empty in-memory file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `n` more successful writes, after which every write fails.
    pub fn fail_writes_after(&self, n: usize) {
        self.state.lock().writes_left = Some(n);
    }

    /// Removes any armed write failure.
    pub fn clear_failures(&self) {
        self.state.lock().writes_left = None;
    }

    /// Number of `sync_all` calls observed so far.
    pub fn sync_count(&self) -> u64 {
        self.state.lock().syncs
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }
}

impl FileIo for MemFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let state = self.state.lock();
        let start = off as usize;
        let end = start
            .checked_add(dst.len())
            .ok_or(MeowError::Invalid("read offset overflow"))?;
        if end > state.data.len() {
            return Err(MeowError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of in-memory file",
            )));
        }
        dst.copy_from_slice(&state.data[start..end]);
        Ok(())
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(left) = state.writes_left.as_mut() {
            if *left == 0 {
                return Err(MeowError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "injected write failure",
                )));
            }
            *left -= 1;
        }
        let start = off as usize;
        let end = start
            .checked_add(src.len())
            .ok_or(MeowError::Invalid("write offset overflow"))?;
        if end > state.data.len() {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(src);
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        self.state.lock().syncs += 1;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.state.lock().data.len() as u64)
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.state.lock().data.resize(len as usize, 0);
        Ok(())
    }
}
