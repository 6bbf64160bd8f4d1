use std::ops::Range;

use crate::primitives::bytes::ne;
use crate::types::format::{
    CLIENT_RECORD_LEN, FORMAT_VERSION, HEADER_LEN, MAGIC, NODE_PAGE_LEN,
};
use crate::types::{MeowError, Offset, Result};

const HDR_MAGIC: Range<usize> = 0..4;
const HDR_VERSION: Range<usize> = 4..8;
const HDR_FILE_SIZE: Range<usize> = 8..16;
const HDR_CLIENT_TABLE: Range<usize> = 16..24;
const HDR_KEYSTROKE_SEED: Range<usize> = 24..32;
const HDR_CLIPBOARD_SEED: Range<usize> = 32..40;
const HDR_WINDOW_SEED: Range<usize> = 40..48;
const HDR_NUM_CLIENTS: Range<usize> = 48..52;
const HDR_MAX_CLIENTS: Range<usize> = 52..56;
const HDR_NEXT_FREE: Range<usize> = 56..64;
const HDR_RESERVED: Range<usize> = 64..HEADER_LEN;

const _: () = assert!(HDR_RESERVED.end == HEADER_LEN);

/// File header stored at offset 0.
///
/// The client table follows the header directly; the three seed tree anchors are
/// reserved node pages after the table, and `next_free_offset` is the bump cursor
/// for everything allocated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Header {
    /// Format magic, `'MEOW'`.
    pub magic: u32,
    /// Format version.
    pub version: u32,
    /// Fixed capacity of the pre-allocated file.
    pub file_size: u64,
    /// Offset of the first directory slot.
    pub client_table_offset: Offset,
    /// Reserved keystroke tree anchor.
    pub keystroke_tree_offset: Offset,
    /// Reserved clipboard tree anchor.
    pub clipboard_tree_offset: Offset,
    /// Reserved window tree anchor.
    pub window_tree_offset: Offset,
    /// Registered (not deleted) clients.
    pub num_clients: u32,
    /// Upper bound on registered clients.
    pub max_clients: u32,
    /// Bump allocation cursor.
    pub next_free_offset: Offset,
}

impl Header {
    /// Lays out a fresh file: header, `table_slots` directory slots, three seed pages.
    pub fn new(file_size: u64, table_slots: usize, max_clients: u32) -> Result<Self> {
        if table_slots == 0 {
            return Err(MeowError::Invalid("directory needs at least one slot"));
        }
        let client_table_offset = HEADER_LEN as u64;
        let keystroke_tree_offset = client_table_offset + (table_slots * CLIENT_RECORD_LEN) as u64;
        let clipboard_tree_offset = keystroke_tree_offset + NODE_PAGE_LEN as u64;
        let window_tree_offset = clipboard_tree_offset + NODE_PAGE_LEN as u64;
        let next_free_offset = window_tree_offset + NODE_PAGE_LEN as u64;
        if next_free_offset > file_size {
            return Err(MeowError::Invalid(
                "capacity smaller than header, directory, and seed pages",
            ));
        }
        Ok(Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            file_size,
            client_table_offset,
            keystroke_tree_offset,
            clipboard_tree_offset,
            window_tree_offset,
            num_clients: 0,
            max_clients,
            next_free_offset,
        })
    }

    /// Number of directory slots implied by the region layout.
    pub fn table_slots(&self) -> usize {
        (self.keystroke_tree_offset.saturating_sub(self.client_table_offset) as usize)
            / CLIENT_RECORD_LEN
    }

    /// Bytes still available to the bump cursor.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.next_free_offset)
    }

    /// Serializes into a 256-byte image.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        ne::put_u32(&mut buf[HDR_MAGIC], self.magic);
        ne::put_u32(&mut buf[HDR_VERSION], self.version);
        ne::put_u64(&mut buf[HDR_FILE_SIZE], self.file_size);
        ne::put_u64(&mut buf[HDR_CLIENT_TABLE], self.client_table_offset);
        ne::put_u64(&mut buf[HDR_KEYSTROKE_SEED], self.keystroke_tree_offset);
        ne::put_u64(&mut buf[HDR_CLIPBOARD_SEED], self.clipboard_tree_offset);
        ne::put_u64(&mut buf[HDR_WINDOW_SEED], self.window_tree_offset);
        ne::put_u32(&mut buf[HDR_NUM_CLIENTS], self.num_clients);
        ne::put_u32(&mut buf[HDR_MAX_CLIENTS], self.max_clients);
        ne::put_u64(&mut buf[HDR_NEXT_FREE], self.next_free_offset);
        buf
    }

    /// Parses a header image without validating it.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(MeowError::Corruption(format!(
                "header truncated: {} of {HEADER_LEN} bytes",
                buf.len()
            )));
        }
        Ok(Self {
            magic: ne::get_u32(&buf[HDR_MAGIC]),
            version: ne::get_u32(&buf[HDR_VERSION]),
            file_size: ne::get_u64(&buf[HDR_FILE_SIZE]),
            client_table_offset: ne::get_u64(&buf[HDR_CLIENT_TABLE]),
            keystroke_tree_offset: ne::get_u64(&buf[HDR_KEYSTROKE_SEED]),
            clipboard_tree_offset: ne::get_u64(&buf[HDR_CLIPBOARD_SEED]),
            window_tree_offset: ne::get_u64(&buf[HDR_WINDOW_SEED]),
            num_clients: ne::get_u32(&buf[HDR_NUM_CLIENTS]),
            max_clients: ne::get_u32(&buf[HDR_MAX_CLIENTS]),
            next_free_offset: ne::get_u64(&buf[HDR_NEXT_FREE]),
        })
    }

    /// Checks magic, version, and region layout of a header read from disk.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(MeowError::BadMagic { found: self.magic });
        }
        if self.version != FORMAT_VERSION {
            return Err(MeowError::UnsupportedVersion(self.version));
        }
        if self.client_table_offset != HEADER_LEN as u64 {
            return Err(MeowError::Corruption(format!(
                "client table offset {} does not follow the header",
                self.client_table_offset
            )));
        }
        let table_bytes = self.keystroke_tree_offset.saturating_sub(self.client_table_offset);
        if table_bytes == 0 || table_bytes % CLIENT_RECORD_LEN as u64 != 0 {
            return Err(MeowError::Corruption(format!(
                "client table spans {table_bytes} bytes, not a whole number of slots"
            )));
        }
        if self.next_free_offset < self.window_tree_offset + NODE_PAGE_LEN as u64
            || self.next_free_offset > self.file_size
        {
            return Err(MeowError::Corruption(format!(
                "bump cursor {} outside [{}, {}]",
                self.next_free_offset,
                self.window_tree_offset + NODE_PAGE_LEN as u64,
                self.file_size
            )));
        }
        Ok(())
    }
}
