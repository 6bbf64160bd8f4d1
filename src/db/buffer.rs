//! Per-client batching in front of the engine.
//!
//! A [`ClientSession`] owns one buffer per event kind. Adding an event flushes
//! that kind once its buffer reaches the flush threshold; a flush delivers at
//! most one threshold's worth of events, oldest first. Events a sink refuses
//! stay buffered for the next attempt.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::storage::record::stored_id;
use crate::storage::{ClientRecord, Clipboard, EventRecord, Keystroke, WindowEvent};
use crate::types::{client_hash, EventKind, MeowError, Result};

/// Destination of flushed events.
pub trait EventSink {
    /// Persists one keystroke for the client owning `client_hash`.
    fn store_keystroke(&self, client_hash: u32, event: &Keystroke) -> Result<()>;
    /// Persists one clipboard capture.
    fn store_clipboard(&self, client_hash: u32, event: &Clipboard) -> Result<()>;
    /// Persists one window change.
    fn store_window(&self, client_hash: u32, event: &WindowEvent) -> Result<()>;
    /// Called once when a session closes.
    fn end_session(&self, _client_id: &str) -> Result<()> {
        Ok(())
    }
}

impl EventSink for Database {
    fn store_keystroke(&self, client_hash: u32, event: &Keystroke) -> Result<()> {
        self.insert_keystroke(client_hash, event).map(drop)
    }

    fn store_clipboard(&self, client_hash: u32, event: &Clipboard) -> Result<()> {
        self.insert_clipboard(client_hash, event).map(drop)
    }

    fn store_window(&self, client_hash: u32, event: &WindowEvent) -> Result<()> {
        self.insert_window(client_hash, event).map(drop)
    }

    fn end_session(&self, client_id: &str) -> Result<()> {
        self.deactivate_client(client_id)
    }
}

/// Kinds that know how to hand themselves to a sink.
pub trait Deliver: EventRecord {
    /// Sends `self` to the matching sink method.
    fn deliver<S: EventSink + ?Sized>(&self, sink: &S, client_hash: u32) -> Result<()>;
}

impl Deliver for Keystroke {
    fn deliver<S: EventSink + ?Sized>(&self, sink: &S, client_hash: u32) -> Result<()> {
        sink.store_keystroke(client_hash, self)
    }
}

impl Deliver for Clipboard {
    fn deliver<S: EventSink + ?Sized>(&self, sink: &S, client_hash: u32) -> Result<()> {
        sink.store_clipboard(client_hash, self)
    }
}

impl Deliver for WindowEvent {
    fn deliver<S: EventSink + ?Sized>(&self, sink: &S, client_hash: u32) -> Result<()> {
        sink.store_window(client_hash, self)
    }
}

/// Capacity and flush threshold of one kind's buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferLimits {
    /// Events held before `push` refuses more.
    pub capacity: usize,
    /// Size that triggers a flush, and the most one flush delivers.
    pub flush_at: usize,
}

impl BufferLimits {
    /// Limits used for `kind` by [`ClientSession`].
    pub const fn for_kind(kind: EventKind) -> Self {
        match kind {
            EventKind::Keystroke => Self { capacity: 50, flush_at: 25 },
            EventKind::Clipboard => Self { capacity: 5, flush_at: 3 },
            EventKind::Window => Self { capacity: 10, flush_at: 5 },
        }
    }
}

/// FIFO of pending events of one kind.
#[derive(Debug)]
pub struct EventBuffer<E> {
    pending: VecDeque<E>,
    limits: BufferLimits,
}

impl<E: Deliver> EventBuffer<E> {
    /// Empty buffer with the default limits for `E`.
    pub fn new() -> Self {
        Self::with_limits(BufferLimits::for_kind(E::KIND))
    }

    /// Empty buffer with explicit limits.
    pub fn with_limits(limits: BufferLimits) -> Self {
        Self {
            pending: VecDeque::with_capacity(limits.capacity),
            limits,
        }
    }

    /// Pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Nothing pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the flush threshold has been reached.
    pub fn needs_flush(&self) -> bool {
        self.pending.len() >= self.limits.flush_at
    }

    /// Limits in force.
    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Appends one event; fails when the buffer is at capacity.
    pub fn push(&mut self, event: E) -> Result<()> {
        if self.pending.len() >= self.limits.capacity {
            return Err(MeowError::Invalid("event buffer full"));
        }
        self.pending.push_back(event);
        Ok(())
    }

    /// Delivers up to one threshold's worth of events, oldest first.
    ///
    /// Stops at the first refused event, which stays at the front. Returns how
    /// many were delivered.
    pub fn flush<S: EventSink + ?Sized>(&mut self, sink: &S, client_hash: u32) -> Result<usize> {
        let batch = self.pending.len().min(self.limits.flush_at);
        for delivered in 0..batch {
            let Some(event) = self.pending.front() else {
                return Ok(delivered);
            };
            if let Err(err) = event.deliver(sink, client_hash) {
                warn!(kind = %E::KIND, delivered, pending = self.pending.len(), "buffer.flush_stalled");
                return Err(err);
            }
            self.pending.pop_front();
        }
        Ok(batch)
    }

    /// Flushes until empty.
    pub fn drain<S: EventSink + ?Sized>(&mut self, sink: &S, client_hash: u32) -> Result<usize> {
        let mut total = 0;
        while !self.pending.is_empty() {
            total += self.flush(sink, client_hash)?;
        }
        Ok(total)
    }
}

impl<E: Deliver> Default for EventBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending counts of a session, one per kind.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferStatus {
    /// Buffered keystrokes.
    pub keystrokes: usize,
    /// Buffered clipboard captures.
    pub clipboard: usize,
    /// Buffered window changes.
    pub windows: usize,
}

/// One connected client's buffers in front of a sink.
pub struct ClientSession<'a, S: EventSink + ?Sized = Database> {
    sink: &'a S,
    client_id: String,
    client_hash: u32,
    sequence: u32,
    keystrokes: EventBuffer<Keystroke>,
    clipboard: EventBuffer<Clipboard>,
    windows: EventBuffer<WindowEvent>,
}

impl<'a> ClientSession<'a, Database> {
    /// Registers `client_id` with `db` and starts a session for it.
    pub fn open(db: &'a Database, client_id: &str) -> Result<(Self, ClientRecord)> {
        let (record, existed) = db.register_client(client_id)?;
        info!(client = %record.client_id, existed, "session.opened");
        let session = Self::attach(db, &record.client_id);
        Ok((session, record))
    }
}

impl<'a, S: EventSink + ?Sized> ClientSession<'a, S> {
    /// Session over an already registered client.
    pub fn attach(sink: &'a S, client_id: &str) -> Self {
        let client_id = stored_id(client_id);
        Self {
            sink,
            client_id: client_id.to_owned(),
            client_hash: client_hash(client_id),
            sequence: 0,
            keystrokes: EventBuffer::new(),
            clipboard: EventBuffer::new(),
            windows: EventBuffer::new(),
        }
    }

    /// Identifier the session writes for.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Hash used to address the sink.
    pub fn client_hash(&self) -> u32 {
        self.client_hash
    }

    /// Buffers a keystroke, stamping the next sequence number.
    pub fn add_keystroke(&mut self, timestamp: u64, key: &str) -> Result<usize> {
        let event = Keystroke::new(timestamp, self.sequence, key);
        self.sequence = self.sequence.wrapping_add(1);
        Self::add(&mut self.keystrokes, self.sink, self.client_hash, event)
    }

    /// Buffers a clipboard capture.
    pub fn add_clipboard(&mut self, timestamp: u64, content: &str) -> Result<usize> {
        Self::add(&mut self.clipboard, self.sink, self.client_hash, Clipboard::new(timestamp, content))
    }

    /// Buffers a window change.
    pub fn add_window(&mut self, timestamp: u64, title: &str, process: &str) -> Result<usize> {
        let event = WindowEvent::new(timestamp, title, process);
        Self::add(&mut self.windows, self.sink, self.client_hash, event)
    }

    fn add<E: Deliver>(buffer: &mut EventBuffer<E>, sink: &S, hash: u32, event: E) -> Result<usize> {
        if buffer.len() >= buffer.limits().capacity {
            buffer.flush(sink, hash)?;
        }
        buffer.push(event)?;
        if buffer.needs_flush() {
            return buffer.flush(sink, hash);
        }
        Ok(0)
    }

    /// Delivers everything pending in every kind.
    pub fn flush_all(&mut self) -> Result<usize> {
        let mut total = self.keystrokes.drain(self.sink, self.client_hash)?;
        total += self.clipboard.drain(self.sink, self.client_hash)?;
        total += self.windows.drain(self.sink, self.client_hash)?;
        debug!(client = %self.client_id, total, "session.flushed");
        Ok(total)
    }

    /// Pending counts.
    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            keystrokes: self.keystrokes.len(),
            clipboard: self.clipboard.len(),
            windows: self.windows.len(),
        }
    }

    /// Flushes everything, then ends the session at the sink.
    pub fn close(mut self) -> Result<usize> {
        let flushed = self.flush_all()?;
        self.sink.end_session(&self.client_id)?;
        info!(client = %self.client_id, flushed, "session.closed");
        Ok(flushed)
    }
}
