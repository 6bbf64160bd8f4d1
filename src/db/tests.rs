use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::*;
use crate::primitives::io::{FileIo, MemFileIo};
use crate::storage::{Clipboard, Keystroke, WindowEvent};
use crate::types::{client_hash, MeowError, Result};

const CAP: u64 = 256 * 1024;

fn mem_db(opts: EngineOptions) -> (Database, MemFileIo) {
    let io = MemFileIo::new();
    let db = Database::open_with_io(Arc::new(io.clone()), opts).expect("open in-memory db");
    (db, io)
}

fn small_db() -> (Database, MemFileIo) {
    mem_db(EngineOptions::small(CAP))
}

fn key_ts(result: &QueryResult) -> Vec<u64> {
    result.keystrokes.iter().map(|k| k.timestamp).collect()
}

#[test]
fn fresh_file_is_preallocated_with_header_and_table() {
    let (db, io) = small_db();
    assert_eq!(io.len().unwrap(), CAP);
    let header = db.header().unwrap();
    assert_eq!(header.file_size, CAP);
    assert_eq!(header.num_clients, 0);
    assert_eq!(header.client_table_offset, 256);
    assert_eq!(header.keystroke_tree_offset, 256 + 64 * 256);
    assert_eq!(header.next_free_offset, header.window_tree_offset + 4096);
    assert_eq!(&io.snapshot()[..4], &crate::types::format::MAGIC.to_ne_bytes());
}

#[test]
fn register_then_resume_counts_sessions() {
    let (db, _io) = small_db();
    let (first, existed) = db.register_client("alice").unwrap();
    assert!(!existed);
    assert_eq!(first.session_count, 1);
    assert!(first.is_active);
    assert!(first.roots.iter().all(|r| *r != 0));

    db.deactivate_client("alice").unwrap();
    assert!(!db.get_client_stats("alice").unwrap().is_active);

    let (again, existed) = db.register_client("alice").unwrap();
    assert!(existed);
    assert_eq!(again.session_count, 2);
    assert!(again.is_active);
    assert_eq!(again.roots, first.roots);
    assert_eq!(db.header().unwrap().num_clients, 1);
}

#[test]
fn empty_id_is_rejected() {
    let (db, _io) = small_db();
    assert!(matches!(db.register_client(""), Err(MeowError::Invalid(_))));
}

#[test]
fn long_ids_are_truncated_consistently() {
    let (db, _io) = small_db();
    let long = "c".repeat(100);
    let (record, _) = db.register_client(&long).unwrap();
    assert_eq!(record.client_id.len(), 63);
    assert!(db.client_exists(&long).unwrap());
    assert_eq!(record.client_hash, client_hash(&record.client_id));
}

#[test]
fn ids_end_at_their_first_nul() {
    let io = MemFileIo::new();
    {
        let db = Database::open_with_io(Arc::new(io.clone()), EngineOptions::small(CAP)).unwrap();
        let (record, existed) = db.register_client("a\0b").unwrap();
        assert!(!existed);
        assert_eq!(record.client_id, "a");
        assert_eq!(record.client_hash, client_hash("a"));
        assert!(db.client_exists("a").unwrap());
        assert!(matches!(db.register_client("\0lead"), Err(MeowError::Invalid(_))));
        assert_eq!(db.header().unwrap().num_clients, 1);
    }
    let db = Database::open_with_io(Arc::new(io), EngineOptions::small(CAP)).unwrap();
    assert!(db.client_exists("a\0b").unwrap());
    assert!(db.client_exists("a\0other").unwrap());
    let (again, existed) = db.register_client("a\0b").unwrap();
    assert!(existed);
    assert_eq!(again.session_count, 2);
    assert_eq!(db.get_all_clients().unwrap(), vec!["a".to_string()]);
    assert_eq!(db.header().unwrap().num_clients, 1);
    assert!(db.verify().unwrap().is_clean());
}

#[test]
fn keys_and_titles_read_back_as_constructed() {
    let (db, _io) = small_db();
    let (alice, _) = db.register_client("alice").unwrap();
    let key = Keystroke::new(1, 0, "Ctrl\0C");
    let window = WindowEvent::new(2, "Report\0draft", "writer");
    db.insert_keystroke(alice.client_hash, &key).unwrap();
    db.insert_window(alice.client_hash, &window).unwrap();
    let all = db.query_client_all_events("alice").unwrap();
    assert_eq!(all.keystrokes[0].key, key.key);
    assert_eq!(all.keystrokes[0].key, "Ctrl");
    assert_eq!(all.windows[0].title, "Report");
    assert_eq!(all.windows[0].process, "writer");
}

#[test]
fn range_query_is_inclusive_and_ordered() {
    let (db, _io) = small_db();
    let (alice, _) = db.register_client("alice").unwrap();
    for ts in [300, 100, 200] {
        db.insert_keystroke(alice.client_hash, &Keystroke::new(ts, 0, "k")).unwrap();
    }
    db.insert_clipboard(alice.client_hash, &Clipboard::new(150, "copied")).unwrap();
    db.insert_window(alice.client_hash, &WindowEvent::new(250, "Terminal", "bash")).unwrap();

    let all = db.query_client_all_events("alice").unwrap();
    assert_eq!(key_ts(&all), vec![100, 200, 300]);
    assert_eq!(all.len(), 5);

    let some = db.query_client_events_by_time_range("alice", 150, 300).unwrap();
    assert_eq!(key_ts(&some), vec![200, 300]);
    assert_eq!(some.clipboard[0].content, "copied");
    assert_eq!(some.windows[0].title, "Terminal");
    assert_eq!(some.windows[0].process, "bash");

    assert!(db.query_client_events_by_time_range("alice", 301, 400).unwrap().is_empty());
    assert!(db.query_client_events_by_time_range("alice", 300, 100).unwrap().is_empty());

    let stats = db.get_client_stats("alice").unwrap();
    assert_eq!(stats.totals, [3, 1, 1]);
    assert_eq!(stats.last_seen, 250);
}

#[test]
fn equal_timestamps_keep_insertion_order() {
    let (db, _io) = small_db();
    let (alice, _) = db.register_client("alice").unwrap();
    for (seq, key) in ["a", "b", "c"].iter().enumerate() {
        db.insert_keystroke(alice.client_hash, &Keystroke::new(500, seq as u32, key)).unwrap();
    }
    let hits = db.query_client_events_by_time_range("alice", 500, 500).unwrap();
    let keys: Vec<&str> = hits.keystrokes.iter().map(|k| k.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
}

#[test]
fn inserts_are_stamped_with_the_owner_hash() {
    let (db, _io) = small_db();
    let (bob, _) = db.register_client("bob").unwrap();
    let mut event = Keystroke::new(1, 0, "x");
    event.client_hash = 0xDEAD_BEEF;
    assert!(matches!(
        db.insert_keystroke(0xDEAD_BEEF, &event),
        Err(MeowError::UnknownClientHash(0xDEAD_BEEF))
    ));
    db.insert_keystroke(bob.client_hash, &event).unwrap();
    let stored = db.query_client_all_events("bob").unwrap();
    assert_eq!(stored.keystrokes[0].client_hash, bob.client_hash);
}

#[test]
fn missing_clients_are_reported() {
    let (db, _io) = small_db();
    assert!(!db.client_exists("ghost").unwrap());
    assert!(matches!(db.get_client_stats("ghost"), Err(MeowError::ClientNotFound(_))));
    assert!(matches!(db.deactivate_client("ghost"), Err(MeowError::ClientNotFound(_))));
    assert!(matches!(db.delete_client("ghost"), Err(MeowError::ClientNotFound(_))));
    assert!(matches!(
        db.query_client_all_events("ghost"),
        Err(MeowError::ClientNotFound(_))
    ));
}

#[test]
fn inactive_clients_still_accept_events() {
    let (db, _io) = small_db();
    let (carol, _) = db.register_client("carol").unwrap();
    db.deactivate_client("carol").unwrap();
    db.deactivate_client("carol").unwrap();
    db.insert_keystroke(carol.client_hash, &Keystroke::new(10, 0, "z")).unwrap();
    assert_eq!(db.get_client_stats("carol").unwrap().totals[0], 1);
}

#[test]
fn delete_then_register_starts_fresh_and_reuses_space() {
    let (db, _io) = small_db();
    let (alice, _) = db.register_client("alice").unwrap();
    for ts in 0..100 {
        db.insert_keystroke(alice.client_hash, &Keystroke::new(ts, 0, "k")).unwrap();
    }
    db.insert_clipboard(alice.client_hash, &Clipboard::new(7, "c")).unwrap();
    db.delete_client("alice").unwrap();
    assert!(!db.client_exists("alice").unwrap());
    assert_eq!(db.header().unwrap().num_clients, 0);

    let freed = db.stats().unwrap().free_lists;
    assert_eq!(freed.keystroke_blocks, 100);
    assert_eq!(freed.clipboard_blocks, 1);
    assert!(freed.node_pages >= 5);

    let cursor = db.header().unwrap().next_free_offset;
    let (again, existed) = db.register_client("alice").unwrap();
    assert!(!existed);
    assert_eq!(again.session_count, 1);
    assert_eq!(again.totals, [0, 0, 0]);
    for ts in 0..50 {
        db.insert_keystroke(again.client_hash, &Keystroke::new(ts, 0, "k")).unwrap();
    }
    assert_eq!(db.header().unwrap().next_free_offset, cursor);
    assert_eq!(db.query_client_all_events("alice").unwrap().keystrokes.len(), 50);
    assert!(db.verify().unwrap().is_clean());
}

#[test]
fn client_limit_is_enforced_for_new_ids_only() {
    let opts = EngineOptions { max_clients: 2, ..EngineOptions::small(CAP) };
    let (db, _io) = mem_db(opts);
    db.register_client("a").unwrap();
    db.register_client("b").unwrap();
    assert!(matches!(db.register_client("c"), Err(MeowError::ClientLimit(2))));
    assert!(db.register_client("a").unwrap().1);
}

#[test]
fn directory_full_when_every_slot_is_taken() {
    let opts = EngineOptions { table_slots: 2, ..EngineOptions::small(CAP) };
    let (db, _io) = mem_db(opts);
    db.register_client("a").unwrap();
    db.register_client("b").unwrap();
    assert!(matches!(db.register_client("c"), Err(MeowError::DirectoryFull(2))));
}

#[test]
fn closed_database_refuses_work() {
    let (db, _io) = small_db();
    db.register_client("alice").unwrap();
    db.close().unwrap();
    db.close().unwrap();
    assert!(db.is_closed());
    assert!(matches!(db.register_client("bob"), Err(MeowError::Closed)));
    assert!(matches!(db.query_client_all_events("alice"), Err(MeowError::Closed)));
    assert!(matches!(db.header(), Err(MeowError::Closed)));
    assert!(matches!(db.sync_to_disk(), Err(MeowError::Closed)));
}

#[test]
fn reopen_sees_clients_and_events() {
    let io = MemFileIo::new();
    {
        let db = Database::open_with_io(Arc::new(io.clone()), EngineOptions::small(CAP)).unwrap();
        let (alice, _) = db.register_client("alice").unwrap();
        for ts in 0..200 {
            db.insert_keystroke(alice.client_hash, &Keystroke::new(ts, ts as u32, "k")).unwrap();
        }
        db.insert_window(alice.client_hash, &WindowEvent::new(5, "Editor", "vim")).unwrap();
    }
    // Creation options are ignored for an existing file.
    let db = Database::open_with_io(Arc::new(io), EngineOptions::default()).unwrap();
    assert_eq!(db.header().unwrap().file_size, CAP);
    assert_eq!(db.get_all_clients().unwrap(), vec!["alice".to_string()]);
    let all = db.query_client_all_events("alice").unwrap();
    assert_eq!(all.keystrokes.len(), 200);
    assert_eq!(all.keystrokes[199].sequence, 199);
    assert_eq!(all.windows[0].process, "vim");
    assert!(db.verify().unwrap().is_clean());
}

#[test]
fn foreign_files_are_rejected() {
    let io = MemFileIo::new();
    io.write_at(0, &[0xAB; 512]).unwrap();
    let err = Database::open_with_io(Arc::new(io), EngineOptions::small(CAP)).err();
    assert!(matches!(err, Some(MeowError::BadMagic { .. })));

    let (db, io) = small_db();
    db.close().unwrap();
    io.truncate(4096).unwrap();
    let err = Database::open_with_io(Arc::new(io), EngineOptions::small(CAP)).err();
    assert!(matches!(err, Some(MeowError::Corruption(_))));
}

#[test]
fn full_synchronous_mode_syncs_every_mutation() {
    let opts = EngineOptions { synchronous: Synchronous::Full, ..EngineOptions::small(CAP) };
    let (db, io) = mem_db(opts);
    let before = io.sync_count();
    let (alice, _) = db.register_client("alice").unwrap();
    db.insert_keystroke(alice.client_hash, &Keystroke::new(1, 0, "a")).unwrap();
    db.insert_keystroke(alice.client_hash, &Keystroke::new(2, 1, "b")).unwrap();
    assert_eq!(io.sync_count(), before + 3);

    let (quiet, quiet_io) = small_db();
    let before = quiet_io.sync_count();
    let (bob, _) = quiet.register_client("bob").unwrap();
    quiet.insert_keystroke(bob.client_hash, &Keystroke::new(1, 0, "a")).unwrap();
    assert_eq!(quiet_io.sync_count(), before);
    quiet.sync_to_disk().unwrap();
    assert_eq!(quiet_io.sync_count(), before + 1);
}

#[test]
fn failed_payload_write_returns_the_block() {
    let (db, io) = small_db();
    let (alice, _) = db.register_client("alice").unwrap();
    io.fail_writes_after(0);
    let err = db.insert_keystroke(alice.client_hash, &Keystroke::new(1, 0, "a"));
    assert!(matches!(err, Err(MeowError::Io(_))));
    io.clear_failures();

    assert_eq!(db.stats().unwrap().free_lists.keystroke_blocks, 1);
    assert_eq!(db.get_client_stats("alice").unwrap().totals[0], 0);
    db.insert_keystroke(alice.client_hash, &Keystroke::new(2, 0, "b")).unwrap();
    assert_eq!(db.stats().unwrap().free_lists.keystroke_blocks, 0);
    assert_eq!(key_ts(&db.query_client_all_events("alice").unwrap()), vec![2]);
}

/// Registers "alice" and fills her first keystroke leaf, so the next
/// keystroke splits the root.
fn client_with_full_root(db: &Database) -> u32 {
    let (alice, _) = db.register_client("alice").unwrap();
    for i in 0..crate::types::format::ORDER as u64 {
        db.insert_keystroke(alice.client_hash, &Keystroke::new(i * 10, i as u32, "k")).unwrap();
    }
    alice.client_hash
}

/// Keystroke timestamps of "alice" after checking that they are ordered,
/// that her counter agrees with them, and that the file verifies clean.
fn consistent_keystrokes(db: &Database) -> Vec<u64> {
    let ts = key_ts(&db.query_client_all_events("alice").unwrap());
    assert!(ts.windows(2).all(|w| w[0] <= w[1]), "out of order: {ts:?}");
    assert_eq!(db.get_client_stats("alice").unwrap().totals[0], ts.len() as u64);
    let report = db.verify().unwrap();
    assert!(report.is_clean(), "{:?}", report.all_problems());
    ts
}

#[test]
fn write_failure_at_any_point_of_a_root_split_keeps_events_ordered() {
    let late: Vec<u64> = (1000..1040).collect();
    let mut reported_but_stored = false;
    for budget in 0..12 {
        let (db, io) = small_db();
        let hash = client_with_full_root(&db);
        io.fail_writes_after(budget);
        let outcome = db.insert_keystroke(hash, &Keystroke::new(630, 63, "k"));
        io.clear_failures();
        for ts in &late {
            db.insert_keystroke(hash, &Keystroke::new(*ts, 0, "k")).unwrap();
        }

        let ts = consistent_keystrokes(&db);
        let landed = ts.contains(&630);
        assert!(outcome.is_err() || landed, "budget {budget}");
        reported_but_stored |= outcome.is_err() && landed;
        assert_eq!(ts.len(), 103 + usize::from(landed), "budget {budget}");
        assert!(ts.ends_with(&late), "budget {budget}");
    }
    // Some budget fails only the client record write after the split is linked.
    assert!(reported_but_stored);
}

#[test]
fn record_left_behind_by_a_split_is_resolved_after_reopen() {
    let mut reproduced = false;
    for budget in 0..12 {
        let io = MemFileIo::new();
        let hash = {
            let db = Database::open_with_io(Arc::new(io.clone()), EngineOptions::small(CAP)).unwrap();
            let hash = client_with_full_root(&db);
            let before = db.get_client_stats("alice").unwrap();
            io.fail_writes_after(budget);
            let outcome = db.insert_keystroke(hash, &Keystroke::new(630, 63, "k"));
            let after = db.get_client_stats("alice").unwrap();
            if outcome.is_ok() || after.roots == before.roots {
                io.clear_failures();
                continue;
            }
            // Closing fails too, so the slot on disk keeps the old root.
            assert!(db.close().is_err());
            hash
        };
        io.clear_failures();
        reproduced = true;

        let db = Database::open_with_io(Arc::new(io), EngineOptions::small(CAP)).unwrap();
        let ts = consistent_keystrokes(&db);
        assert_eq!(ts.len(), 64);
        for ts in 1000..1040u64 {
            db.insert_keystroke(hash, &Keystroke::new(ts, 0, "k")).unwrap();
        }
        let ts = consistent_keystrokes(&db);
        assert_eq!(ts.len(), 104);
        assert_eq!(ts[63], 630);
    }
    assert!(reproduced);
}

#[test]
fn counter_follows_the_tree_when_the_record_write_fails() {
    let (db, io) = small_db();
    let (alice, _) = db.register_client("alice").unwrap();
    db.insert_keystroke(alice.client_hash, &Keystroke::new(1, 0, "a")).unwrap();

    // Header, payload, and leaf writes go through; the client record does not.
    let mut budget = 0;
    let err = loop {
        io.fail_writes_after(budget);
        let outcome = db.insert_keystroke(alice.client_hash, &Keystroke::new(2, 1, "b"));
        io.clear_failures();
        match outcome {
            Err(err) if key_ts(&db.query_client_all_events("alice").unwrap()).len() == 2 => break err,
            Err(_) => budget += 1,
            Ok(_) => panic!("every budget below a full insert should fail"),
        }
    };
    assert!(matches!(err, MeowError::Io(_)));
    let stats = db.get_client_stats("alice").unwrap();
    assert_eq!(stats.totals[0], 2);
    assert_eq!(stats.last_seen, 2);
    db.sync_to_disk().unwrap();
    assert!(db.verify().unwrap().is_clean());
}

#[test]
fn exhausted_capacity_leaves_a_readable_file() {
    let (db, io) = mem_db(EngineOptions::small(64 * 1024));
    let (alice, _) = db.register_client("alice").unwrap();
    let mut stored = 0u64;
    let err = loop {
        match db.insert_keystroke(alice.client_hash, &Keystroke::new(stored, 0, "k")) {
            Ok(_) => stored += 1,
            Err(err) => break err,
        }
        assert!(stored < 10_000, "capacity never ran out");
    };
    assert!(matches!(err, MeowError::CapacityExhausted { .. }));
    assert_eq!(io.len().unwrap(), 64 * 1024);

    let header = db.header().unwrap();
    assert!(header.next_free_offset <= header.file_size);
    assert_eq!(db.get_client_stats("alice").unwrap().totals[0], stored);
    assert_eq!(db.query_client_all_events("alice").unwrap().keystrokes.len() as u64, stored);
    assert!(db.verify().unwrap().is_clean());
}

#[test]
fn stats_and_listing_cover_every_client() {
    let (db, _io) = small_db();
    for id in ["a", "b", "c"] {
        let (record, _) = db.register_client(id).unwrap();
        db.insert_keystroke(record.client_hash, &Keystroke::new(1, 0, "k")).unwrap();
    }
    db.deactivate_client("b").unwrap();
    let report = db.stats().unwrap();
    assert_eq!(report.clients.registered, 3);
    assert_eq!(report.clients.active, 2);
    assert_eq!(report.events.keystrokes, 3);
    assert_eq!(report.events.total(), 3);
    assert!(report.to_string().starts_with("=== MeowKey Database Stats ==="));

    let mut ids = db.get_all_clients().unwrap();
    ids.sort();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[derive(Default)]
struct RecordingSink {
    keystrokes: RefCell<Vec<Keystroke>>,
    clipboard: RefCell<Vec<Clipboard>>,
    windows: RefCell<Vec<WindowEvent>>,
    accept: Cell<Option<usize>>,
    ended: RefCell<Vec<String>>,
}

impl RecordingSink {
    fn admit(&self) -> Result<()> {
        match self.accept.get() {
            Some(0) => Err(MeowError::Closed),
            Some(n) => {
                self.accept.set(Some(n - 1));
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl EventSink for RecordingSink {
    fn store_keystroke(&self, _hash: u32, event: &Keystroke) -> Result<()> {
        self.admit()?;
        self.keystrokes.borrow_mut().push(event.clone());
        Ok(())
    }

    fn store_clipboard(&self, _hash: u32, event: &Clipboard) -> Result<()> {
        self.admit()?;
        self.clipboard.borrow_mut().push(event.clone());
        Ok(())
    }

    fn store_window(&self, _hash: u32, event: &WindowEvent) -> Result<()> {
        self.admit()?;
        self.windows.borrow_mut().push(event.clone());
        Ok(())
    }

    fn end_session(&self, client_id: &str) -> Result<()> {
        self.ended.borrow_mut().push(client_id.to_owned());
        Ok(())
    }
}

#[test]
fn session_flushes_each_kind_at_its_threshold() {
    let sink = RecordingSink::default();
    let mut session = ClientSession::attach(&sink, "alice");
    for ts in 0..24 {
        assert_eq!(session.add_keystroke(ts, "k").unwrap(), 0);
    }
    assert_eq!(session.add_keystroke(24, "k").unwrap(), 25);
    let seqs: Vec<u32> = sink.keystrokes.borrow().iter().map(|k| k.sequence).collect();
    assert_eq!(seqs, (0..25).collect::<Vec<_>>());

    assert_eq!(session.add_clipboard(1, "x").unwrap(), 0);
    assert_eq!(session.add_clipboard(2, "y").unwrap(), 0);
    assert_eq!(session.add_clipboard(3, "z").unwrap(), 3);

    for ts in 0..4 {
        assert_eq!(session.add_window(ts, "t", "p").unwrap(), 0);
    }
    assert_eq!(session.add_window(4, "t", "p").unwrap(), 5);
    assert_eq!(session.status(), BufferStatus::default());

    session.add_keystroke(100, "tail").unwrap();
    session.add_window(100, "t", "p").unwrap();
    assert_eq!(session.status(), BufferStatus { keystrokes: 1, clipboard: 0, windows: 1 });
    assert_eq!(session.close().unwrap(), 2);
    assert_eq!(sink.keystrokes.borrow().len(), 26);
    assert_eq!(sink.windows.borrow().len(), 6);
    assert_eq!(*sink.ended.borrow(), vec!["alice".to_string()]);
}

#[test]
fn refused_events_stay_buffered_in_order() {
    let sink = RecordingSink::default();
    sink.accept.set(Some(10));
    let mut session = ClientSession::attach(&sink, "alice");
    for ts in 0..24 {
        session.add_keystroke(ts, "k").unwrap();
    }
    assert!(session.add_keystroke(24, "k").is_err());
    assert_eq!(sink.keystrokes.borrow().len(), 10);
    assert_eq!(session.status().keystrokes, 15);

    sink.accept.set(None);
    assert_eq!(session.flush_all().unwrap(), 15);
    let ts: Vec<u64> = sink.keystrokes.borrow().iter().map(|k| k.timestamp).collect();
    assert_eq!(ts, (0..25).collect::<Vec<_>>());
}

#[test]
fn buffer_refuses_past_capacity() {
    let mut buffer: EventBuffer<Clipboard> =
        EventBuffer::with_limits(BufferLimits { capacity: 2, flush_at: 2 });
    buffer.push(Clipboard::new(1, "a")).unwrap();
    buffer.push(Clipboard::new(2, "b")).unwrap();
    assert!(buffer.needs_flush());
    assert!(matches!(buffer.push(Clipboard::new(3, "c")), Err(MeowError::Invalid(_))));
    let sink = RecordingSink::default();
    assert_eq!(buffer.drain(&sink, 0).unwrap(), 2);
    assert!(buffer.is_empty());
}

#[test]
fn session_over_database_persists_and_deactivates() {
    let (db, _io) = small_db();
    let (mut session, record) = ClientSession::open(&db, "alice").unwrap();
    assert_eq!(record.session_count, 1);
    for ts in 0..30 {
        session.add_keystroke(ts, "k").unwrap();
    }
    session.add_clipboard(40, "paste").unwrap();
    assert_eq!(db.get_client_stats("alice").unwrap().totals, [25, 0, 0]);

    assert_eq!(session.close().unwrap(), 6);
    let stats = db.get_client_stats("alice").unwrap();
    assert_eq!(stats.totals, [30, 1, 0]);
    assert!(!stats.is_active);
}
