#![allow(missing_docs)]

use meowkey::{Clipboard, Database, EngineOptions, Keystroke, MeowError, Result};
use tempfile::TempDir;

const CAP: u64 = 96 * 1024;

#[test]
fn writes_stop_at_capacity_and_the_file_stays_usable() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tight.meow");
    let db = Database::open(&path, EngineOptions::small(CAP))?;
    let (alice, _) = db.register_client("alice")?;

    let mut stored = 0u64;
    let err = loop {
        let event = Clipboard::new(stored, &format!("payload {stored}"));
        match db.insert_clipboard(alice.client_hash, &event) {
            Ok(_) => stored += 1,
            Err(err) => break err,
        }
        assert!(stored < 1_000, "capacity never ran out");
    };
    assert!(matches!(err, MeowError::CapacityExhausted { .. }), "unexpected error: {err}");

    let header = db.header()?;
    assert!(header.next_free_offset <= header.file_size);
    assert_eq!(std::fs::metadata(&path)?.len(), CAP);
    assert_eq!(db.get_client_stats("alice")?.totals[1], stored);

    let events = db.query_client_all_events("alice")?;
    assert_eq!(events.clipboard.len() as u64, stored);
    assert_eq!(events.clipboard.last().map(|c| c.content.clone()), Some(format!("payload {}", stored - 1)));
    assert!(db.verify()?.is_clean());

    // Smaller records may still fit in what is left.
    if header.remaining() >= 64 {
        db.insert_keystroke(alice.client_hash, &Keystroke::new(1, 0, "k"))?;
    }
    Ok(())
}

#[test]
fn deleting_a_client_makes_room_again() -> Result<()> {
    let dir = TempDir::new()?;
    let db = Database::open(dir.path().join("reuse.meow"), EngineOptions::small(CAP))?;
    let (alice, _) = db.register_client("alice")?;
    let mut stored = 0u64;
    while db.insert_clipboard(alice.client_hash, &Clipboard::new(stored, "x")).is_ok() {
        stored += 1;
    }
    db.delete_client("alice")?;

    let (bob, _) = db.register_client("bob")?;
    for ts in 0..stored {
        db.insert_clipboard(bob.client_hash, &Clipboard::new(ts, "y"))?;
    }
    assert_eq!(db.get_client_stats("bob")?.totals[1], stored);
    assert!(db.verify()?.is_clean());
    Ok(())
}

#[test]
fn capacity_too_small_for_the_layout_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let err = Database::open(dir.path().join("tiny.meow"), EngineOptions::small(4096)).err();
    assert!(matches!(err, Some(MeowError::Invalid(_))));
}
