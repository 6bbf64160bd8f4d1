#![allow(missing_docs)]

use std::path::PathBuf;

use meowkey::{Clipboard, Database, EngineOptions, Keystroke, MeowError, WindowEvent};
use tempfile::TempDir;

const CAP: u64 = 1024 * 1024;

fn temp_path(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.meow"));
    (dir, path)
}

#[test]
fn created_file_has_fixed_capacity() -> meowkey::Result<()> {
    let (_dir, path) = temp_path("fresh");
    let db = Database::open(&path, EngineOptions::small(CAP))?;
    assert_eq!(std::fs::metadata(&path)?.len(), CAP);
    let (alice, _) = db.register_client("alice")?;
    for ts in 0..500 {
        db.insert_keystroke(alice.client_hash, &Keystroke::new(ts, ts as u32, "k"))?;
    }
    db.close()?;
    assert_eq!(std::fs::metadata(&path)?.len(), CAP);
    Ok(())
}

#[test]
fn events_survive_reopen() -> meowkey::Result<()> {
    let (_dir, path) = temp_path("reopen");
    {
        let db = Database::open(&path, EngineOptions::small(CAP))?;
        let (alice, _) = db.register_client("alice")?;
        let (bob, _) = db.register_client("bob")?;
        for ts in 0..300 {
            db.insert_keystroke(alice.client_hash, &Keystroke::new(ts * 10, ts as u32, "a"))?;
        }
        db.insert_clipboard(bob.client_hash, &Clipboard::new(42, "secret"))?;
        db.insert_window(bob.client_hash, &WindowEvent::new(43, "Inbox", "mail"))?;
        db.deactivate_client("bob")?;
    }

    let db = Database::open(&path, EngineOptions::small(CAP))?;
    let mut clients = db.get_all_clients()?;
    clients.sort();
    assert_eq!(clients, vec!["alice", "bob"]);

    let window = db.query_client_events_by_time_range("alice", 1000, 1990)?;
    let ts: Vec<u64> = window.keystrokes.iter().map(|k| k.timestamp).collect();
    assert_eq!(ts, (100..200).map(|t| t * 10).collect::<Vec<_>>());

    let bob = db.get_client_stats("bob")?;
    assert!(!bob.is_active);
    assert_eq!(bob.totals, [0, 1, 1]);
    let events = db.query_client_all_events("bob")?;
    assert_eq!(events.clipboard[0].content, "secret");
    assert_eq!(events.windows[0].title, "Inbox");

    let (bob, existed) = db.register_client("bob")?;
    assert!(existed);
    assert_eq!(bob.session_count, 2);
    assert!(db.verify()?.is_clean());
    Ok(())
}

#[test]
fn deleted_clients_stay_deleted_after_reopen() -> meowkey::Result<()> {
    let (_dir, path) = temp_path("delete");
    {
        let db = Database::open(&path, EngineOptions::small(CAP))?;
        let (alice, _) = db.register_client("alice")?;
        for ts in 0..100 {
            db.insert_keystroke(alice.client_hash, &Keystroke::new(ts, 0, "k"))?;
        }
        db.register_client("bob")?;
        db.delete_client("alice")?;
        db.close()?;
    }
    let db = Database::open(&path, EngineOptions::small(CAP))?;
    assert!(!db.client_exists("alice")?);
    assert!(db.client_exists("bob")?);
    assert_eq!(db.header()?.num_clients, 1);

    let (alice, existed) = db.register_client("alice")?;
    assert!(!existed);
    assert_eq!(alice.totals, [0, 0, 0]);
    assert!(db.query_client_all_events("alice")?.is_empty());
    assert!(db.verify()?.is_clean());
    Ok(())
}

#[test]
fn options_file_drives_creation() -> meowkey::Result<()> {
    let (dir, path) = temp_path("configured");
    let config = dir.path().join("meowkey.toml");
    std::fs::write(
        &config,
        "capacity_bytes = 524288\ntable_slots = 16\nmax_clients = 8\nsynchronous = \"off\"\n",
    )?;
    let opts = EngineOptions::load(&config)?;
    let db = Database::open(&path, opts)?;
    let header = db.header()?;
    assert_eq!(header.file_size, 524_288);
    assert_eq!(header.table_slots(), 16);
    assert_eq!(header.max_clients, 8);
    Ok(())
}

#[test]
fn non_database_files_are_refused() {
    let (_dir, path) = temp_path("garbage");
    std::fs::write(&path, vec![0x5Au8; 8192]).expect("write garbage");
    let err = Database::open(&path, EngineOptions::small(CAP)).err();
    assert!(matches!(err, Some(MeowError::BadMagic { .. })));
}
