#![allow(missing_docs)]

use std::sync::{Arc, Barrier};
use std::thread;

use meowkey::{Clipboard, Database, EngineOptions, Keystroke, Result, WindowEvent};
use tempfile::TempDir;

const NUM_THREADS: usize = 8;
const EVENTS_PER_THREAD: u64 = 200;

#[test]
fn parallel_writers_on_separate_clients() -> Result<()> {
    let dir = TempDir::new()?;
    let db = Arc::new(Database::open(
        dir.path().join("parallel.meow"),
        EngineOptions::small(16 * 1024 * 1024),
    )?);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = vec![];

    for thread_id in 0..NUM_THREADS {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            let (record, _) = db.register_client(&format!("client-{thread_id}"))?;
            barrier.wait();
            for i in 0..EVENTS_PER_THREAD {
                let ts = i * NUM_THREADS as u64 + thread_id as u64;
                match i % 3 {
                    0 => db.insert_keystroke(record.client_hash, &Keystroke::new(ts, i as u32, "k"))?,
                    1 => db.insert_clipboard(record.client_hash, &Clipboard::new(ts, "clip"))?,
                    _ => db.insert_window(record.client_hash, &WindowEvent::new(ts, "w", "p"))?,
                };
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    for thread_id in 0..NUM_THREADS {
        let id = format!("client-{thread_id}");
        let stats = db.get_client_stats(&id)?;
        assert_eq!(stats.totals, [67, 67, 66]);
        let events = db.query_client_all_events(&id)?;
        assert_eq!(events.len() as u64, EVENTS_PER_THREAD);
        assert!(events.keystrokes.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
    assert_eq!(db.header()?.num_clients, NUM_THREADS as u32);
    assert!(db.verify()?.is_clean());
    Ok(())
}

#[test]
fn readers_run_alongside_a_writer() -> Result<()> {
    let dir = TempDir::new()?;
    let db = Arc::new(Database::open(
        dir.path().join("mixed.meow"),
        EngineOptions::small(8 * 1024 * 1024),
    )?);
    let (alice, _) = db.register_client("alice")?;
    let barrier = Arc::new(Barrier::new(3));

    let writer = {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || -> Result<()> {
            barrier.wait();
            for ts in 0..1000 {
                db.insert_keystroke(alice.client_hash, &Keystroke::new(ts, ts as u32, "k"))?;
            }
            Ok(())
        })
    };
    let readers: Vec<_> = (0..2)
        .map(|_| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                barrier.wait();
                let mut last = 0;
                for _ in 0..50 {
                    let seen = db.query_client_all_events("alice")?.keystrokes;
                    assert!(seen.len() >= last, "event count went backwards");
                    assert!(seen.iter().enumerate().all(|(i, k)| k.timestamp == i as u64));
                    last = seen.len();
                }
                Ok(())
            })
        })
        .collect();

    writer.join().expect("writer panicked")?;
    for reader in readers {
        reader.join().expect("reader panicked")?;
    }
    assert_eq!(db.get_client_stats("alice")?.totals[0], 1000);
    Ok(())
}
