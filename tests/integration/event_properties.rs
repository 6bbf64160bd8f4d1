#![allow(missing_docs)]

use std::sync::Arc;

use meowkey::primitives::io::MemFileIo;
use meowkey::{Database, EngineOptions, Keystroke, WindowEvent};
use proptest::prelude::*;

fn open_mem() -> Database {
    Database::open_with_io(Arc::new(MemFileIo::new()), EngineOptions::small(4 * 1024 * 1024))
        .expect("open in-memory db")
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, ..ProptestConfig::default() })]

    #[test]
    fn range_queries_match_a_sorted_model(
        stamps in prop::collection::vec(0u64..500, 1..400),
        start in 0u64..500,
        span in 0u64..500,
    ) {
        let db = open_mem();
        let (alice, _) = db.register_client("alice").unwrap();
        for (seq, ts) in stamps.iter().enumerate() {
            db.insert_keystroke(alice.client_hash, &Keystroke::new(*ts, seq as u32, "k")).unwrap();
        }
        let end = start.saturating_add(span);

        let mut model: Vec<(u64, u32)> = stamps
            .iter()
            .enumerate()
            .map(|(seq, ts)| (*ts, seq as u32))
            .filter(|(ts, _)| (start..=end).contains(ts))
            .collect();
        model.sort_by_key(|(ts, _)| *ts);

        let got: Vec<(u64, u32)> = db
            .query_client_events_by_time_range("alice", start, end)
            .unwrap()
            .keystrokes
            .iter()
            .map(|k| (k.timestamp, k.sequence))
            .collect();
        prop_assert_eq!(got, model);
        prop_assert!(db.verify().unwrap().is_clean());
    }

    #[test]
    fn text_fields_round_trip_within_their_width(
        title in "\\PC{0,200}",
        process in "[a-z0-9_.-]{0,150}",
    ) {
        let db = open_mem();
        let (bob, _) = db.register_client("bob").unwrap();
        let event = WindowEvent::new(7, &title, &process);
        db.insert_window(bob.client_hash, &event).unwrap();

        let stored = db.query_client_all_events("bob").unwrap().windows;
        prop_assert_eq!(stored.len(), 1);
        prop_assert!(stored[0].title.len() <= 127);
        prop_assert!(stored[0].process.len() <= 111);
        prop_assert!(title.starts_with(&stored[0].title));
        prop_assert_eq!(&stored[0].title, &event.title);
        prop_assert_eq!(&stored[0].process, &event.process);
    }
}
