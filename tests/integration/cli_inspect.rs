#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use meowkey::{Clipboard, Database, EngineOptions, Keystroke};
use serde_json::Value;
use tempfile::TempDir;

fn setup_db(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.meow"));
    seed_demo(&path).expect("seed demo data");
    (dir, path)
}

fn seed_demo(path: &Path) -> meowkey::Result<()> {
    let db = Database::open(path, EngineOptions::small(1024 * 1024))?;
    let (alice, _) = db.register_client("alice")?;
    for ts in 0..10 {
        db.insert_keystroke(alice.client_hash, &Keystroke::new(1_000 + ts, ts as u32, "a"))?;
    }
    let (bob, _) = db.register_client("bob")?;
    db.insert_clipboard(bob.client_hash, &Clipboard::new(2_000, "copied"))?;
    db.close()
}

fn json_of(args: &[&str], db_path: &Path) -> Value {
    let output = cargo_bin_cmd!("meowkey-inspect")
        .arg(db_path)
        .args(["--format", "json"])
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn info_reports_counts() {
    let (_dir, db_path) = setup_db("info");
    let json = json_of(&["info"], &db_path);
    assert_eq!(json["clients"]["registered"], 2);
    assert_eq!(json["events"]["keystrokes"], 10);
    assert_eq!(json["events"]["clipboard"], 1);
    assert_eq!(json["file"]["capacity_bytes"], 1024 * 1024);
}

#[test]
fn header_decodes_magic() {
    let (_dir, db_path) = setup_db("header");
    let json = json_of(&["header"], &db_path);
    assert_eq!(json["header"]["magic"], 0x4D45_4F57u32);
    assert_eq!(json["header"]["num_clients"], 2);
    assert!(json["problem"].is_null());
    assert_eq!(json["first_bytes"].as_str().map(str::len), Some(128));
}

#[test]
fn events_respect_the_range() {
    let (_dir, db_path) = setup_db("events");
    let json = json_of(&["events", "alice", "--start", "1003", "--end", "1005"], &db_path);
    let stamps: Vec<u64> = json["keystrokes"]
        .as_array()
        .expect("keystroke list")
        .iter()
        .filter_map(|k| k["timestamp"].as_u64())
        .collect();
    assert_eq!(stamps, vec![1003, 1004, 1005]);
}

#[test]
fn clients_and_verify_succeed() {
    let (_dir, db_path) = setup_db("verify");
    let clients = json_of(&["clients"], &db_path);
    assert_eq!(clients.as_array().map(Vec::len), Some(2));
    let report = json_of(&["verify"], &db_path);
    assert_eq!(report["clients_checked"], 2);
    assert_eq!(report["problems"].as_array().map(Vec::len), Some(0));

    cargo_bin_cmd!("meowkey-inspect")
        .arg(&db_path)
        .arg("info")
        .assert()
        .success();
}

#[test]
fn missing_file_fails() {
    let dir = TempDir::new().expect("tempdir");
    cargo_bin_cmd!("meowkey-inspect")
        .arg(dir.path().join("absent.meow"))
        .arg("info")
        .assert()
        .failure();
    assert!(!dir.path().join("absent.meow").exists());
}

#[test]
fn unknown_client_fails() {
    let (_dir, db_path) = setup_db("unknown");
    cargo_bin_cmd!("meowkey-inspect")
        .arg(&db_path)
        .args(["events", "mallory"])
        .assert()
        .failure();
}
