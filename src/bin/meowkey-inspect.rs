//! Read-mostly inspector for MeowKey database files.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use meowkey::primitives::bytes::hexdump;
use meowkey::primitives::io::{FileIo, StdFileIo};
use meowkey::storage::Header;
use meowkey::types::format::HEADER_LEN;
use meowkey::{Database, EngineOptions, EventKind, QueryResult, Synchronous};
use nu_ansi_term::Color;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "meowkey-inspect",
    version,
    about = "Inspect a MeowKey database file",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(value_name = "DB", env = "MEOWKEY_DB", help = "Database file to inspect")]
    db_path: PathBuf,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for reports"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decoded header fields and a hex dump of the first bytes
    Header,
    /// Usage, client, and event summary
    Info,
    /// Every registered client with its counters
    Clients,
    /// Events of one client, optionally limited to a time range
    Events {
        #[arg(value_name = "CLIENT")]
        client: String,
        #[arg(long, default_value_t = 0, help = "First timestamp (µs, inclusive)")]
        start: u64,
        #[arg(long, default_value_t = u64::MAX, help = "Last timestamp (µs, inclusive)")]
        end: u64,
    },
    /// Structural check of header, directory, and trees
    Verify,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

type CliResult<T> = std::result::Result<T, Box<dyn Error>>;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!();
        eprintln!("  {} {err}", paint(Color::Red, "error:"));
        eprintln!();
        process::exit(1);
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    if !cli.db_path.is_file() {
        return Err(format!("{} does not exist", cli.db_path.display()).into());
    }
    match &cli.command {
        Command::Header => cmd_header(&cli.db_path, cli.format),
        Command::Info => with_db(&cli.db_path, |db| {
            let report = db.stats()?;
            match cli.format {
                OutputFormat::Json => emit_json(&report),
                OutputFormat::Text => {
                    print_header("DATABASE INFO");
                    print_section("File");
                    print_field("Path", cli.db_path.display());
                    print_field("Capacity", format_bytes(report.file.capacity_bytes));
                    print_field("Used", format_bytes(report.file.used_bytes));
                    print_field("Usage", format!("{:.2}%", report.file.usage_percent));
                    print_field("Next free offset", report.file.next_free_offset);
                    print_section("Clients");
                    print_field("Registered", report.clients.registered);
                    print_field("Max clients", report.clients.max_clients);
                    print_field("Active", report.clients.active);
                    print_field("Directory slots", report.file.table_slots);
                    print_section("Events");
                    print_field("Keystrokes", report.events.keystrokes);
                    print_field("Clipboard", report.events.clipboard);
                    print_field("Windows", report.events.windows);
                    print_field("Total", report.events.total());
                    println!();
                    Ok(())
                }
            }
        }),
        Command::Clients => with_db(&cli.db_path, |db| {
            let mut records = Vec::new();
            for id in db.get_all_clients()? {
                records.push(db.get_client_stats(&id)?);
            }
            match cli.format {
                OutputFormat::Json => emit_json(&records),
                OutputFormat::Text => {
                    print_header("CLIENTS");
                    if records.is_empty() {
                        println!("  (no clients registered)");
                    }
                    for record in &records {
                        print_section(&record.client_id);
                        print_field("Hash", format!("{:#010x}", record.client_hash));
                        print_field("Active", record.is_active);
                        print_field("Sessions", record.session_count);
                        print_field("First seen", format_micros(record.first_seen));
                        print_field("Last seen", format_micros(record.last_seen));
                        for kind in EventKind::ALL {
                            print_field(kind.name(), record.total(kind));
                        }
                    }
                    println!();
                    Ok(())
                }
            }
        }),
        Command::Events { client, start, end } => with_db(&cli.db_path, |db| {
            let result = db.query_client_events_by_time_range(client, *start, *end)?;
            match cli.format {
                OutputFormat::Json => emit_json(&result),
                OutputFormat::Text => {
                    print_events(&result);
                    Ok(())
                }
            }
        }),
        Command::Verify => with_db(&cli.db_path, |db| {
            let report = db.verify()?;
            if cli.format == OutputFormat::Json {
                emit_json(&report)?;
            } else {
                print_header("INTEGRITY VERIFICATION");
                print_section("Results");
                print_field("Clients checked", report.clients_checked);
                print_field("Trees checked", report.trees.len());
                let problems = report.all_problems();
                print_field("Problems", problems.len());
                if !problems.is_empty() {
                    print_section("Problem Details");
                    for (i, problem) in problems.iter().enumerate() {
                        println!("  {}. {problem}", i + 1);
                    }
                }
                println!();
                if report.is_clean() {
                    println!("  Status: {}", paint(Color::Green, "PASS"));
                } else {
                    println!("  Status: {}", paint(Color::Red, "FAIL"));
                }
                println!();
            }
            if report.is_clean() {
                Ok(())
            } else {
                Err("verification found problems".into())
            }
        }),
    }
}

fn with_db(path: &Path, f: impl FnOnce(&Database) -> CliResult<()>) -> CliResult<()> {
    let opts = EngineOptions {
        synchronous: Synchronous::Off,
        ..EngineOptions::default()
    };
    let db = Database::open(path, opts)?;
    let result = f(&db);
    db.close()?;
    result
}

fn cmd_header(path: &Path, format: OutputFormat) -> CliResult<()> {
    let io = StdFileIo::open(path)?;
    let mut buf = [0u8; HEADER_LEN];
    io.read_at(0, &mut buf)?;
    let header = Header::decode(&buf)?;
    let status = header.validate().err().map(|err| err.to_string());

    if format == OutputFormat::Json {
        #[derive(Serialize)]
        struct HeaderDump<'a> {
            header: &'a Header,
            problem: Option<String>,
            first_bytes: String,
        }
        return emit_json(&HeaderDump {
            header: &header,
            problem: status,
            first_bytes: hex::encode(&buf[..64]),
        });
    }

    print_header("RAW HEADER CONTENTS");
    print_section("Header Fields");
    print_field("magic", format!("{:#010x}", header.magic));
    print_field("version", header.version);
    print_field("file_size", format!("{} ({})", header.file_size, format_bytes(header.file_size)));
    print_field("client_table_offset", header.client_table_offset);
    print_field("keystroke_tree_offset", header.keystroke_tree_offset);
    print_field("clipboard_tree_offset", header.clipboard_tree_offset);
    print_field("window_tree_offset", header.window_tree_offset);
    print_field("num_clients", header.num_clients);
    print_field("max_clients", header.max_clients);
    print_field("next_free_offset", header.next_free_offset);
    if let Some(problem) = &status {
        print_field("problem", paint(Color::Red, problem));
    }
    print_section("First 64 bytes");
    for line in hexdump::lines(0, &buf[..64]) {
        println!("  {line}");
    }
    println!();
    Ok(())
}

fn print_events(result: &QueryResult) {
    print_header("EVENTS");
    print_field("Client", &result.client_id);
    print_field("Total", result.len());

    print_section("Keystrokes");
    for event in &result.keystrokes {
        println!("  {}  #{:<6} {:?}", format_micros(event.timestamp), event.sequence, event.key);
    }
    print_section("Clipboard");
    for event in &result.clipboard {
        println!("  {}  {:?}", format_micros(event.timestamp), event.content);
    }
    print_section("Windows");
    for event in &result.windows {
        println!(
            "  {}  {:?} ({})",
            format_micros(event.timestamp),
            event.title,
            event.process
        );
    }
    println!();
}

fn emit_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_micros(micros: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .ok()
        .and_then(|at| at.format(&Rfc3339).ok())
        .unwrap_or_else(|| micros.to_string())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn paint(color: Color, text: &str) -> String {
    if std::io::stdout().is_terminal() {
        color.bold().paint(text).to_string()
    } else {
        text.to_string()
    }
}

fn print_header(title: &str) {
    let width = 60;
    let padding = (width - title.len()) / 2;
    println!();
    println!("╔{}╗", "═".repeat(width));
    println!(
        "║{}{title}{}║",
        " ".repeat(padding),
        " ".repeat(width - padding - title.len())
    );
    println!("╚{}╝", "═".repeat(width));
    println!();
}

fn print_section(title: &str) {
    println!();
    println!("─── {} {}", title, "─".repeat(55usize.saturating_sub(title.len())));
}

fn print_field(name: &str, value: impl std::fmt::Display) {
    println!("  {:.<30} {}", name, value);
}
