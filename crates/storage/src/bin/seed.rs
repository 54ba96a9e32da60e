use std::fmt;

use quiz_core::model::TestId;
use storage::repository::Storage;
use storage::sample;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    test_id: TestId,
    test_name: String,
    test_desc: Option<String>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidTestId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTestId { raw } => write!(f, "invalid --test-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:quiz.sqlite3?mode=rwc".into());
        let mut test_id = std::env::var("QUIZ_TEST_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| TestId::new(1), TestId::new);
        let mut test_name =
            std::env::var("QUIZ_TEST_NAME").unwrap_or_else(|_| "Morning routine".into());
        let mut test_desc = std::env::var("QUIZ_TEST_DESC").ok();

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--test-id" => {
                    let value = require_value(&mut args, "--test-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidTestId { raw: value.clone() })?;
                    test_id = TestId::new(parsed);
                }
                "--test-name" => {
                    test_name = require_value(&mut args, "--test-name")?;
                }
                "--test-desc" => {
                    test_desc = Some(require_value(&mut args, "--test-desc")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            test_id,
            test_name,
            test_desc,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:quiz.sqlite3?mode=rwc)");
    eprintln!("  --test-id <id>            Test id to upsert (default: 1)");
    eprintln!("  --test-name <name>        Test name (default: Morning routine)");
    eprintln!("  --test-desc <text>        Optional test description");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUIZ_DB_URL, QUIZ_TEST_ID, QUIZ_TEST_NAME, QUIZ_TEST_DESC");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let (layout, tiers) =
        sample::morning_routine(args.test_id, args.test_name.clone(), args.test_desc.clone())?;
    storage.catalog_writer.upsert_test(&layout, &tiers).await?;

    println!(
        "Seeded test {} with {} pages and {} tiers into {}",
        layout.test_id().value(),
        layout.page_count(),
        tiers.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
