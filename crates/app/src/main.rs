use std::fmt;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use quiz_core::flow::Redirect;
use quiz_core::model::{AnswerId, PageSubmission, SessionKey, TestId};
use serde::Deserialize;
use services::{
    AlternateView, AppServices, Clock, PageOutcome, PageView, ResultOutcome, ResultView,
    SearchSettings, SearchStatus, TestFlowService,
};
use storage::sample;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingTestId,
    UnknownArg(String),
    InvalidTestId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidSession { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingTestId => write!(f, "a test id is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTestId { raw } => write!(f, "invalid test id: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSession { raw } => write!(f, "invalid --session value: {raw:?}"),
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

fn parse_test_id(raw: &str) -> Result<TestId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidTestId {
        raw: raw.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    List,
    Take,
    Result,
    GiveUp,
    Seed,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "list" => Some(Self::List),
            "take" => Some(Self::Take),
            "result" => Some(Self::Result),
            "give-up" => Some(Self::GiveUp),
            "seed" => Some(Self::Seed),
            _ => None,
        }
    }

    fn needs_test_id(self) -> bool {
        matches!(self, Self::Take | Self::Result)
    }
}

/// Optional TOML file passed with `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    db_url: Option<String>,
    search: Option<SearchSettings>,
}

impl FileConfig {
    fn load(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

struct Args {
    db_url: Option<String>,
    session: SessionKey,
    config: Option<PathBuf>,
    test_id: Option<TestId>,
}

impl Args {
    fn parse(command: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL").ok();
        let raw_session = std::env::var("QUIZ_SESSION").unwrap_or_else(|_| "cli".into());
        let mut session = SessionKey::new(raw_session.clone())
            .map_err(|_| ArgsError::InvalidSession { raw: raw_session })?;
        let mut config = std::env::var("QUIZ_CONFIG").ok().map(PathBuf::from);
        let mut test_id = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(value);
                }
                "--session" => {
                    let value = require_value(args, "--session")?;
                    session = SessionKey::new(value.clone())
                        .map_err(|_| ArgsError::InvalidSession { raw: value })?;
                }
                "--config" => {
                    config = Some(PathBuf::from(require_value(args, "--config")?));
                }
                "--test-id" => {
                    test_id = Some(parse_test_id(&require_value(args, "--test-id")?)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other if !other.starts_with("--") && test_id.is_none() => {
                    test_id = Some(parse_test_id(other)?);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if command.needs_test_id() && test_id.is_none() {
            return Err(ArgsError::MissingTestId);
        }

        Ok(Self {
            db_url,
            session,
            config,
            test_id,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- list            [options]");
    eprintln!("  cargo run -p app -- take <test-id>  [options]");
    eprintln!("  cargo run -p app -- result <test-id> [options]");
    eprintln!("  cargo run -p app -- give-up         [options]");
    eprintln!("  cargo run -p app -- seed            [--test-id <id>] [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     SQLite URL (default: sqlite://quiz.sqlite3)");
    eprintln!("  --session <key>       Respondent session key (default: cli)");
    eprintln!("  --config <path>       TOML file with db_url and a [search] table");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_SESSION, QUIZ_CONFIG, QUIZ_LOG,");
    eprintln!("  QUIZ_SEARCH_MAX_UNCHECKED, QUIZ_SEARCH_MAX_COMBINATIONS, QUIZ_SEARCH_MAX_MILLIS");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("QUIZ_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim();
    let path = std::path::Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .and_then(|rest| rest.split('?').next())
        .filter(|path| !path.is_empty())
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let command = match argv.next() {
        None => Command::List,
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            ArgsError::UnknownArg(first.clone())
        })?,
    };

    let args = Args::parse(command, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let search = file
        .search
        .map_or_else(SearchSettings::from_env, SearchSettings::with_env_overrides);
    let db_url = normalize_sqlite_url(
        args.db_url
            .clone()
            .or(file.db_url)
            .unwrap_or_else(|| "sqlite://quiz.sqlite3".into()),
    );

    // Open + migrate SQLite here so services stay storage-agnostic.
    prepare_sqlite_file(&db_url)?;
    debug!(%db_url, ?search, session = %args.session, "opening storage");
    let services = AppServices::new_sqlite(&db_url, Clock::default_clock(), search).await?;
    if services.seeded_sample() {
        println!("Catalog was empty; added the sample test.");
    }
    let flow = services.flow();

    match command {
        Command::List => list(&flow, &args.session).await,
        Command::Take => {
            let test_id = args.test_id.ok_or(ArgsError::MissingTestId)?;
            take(&flow, &args.session, test_id).await
        }
        Command::Result => {
            let test_id = args.test_id.ok_or(ArgsError::MissingTestId)?;
            let outcome = flow.view_result(&args.session, test_id).await?;
            show_result_outcome(outcome);
            Ok(())
        }
        Command::GiveUp => {
            flow.give_up(&args.session).await?;
            println!("Progress discarded.");
            Ok(())
        }
        Command::Seed => {
            let test_id = args.test_id.unwrap_or_else(|| TestId::new(1));
            let (layout, tiers) =
                sample::morning_routine(test_id, format!("Morning routine #{test_id}"), None)?;
            services
                .catalog_writer()
                .upsert_test(&layout, &tiers)
                .await?;
            println!(
                "Seeded test {} with {} pages into {db_url}",
                test_id,
                layout.page_count()
            );
            Ok(())
        }
    }
}

async fn list(
    flow: &TestFlowService,
    session: &SessionKey,
) -> Result<(), Box<dyn std::error::Error>> {
    let index = flow.index(session).await?;
    if index.tests.is_empty() {
        println!("No tests available.");
    }
    for test in &index.tests {
        let marker = if index.active_test == Some(test.id) {
            "*"
        } else {
            " "
        };
        match &test.description {
            Some(description) => println!("{marker} {:>4}  {}  ({description})", test.id.value(), test.name),
            None => println!("{marker} {:>4}  {}", test.id.value(), test.name),
        }
    }
    if let (Some(status), Some(active)) = (index.status, index.active_test) {
        println!();
        println!("Session {session}: test {active} is {}", status.as_str());
    }
    Ok(())
}

async fn take(
    flow: &TestFlowService,
    session: &SessionKey,
    test_id: TestId,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut outcome = flow.open_or_advance_page(session, test_id, None).await?;

    loop {
        let page = match outcome {
            PageOutcome::Page(page) => page,
            PageOutcome::Redirect(Redirect::Result(finished)) => {
                let result = flow.view_result(session, finished).await?;
                show_result_outcome(result);
                return Ok(());
            }
            PageOutcome::Redirect(Redirect::Test(other)) => {
                println!(
                    "Test {other} is still in progress. Finish it with `take {other}` or run `give-up`."
                );
                return Ok(());
            }
            PageOutcome::Redirect(Redirect::Index) => return Ok(()),
        };

        show_page(&page);
        let Some(submission) = prompt_page(&page, &mut input)? else {
            println!("Stopped; progress is kept for later.");
            return Ok(());
        };
        outcome = flow
            .open_or_advance_page(session, test_id, Some(submission))
            .await?;
    }
}

fn show_page(page: &PageView) {
    println!();
    println!("{}: page {}/{}", page.test.name, page.number, page.count);
    for question in &page.questions {
        let flag = if question.missing { " (required)" } else { "" };
        println!();
        println!("{}{flag}", question.text);
        for (index, answer) in question.answers.iter().enumerate() {
            let mark = if question.selected.contains(&answer.id) {
                "x"
            } else {
                " "
            };
            println!("  [{mark}] {}. {}", index + 1, answer.text);
        }
    }
}

/// Reads one line per question: option numbers separated by commas or
/// spaces. EOF stops the run.
fn prompt_page(
    page: &PageView,
    input: &mut impl BufRead,
) -> Result<Option<PageSubmission>, Box<dyn std::error::Error>> {
    let mut submission = PageSubmission::new();
    for question in &page.questions {
        let picks: Vec<AnswerId> = loop {
            print!("{} > ", question.text);
            std::io::stdout().flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let parsed: Option<Vec<AnswerId>> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(|part| {
                    part.parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .and_then(|i| question.answers.get(i))
                        .map(|answer| answer.id)
                })
                .collect();
            match parsed {
                Some(picks) => break picks,
                None => println!("  pick option numbers between 1 and {}", question.answers.len()),
            }
        };
        for answer in picks {
            submission = submission.select(question.id, answer);
        }
    }
    Ok(Some(submission))
}

fn show_result_outcome(outcome: ResultOutcome) {
    match outcome {
        ResultOutcome::Result(view) => show_result(&view),
        ResultOutcome::Redirect(Redirect::Test(test_id)) => {
            println!("Test {test_id} is not finished yet. Continue with `take {test_id}`.");
        }
        ResultOutcome::Redirect(Redirect::Result(test_id)) => {
            println!("Your finished test is {test_id}. Run `result {test_id}`.");
        }
        ResultOutcome::Redirect(Redirect::Index) => {}
    }
}

fn show_result(view: &ResultView) {
    println!();
    println!("{}: score {} → {}", view.test.name, view.score, view.tier.label());
    if view.tier.is_below_lowest() {
        println!("No result tier covers this score.");
    }
    for answer in &view.checked {
        println!("  {:>+4}  {}", answer.weight, answer.text);
    }
    show_alternate("Closest better result", view.better.as_ref());
    show_alternate("Closest worse result", view.worse.as_ref());
    if let SearchStatus::BudgetExceeded(reason) = &view.search {
        println!();
        println!("Alternate results were not searched: {reason}");
    }
}

fn show_alternate(title: &str, alternate: Option<&AlternateView>) {
    let Some(alternate) = alternate else {
        return;
    };
    println!();
    println!(
        "{title}: {} (score {})",
        alternate.tier.label(),
        alternate.score
    );
    for answer in &alternate.answers {
        println!("  + {}", answer.text);
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
