use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::{Difficulty, StatsBucket, TopicId, UserId, UserRow};
use quiz_core::time::format_iso;
use services::{ActionGuard, Clock, GuardConfig, SessionStore, StorePaths};
use storage::JsonFileRepository;
use storage::bank_files::load_bank;

mod logging;

use logging::LogFormat;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidMillis { flag: &'static str, raw: String },
    InvalidUserId { raw: String },
    InvalidLogFormat(logging::UnknownLogFormat),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidMillis { flag, raw } => {
                write!(f, "invalid {flag} value: {raw} (expected milliseconds)")
            }
            ArgsError::InvalidUserId { raw } => write!(f, "invalid user id: {raw}"),
            ArgsError::InvalidLogFormat(err) => write!(f, "{err}"),
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

fn parse_millis(flag: &'static str, raw: &str) -> Result<Duration, ArgsError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ArgsError::InvalidMillis {
            flag,
            raw: raw.to_string(),
        })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quizbot [check] [options]");
    eprintln!("  quizbot stats <user-id> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --topics <path>               default database/topics.json");
    eprintln!("  --questions <path>            default database/questions.json");
    eprintln!("  --users <path>                default database/users.json");
    eprintln!("  --dedup-ttl-ms <ms>           default 800");
    eprintln!("  --in-flight-timeout-ms <ms>   default 2000");
    eprintln!("  --log-format <fmt>            pretty | compact | json");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_TOPICS_PATH, QUIZ_QUESTIONS_PATH, QUIZ_USERS_PATH,");
    eprintln!("  QUIZ_DEDUP_TTL_MS, QUIZ_IN_FLIGHT_TIMEOUT_MS, QUIZ_LOG_FORMAT, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Check,
    Stats(UserId),
}

#[derive(Debug)]
struct Args {
    command: Command,
    paths: StorePaths,
    guard: GuardConfig,
    log_format: LogFormat,
}

impl Args {
    /// Flags override environment variables, which override defaults.
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut args = args.into_iter().peekable();

        let command = match args.peek().map(String::as_str) {
            Some("check") => {
                args.next();
                Command::Check
            }
            Some("stats") => {
                args.next();
                let raw = require_value(&mut args, "stats")?;
                let user = raw
                    .parse::<UserId>()
                    .map_err(|_| ArgsError::InvalidUserId { raw })?;
                Command::Stats(user)
            }
            _ => Command::Check,
        };

        let mut paths = StorePaths::default();
        if let Ok(value) = std::env::var("QUIZ_TOPICS_PATH") {
            paths.topics = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("QUIZ_QUESTIONS_PATH") {
            paths.questions = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("QUIZ_USERS_PATH") {
            paths.users = PathBuf::from(value);
        }

        let mut guard = GuardConfig::default();
        if let Ok(value) = std::env::var("QUIZ_DEDUP_TTL_MS") {
            guard.dedup_ttl = parse_millis("QUIZ_DEDUP_TTL_MS", &value)?;
        }
        if let Ok(value) = std::env::var("QUIZ_IN_FLIGHT_TIMEOUT_MS") {
            guard.in_flight_timeout = parse_millis("QUIZ_IN_FLIGHT_TIMEOUT_MS", &value)?;
        }

        let mut log_format = match std::env::var("QUIZ_LOG_FORMAT") {
            Ok(value) => value.parse().map_err(ArgsError::InvalidLogFormat)?,
            Err(_) => LogFormat::default(),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--topics" => paths.topics = require_value(&mut args, "--topics")?.into(),
                "--questions" => {
                    paths.questions = require_value(&mut args, "--questions")?.into();
                }
                "--users" => paths.users = require_value(&mut args, "--users")?.into(),
                "--dedup-ttl-ms" => {
                    let value = require_value(&mut args, "--dedup-ttl-ms")?;
                    guard.dedup_ttl = parse_millis("--dedup-ttl-ms", &value)?;
                }
                "--in-flight-timeout-ms" => {
                    let value = require_value(&mut args, "--in-flight-timeout-ms")?;
                    guard.in_flight_timeout = parse_millis("--in-flight-timeout-ms", &value)?;
                }
                "--log-format" => {
                    let value = require_value(&mut args, "--log-format")?;
                    log_format = value.parse().map_err(ArgsError::InvalidLogFormat)?;
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            command,
            paths,
            guard,
            log_format,
        })
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    logging::init(args.log_format);

    // A bank with dangling topic references is not servable.
    let bank = Arc::new(load_bank(&args.paths.topics, &args.paths.questions)?);
    let repo = Arc::new(JsonFileRepository::new(&args.paths.users));
    let store = SessionStore::open(bank, repo, Clock::default())?;

    match args.command {
        Command::Check => {
            let guard = ActionGuard::new(args.guard);
            tracing::debug!(
                dedup_ttl = ?guard.config().dedup_ttl,
                in_flight_timeout = ?guard.config().in_flight_timeout,
                sweep_every = guard.config().sweep_every,
                "action guard configured"
            );
            print_check(&store)?;
        }
        Command::Stats(user) => match store.get_user(user)? {
            Some(row) => print_stats(&store, user, &row),
            None => println!("user {user} has no record"),
        },
    }
    Ok(())
}

fn print_check(store: &SessionStore) -> Result<(), Box<dyn std::error::Error>> {
    let bank = store.bank();
    println!("{} topics, {} questions", bank.topics().len(), bank.len());
    for topic in store.topics() {
        let counts: Vec<String> = Difficulty::ALL
            .iter()
            .map(|&d| format!("{d}={}", bank.by_topic_and_difficulty(&topic.id, d).len()))
            .collect();
        println!("  {:<12} {:<24} {}", topic.id.as_str(), topic.label(), counts.join(" "));
    }
    let users = store.snapshot()?;
    println!(
        "{} users (document {}, updated {})",
        users.users.len(),
        users.version,
        format_iso(&users.updated_at)
    );
    Ok(())
}

fn bucket_line(bucket: StatsBucket) -> String {
    match bucket.accuracy() {
        Some(acc) => format!(
            "{}/{} correct ({:.0}%)",
            bucket.correct(),
            bucket.answered(),
            acc * 100.0
        ),
        None => "no answers".to_string(),
    }
}

fn print_stats(store: &SessionStore, user: UserId, row: &UserRow) {
    println!("user {user} ({})", row.username.as_deref().unwrap_or("-"));
    println!(
        "  created {}  updated {}",
        format_iso(&row.created_at),
        format_iso(&row.updated_at)
    );
    println!(
        "  prefs: {} questions, difficulty {}, solutions {}",
        row.prefs.qcount,
        row.prefs.diff,
        row.prefs.sol.code()
    );
    println!("  total: {}", bucket_line(row.stats.total));
    for (topic_id, bucket) in &row.stats.by_topic {
        let label = store
            .bank()
            .topic(topic_id)
            .map_or_else(|| topic_id.to_string(), |t| t.label());
        println!("  {label}: {}", bucket_line(*bucket));
    }
    if let Some(session) = &row.session {
        let progress = session.progress();
        let topic = session.topic_id().map_or("any topic", TopicId::as_str);
        println!(
            "  session: {:?} in {topic}, question {}/{}, {} answered",
            session.mode(),
            progress.index,
            progress.total,
            progress.answered
        );
    }
}

fn main() {
    if let Err(err) = run() {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
