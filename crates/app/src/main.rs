use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use server::{AppState, DrillServer, ServerConfig};
use services::{AppServices, Clock};
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "127.0.0.1:7878";
const DEFAULT_LIVE_TTL_SECS: u64 = 4 * 60 * 60;
const DEFAULT_SHEETS: u32 = 3;
const DEFAULT_QUESTIONS: usize = 66;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidBind { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidBind { raw } => write!(f, "invalid --bind value: {raw}"),
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

fn parse_number<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- serve [--db <sqlite_url>] [--bind <addr>] [--live-ttl <secs>] [--verbose]");
    eprintln!("  cargo run -p app -- seed  [--db <sqlite_url>] [--sheets <n>] [--questions <n>] [--seed <u64>] [--verbose]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://<cwd>/drill.sqlite3");
    eprintln!("  --bind {DEFAULT_BIND}");
    eprintln!("  --live-ttl {DEFAULT_LIVE_TTL_SECS}");
    eprintln!("  --sheets {DEFAULT_SHEETS} --questions {DEFAULT_QUESTIONS}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DRILL_DB_URL, DRILL_BIND, DRILL_LIVE_TTL_SECS, DRILL_SEED_SHEETS, DRILL_SEED_QUESTIONS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Serve,
    Seed,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "serve" => Some(Self::Serve),
            "seed" => Some(Self::Seed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    db_url: String,
    bind: SocketAddr,
    live_ttl_secs: u64,
    sheets: u32,
    questions: usize,
    seed: Option<u64>,
    verbose: bool,
}

impl Args {
    fn from_env() -> Result<Self, ArgsError> {
        let db_url = std::env::var("DRILL_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("drill.sqlite3".into()), normalize_sqlite_url);
        let bind_raw = std::env::var("DRILL_BIND").unwrap_or_else(|_| DEFAULT_BIND.into());
        let bind = parse_bind(bind_raw)?;

        Ok(Self {
            db_url,
            bind,
            live_ttl_secs: env_number("DRILL_LIVE_TTL_SECS", DEFAULT_LIVE_TTL_SECS),
            sheets: env_number("DRILL_SEED_SHEETS", DEFAULT_SHEETS),
            questions: env_number("DRILL_SEED_QUESTIONS", DEFAULT_QUESTIONS),
            seed: None,
            verbose: false,
        })
    }

    fn parse(command: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::from_env()?;

        while let Some(arg) = args.next() {
            match (command, arg.as_str()) {
                (_, "--db") => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                (_, "--verbose" | "-v") => parsed.verbose = true,
                (Command::Serve, "--bind") => {
                    parsed.bind = parse_bind(require_value(args, "--bind")?)?;
                }
                (Command::Serve, "--live-ttl") => {
                    parsed.live_ttl_secs =
                        parse_number("--live-ttl", require_value(args, "--live-ttl")?)?;
                }
                (Command::Seed, "--sheets") => {
                    parsed.sheets = parse_number("--sheets", require_value(args, "--sheets")?)?;
                }
                (Command::Seed, "--questions") => {
                    parsed.questions =
                        parse_number("--questions", require_value(args, "--questions")?)?;
                }
                (Command::Seed, "--seed") => {
                    parsed.seed = Some(parse_number("--seed", require_value(args, "--seed")?)?);
                }
                (_, "--help" | "-h") => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }
}

fn parse_bind(raw: String) -> Result<SocketAddr, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidBind { raw })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Serving is the default when no subcommand is given.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Serve,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with('-') => Command::Serve,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with('-') {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(cmd, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing(parsed.verbose);

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let clock = Clock::default_clock();
    let live_ttl = chrono::Duration::seconds(i64::try_from(parsed.live_ttl_secs)?);
    let services = AppServices::new_sqlite(&parsed.db_url, clock, live_ttl).await?;

    match cmd {
        Command::Serve => {
            if services
                .ensure_question_sets(parsed.sheets, parsed.questions)
                .await?
            {
                tracing::info!("empty catalogue, generated default sheets");
            }
            let config = ServerConfig::new(parsed.bind.ip().to_string(), parsed.bind.port());
            let server = DrillServer::new(config, Arc::new(AppState::new(services)));
            server.run().await?;
            Ok(())
        }
        Command::Seed => {
            let written = services
                .seed_generated_sets(parsed.sheets, parsed.questions, parsed.seed)
                .await?;
            for sheet in &written {
                println!("{}\t{}\t{} questions", sheet.id, sheet.name, sheet.question_count);
            }
            Ok(())
        }
    }
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

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

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(command: Command, args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(command, &mut iter)
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(
            Command::Serve,
            &["--db", "/tmp/x.sqlite3", "--bind", "0.0.0.0:9000", "--live-ttl", "60", "-v"],
        )
        .unwrap();
        assert_eq!(args.db_url, "sqlite:///tmp/x.sqlite3");
        assert_eq!(args.bind.port(), 9000);
        assert_eq!(args.live_ttl_secs, 60);
        assert!(args.verbose);
    }

    #[test]
    fn seed_flags_belong_to_seed() {
        let args = parse(Command::Seed, &["--sheets", "5", "--questions", "10", "--seed", "7"]).unwrap();
        assert_eq!((args.sheets, args.questions, args.seed), (5, 10, Some(7)));

        assert!(matches!(
            parse(Command::Serve, &["--sheets", "5"]),
            Err(ArgsError::UnknownArg(arg)) if arg == "--sheets"
        ));
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            parse(Command::Serve, &["--bind"]),
            Err(ArgsError::MissingValue { flag: "--bind" })
        ));
        assert!(matches!(
            parse(Command::Serve, &["--bind", "nowhere"]),
            Err(ArgsError::InvalidBind { .. })
        ));
        assert!(matches!(
            parse(Command::Seed, &["--questions", "many"]),
            Err(ArgsError::InvalidNumber { flag: "--questions", .. })
        ));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/drill.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/drill.sqlite3"));
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
    }
}
