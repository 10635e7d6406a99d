//! NeuroPlay CLI - Command-line interface for NeuroPlay analytics
//!
//! Commands:
//! - extract: Derive metrics from one raw session bag
//! - replay: Run a batch of stored sessions through the session pipeline
//! - cohort: Produce a cohort report with outlier flags
//! - stats: Summarize a player's sessions, optionally for one game
//! - config: Print the effective configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use neuroplay_analytics::cohort::{CohortAnalyzer, CohortSession};
use neuroplay_analytics::stats::{game_performance, player_stats};
use neuroplay_analytics::{
    AnalysisConfig, AnalyticsError, GameSession, InMemoryStore, MetricExtractor, RawSessionData,
    SessionOutcome, SessionPipeline, PRODUCER_NAME, VERSION,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// NeuroPlay - Session scoring and adaptive difficulty for cognitive-training games
#[derive(Parser)]
#[command(name = "neuroplay")]
#[command(author = "NeuroPlay Contributors")]
#[command(version = VERSION)]
#[command(about = "Score gameplay telemetry and track player progress", long_about = None)]
struct Cli {
    /// Analysis configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive metrics from one raw session bag
    Extract {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,
    },

    /// Run stored sessions through the session pipeline in start order
    Replay {
        /// JSON array of game sessions (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Produce a cohort report over a batch of sessions
    Cohort {
        /// JSON array of sessions (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Summarize a player's sessions
    Stats {
        /// JSON array of game sessions (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Only include sessions of this player
        #[arg(long)]
        player: Option<String>,

        /// Report performance for one game instead of the overview
        #[arg(long)]
        game: Option<String>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so stdout stays machine-readable. `RUST_LOG` wins over the
/// default level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .init();
}

fn run(cli: Cli) -> Result<(), NeuroplayCliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Extract {
            input,
            output_format,
        } => cmd_extract(&input, &output_format, &load_config(config_path)?),
        Commands::Replay {
            input,
            output_format,
        } => cmd_replay(&input, &output_format, &load_config(config_path)?),
        Commands::Cohort {
            input,
            output_format,
        } => cmd_cohort(&input, &output_format, &load_config(config_path)?),
        Commands::Stats {
            input,
            player,
            game,
            output_format,
        } => cmd_stats(&input, player.as_deref(), game.as_deref(), &output_format),
        Commands::Config => {
            print!("{}", load_config(config_path)?.to_toml_string()?);
            Ok(())
        }
        Commands::Doctor { json } => cmd_doctor(config_path, json),
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, NeuroplayCliError> {
    let config = match path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn read_input(input: &Path) -> Result<String, NeuroplayCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn cmd_extract(
    input: &Path,
    output_format: &OutputFormat,
    config: &AnalysisConfig,
) -> Result<(), NeuroplayCliError> {
    let raw = RawSessionData::from_json(&read_input(input)?)?;
    let metrics = MetricExtractor::new(config.indicators.clone()).extract(&raw);
    println!("{}", format_record(&metrics, output_format)?);
    Ok(())
}

fn cmd_replay(
    input: &Path,
    output_format: &OutputFormat,
    config: &AnalysisConfig,
) -> Result<(), NeuroplayCliError> {
    let mut sessions: Vec<GameSession> = serde_json::from_str(&read_input(input)?)?;
    if sessions.is_empty() {
        return Err(NeuroplayCliError::NoSessions);
    }
    sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    let order: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();

    let store = Arc::new(InMemoryStore::with_sessions(sessions));
    let pipeline = SessionPipeline::with_config(store, config);

    let mut outcomes: Vec<SessionOutcome> = Vec::with_capacity(order.len());
    for session_id in &order {
        outcomes.push(pipeline.process_session(session_id)?);
    }

    match output_format {
        OutputFormat::Ndjson => {
            for outcome in &outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
        }
        _ => println!("{}", format_record(&outcomes, output_format)?),
    }

    let processed = outcomes
        .iter()
        .filter(|o| matches!(o, SessionOutcome::Processed(_)))
        .count();
    tracing::info!(
        sessions = outcomes.len(),
        processed,
        bypassed = outcomes.len() - processed,
        "replay finished"
    );
    Ok(())
}

fn cmd_cohort(
    input: &Path,
    output_format: &OutputFormat,
    config: &AnalysisConfig,
) -> Result<(), NeuroplayCliError> {
    let sessions: Vec<CohortSession> = serde_json::from_str(&read_input(input)?)?;
    let outcome = CohortAnalyzer::new(config).analyze(&sessions);
    println!("{}", format_record(&outcome, output_format)?);
    Ok(())
}

fn cmd_stats(
    input: &Path,
    player: Option<&str>,
    game: Option<&str>,
    output_format: &OutputFormat,
) -> Result<(), NeuroplayCliError> {
    let sessions: Vec<GameSession> = serde_json::from_str(&read_input(input)?)?;
    let sessions: Vec<GameSession> = match player {
        Some(player) => sessions
            .into_iter()
            .filter(|s| s.player_id == player)
            .collect(),
        None => sessions,
    };

    let output = match game {
        Some(game) => {
            let performance =
                game_performance(game, &sessions).ok_or(NeuroplayCliError::NoSessions)?;
            format_record(&performance, output_format)?
        }
        None => {
            let stats = player_stats(&sessions).ok_or(NeuroplayCliError::NoSessions)?;
            format_record(&stats, output_format)?
        }
    };
    println!("{}", output);
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), NeuroplayCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("neuroplay-analytics version {}", VERSION),
    });

    let config_check = match config_path {
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file given, using built-in defaults".to_string(),
        },
        Some(path) if !path.exists() => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: format!("Config file does not exist: {}", path.display()),
        },
        Some(path) => match AnalysisConfig::load(path).and_then(|c| c.validate()) {
            Ok(()) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("Config file valid: {}", path.display()),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        },
    };
    checks.push(config_check);

    // stdin availability for `-` inputs
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Warning,
            message: "stdin is a TTY; pass files with --input".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("NeuroPlay Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(NeuroplayCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn format_record<T: serde::Serialize>(
    record: &T,
    format: &OutputFormat,
) -> Result<String, NeuroplayCliError> {
    Ok(match format {
        OutputFormat::JsonPretty => serde_json::to_string_pretty(record)?,
        OutputFormat::Json | OutputFormat::Ndjson => serde_json::to_string(record)?,
    })
}

// Error types

#[derive(Debug)]
enum NeuroplayCliError {
    Io(io::Error),
    Analytics(AnalyticsError),
    Json(serde_json::Error),
    NoSessions,
    DoctorFailed,
}

impl From<io::Error> for NeuroplayCliError {
    fn from(e: io::Error) -> Self {
        NeuroplayCliError::Io(e)
    }
}

impl From<AnalyticsError> for NeuroplayCliError {
    fn from(e: AnalyticsError) -> Self {
        NeuroplayCliError::Analytics(e)
    }
}

impl From<serde_json::Error> for NeuroplayCliError {
    fn from(e: serde_json::Error) -> Self {
        NeuroplayCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<NeuroplayCliError> for CliError {
    fn from(e: NeuroplayCliError) -> Self {
        match e {
            NeuroplayCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            NeuroplayCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            NeuroplayCliError::Analytics(e) => {
                let (code, hint) = match &e {
                    AnalyticsError::MalformedInput { .. } => (
                        "MALFORMED_INPUT",
                        "Ensure session_data holds numeric arrays and non-negative counts",
                    ),
                    AnalyticsError::InsufficientData(_) => {
                        ("INSUFFICIENT_DATA", "Provide more sessions and retry")
                    }
                    AnalyticsError::ConcurrentUpdateConflict { .. } => {
                        ("CONCURRENT_UPDATE", "Retry the submission")
                    }
                    AnalyticsError::NotFound { .. } => {
                        ("NOT_FOUND", "Check the session and player ids")
                    }
                    AnalyticsError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
                    AnalyticsError::Config(_) => {
                        ("CONFIG_ERROR", "Run 'neuroplay doctor --config <file>' for details")
                    }
                    AnalyticsError::Storage(_) => ("STORAGE_ERROR", "Check the session store"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            NeuroplayCliError::NoSessions => CliError {
                code: "NO_SESSIONS".to_string(),
                message: "No matching sessions found in input".to_string(),
                hint: Some("Check the --player and --game filters".to_string()),
            },
            NeuroplayCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
