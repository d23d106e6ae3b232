//! stagelock: answer each stage's question to reveal the next one
//!
//! Commands:
//!   play (default)  - walk the puzzle chain from the root stage
//!   check           - load and validate the root stage document
//!   config show     - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::{info, warn};

use stagelock_chain::{LineSource, PuzzleChain, Session, SessionOutcome, StageView};
use stagelock_core::config::StagelockConfig;
use stagelock_core::StageNode;
use stagelock_crypto::ProgressFn;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "stagelock",
    version,
    about = "Passphrase-gated multi-stage puzzle",
    long_about = "stagelock: each stage shows a question; the right answer decrypts the next stage"
)]
struct Cli {
    /// Path to stagelock.toml configuration file
    #[arg(long, short = 'c', env = "STAGELOCK_CONFIG", default_value = "stagelock.toml")]
    config: PathBuf,

    /// Root stage document (overrides puzzle.path)
    #[arg(long, short = 'p', env = "STAGELOCK_PUZZLE")]
    puzzle: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error; overrides log.level)
    #[arg(long, env = "STAGELOCK_LOG")]
    log: Option<String>,

    /// Log format (overrides log.format)
    #[arg(long, env = "STAGELOCK_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk the puzzle chain, reading answers from stdin
    Play,

    /// Load and validate the root stage document without prompting
    Check,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = StagelockConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    if let Some(puzzle) = &cli.puzzle {
        config.puzzle.path = puzzle.clone();
    }
    if let Some(level) = &cli.log {
        config.log.level = level.clone();
    }
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None if config.log.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };

    init_logging(&config.log.level, &format);

    if !cli.config.exists() {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        puzzle = %config.puzzle.path.display(),
        "stagelock starting"
    );

    match cli.command.unwrap_or(Commands::Play) {
        Commands::Play => cmd_play(&config).await,
        Commands::Check => cmd_check(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the puzzle text; diagnostics go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Commands ───────────────────────────────────────────────────────────────────

async fn cmd_play(config: &StagelockConfig) -> Result<()> {
    let mut chain = load_chain(&config.puzzle.path).await?;
    let session = Session::from_config(config);
    let progress = thinking_progress();

    let mut input = InputLines::stdin();
    let mut view = StdoutView;

    let outcome = session
        .run(&mut chain, &mut input, &mut view, Some(&progress))
        .await
        .context("puzzle session failed")?;

    match outcome {
        SessionOutcome::Completed { unlocked } => {
            info!(unlocked, "puzzle complete");
        }
        SessionOutcome::InputClosed { unlocked } => {
            // Leave the shell prompt on its own line
            println!();
            info!(unlocked, "input closed before the final stage");
        }
    }
    Ok(())
}

async fn cmd_check(config: &StagelockConfig) -> Result<()> {
    let chain = load_chain(&config.puzzle.path).await?;
    let root = chain.current();

    println!("puzzle:      {}", config.puzzle.path.display());
    if root.is_terminal() {
        println!("root:        terminal");
    } else {
        println!("root:        locked");
        println!("candidates:  {}", root.candidates().len());
    }
    println!("text bytes:  {}", root.display().len());
    Ok(())
}

fn cmd_config_show(config: &StagelockConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

async fn load_chain(path: &Path) -> Result<PuzzleChain> {
    PuzzleChain::load(path)
        .await
        .with_context(|| format!("loading puzzle: {}", path.display()))
}

// ── Terminal I/O ───────────────────────────────────────────────────────────────

struct InputLines<R> {
    reader: R,
}

impl InputLines<BufReader<Stdin>> {
    fn stdin() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
        }
    }
}

impl<R: AsyncBufRead + Unpin> InputLines<R> {
    /// Next line without its terminator. Bytes that are not UTF-8 are
    /// replaced, so such a line is just another wrong answer.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

impl<R: AsyncBufRead + Unpin> LineSource for InputLines<R> {
    async fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        drop(stdout);

        self.next_line().await
    }
}

struct StdoutView;

impl StageView for StdoutView {
    fn show(&mut self, stage: &StageNode) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout)?;
        writeln!(stdout, "{}", stage.display_text())?;
        writeln!(stdout)?;
        stdout.flush()
    }
}

/// Spinner shown while a key is derived. Appears on the first estimate and
/// is cleared on the final 100.
fn thinking_progress() -> ProgressFn {
    let active: Mutex<Option<ProgressBar>> = Mutex::new(None);
    Box::new(move |percent| {
        let Ok(mut slot) = active.lock() else {
            return;
        };
        if percent >= 100 {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
            return;
        }
        slot.get_or_insert_with(make_spinner)
            .set_position(u64::from(percent));
    })
}

fn make_spinner() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{spinner} {msg} {pos:>2}%")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&[
            "[    ]", "[=   ]", "[==  ]", "[=== ]", "[ ===]", "[  ==]", "[   =]", "[    ]",
            "[   =]", "[  ==]", "[ ===]", "[====]", "[=== ]", "[==  ]", "[=   ]", "[====]",
        ]);
    pb.set_style(style);
    pb.set_message("Thinking...");
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["stagelock"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("stagelock.toml"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "stagelock",
            "--puzzle",
            "hunt.json",
            "--log-format",
            "json",
            "check",
        ])
        .unwrap();
        assert_eq!(cli.puzzle, Some(PathBuf::from("hunt.json")));
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
        assert!(matches!(cli.command, Some(Commands::Check)));
    }

    #[tokio::test]
    async fn test_input_lines_terminators_and_invalid_utf8() {
        let mut input = InputLines {
            reader: &b"ab-12\r\n\xff\xfeq\n\nlast"[..],
        };

        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("ab-12"));
        assert_eq!(
            input.next_line().await.unwrap().as_deref(),
            Some("\u{FFFD}\u{FFFD}q")
        );
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(input.next_line().await.unwrap(), None);
    }

    #[test]
    fn test_progress_sink_accepts_full_sequence() {
        let progress = thinking_progress();
        for percent in [0, 10, 55, 99, 100] {
            progress(percent);
        }
        // A second derivation starts a fresh spinner
        progress(0);
        progress(100);
    }
}
