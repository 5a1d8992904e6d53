//! Interactive terminal for an external lexer/parser pipeline.
//!
//! Reads configuration from `terminal.toml` (if present), applies command-line
//! overrides, and either runs the interactive session or a single pipeline pass.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use terminal::exit_codes;
use terminal::io::config::{DEFAULT_CONFIG_PATH, TerminalConfig, load_config, render_config};
use terminal::logging;
use terminal::pipeline::{Pipeline, run_pipeline};
use terminal::session::run_session;
use terminal::stage::ProcessStageRunner;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "terminal",
    version,
    about = "Interactive terminal for an external lexer/parser pipeline"
)]
struct Cli {
    /// Config file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Lexer executable (overrides `lexer.executable`).
    #[arg(long, global = true)]
    lexer: Option<PathBuf>,

    /// Parser executable (overrides `parser.executable`).
    #[arg(long, global = true)]
    parser: Option<PathBuf>,

    /// Keep hand-off files in this directory instead of a per-session temp dir.
    #[arg(long, global = true)]
    handoff_dir: Option<PathBuf>,

    /// Kill a stage that runs longer than this many seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Read lines from stdin and run each through the lexer and parser (default).
    Session,
    /// Run the lexer and parser once and exit with a status describing the outcome.
    Run {
        /// Source text for the lexer.
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        source: Option<String>,
        /// Read the source text from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            exit_codes::for_error(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return Ok(report_usage(&err)),
    };
    let cfg = effective_config(&cli)?;
    match cli.command.unwrap_or(Command::Session) {
        Command::Session => cmd_session(&cfg),
        Command::Run { source, file } => cmd_run(&cfg, source, file),
        Command::Config => cmd_config(&cfg),
    }
}

/// Print a clap error or help text; usage errors map to `INVALID`, `--help`/`--version` to `OK`.
fn report_usage(err: &clap::Error) -> i32 {
    let _ = err.print();
    if err.use_stderr() {
        exit_codes::INVALID
    } else {
        exit_codes::OK
    }
}

fn effective_config(cli: &Cli) -> Result<TerminalConfig> {
    let mut cfg = load_config(&cli.config)?;
    if let Some(lexer) = &cli.lexer {
        cfg.lexer.executable = lexer.clone();
    }
    if let Some(parser) = &cli.parser {
        cfg.parser.executable = parser.clone();
    }
    if let Some(dir) = &cli.handoff_dir {
        cfg.handoff_dir = Some(dir.clone());
    }
    if let Some(secs) = cli.timeout_secs {
        cfg.stage_timeout_secs = Some(secs);
    }
    cfg.validate().context("invalid command-line overrides")?;
    Ok(cfg)
}

fn cmd_session(cfg: &TerminalConfig) -> Result<i32> {
    let pipeline = Pipeline::from_config(cfg)?;
    let runner = ProcessStageRunner::from_config(cfg);
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let summary = run_session(stdin.lock(), stdout.lock(), &runner, &pipeline, &cfg.prompt)?;
    info!(
        lines_processed = summary.lines_processed,
        stage_failures = summary.stage_failures,
        end = ?summary.end,
        "session finished"
    );
    Ok(exit_codes::OK)
}

fn cmd_run(cfg: &TerminalConfig, source: Option<String>, file: Option<PathBuf>) -> Result<i32> {
    let source = match (source, file) {
        (Some(source), _) => source,
        (None, Some(path)) => {
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?
        }
        (None, None) => bail!("missing SOURCE or --file"),
    };
    let pipeline = Pipeline::from_config(cfg)?;
    let runner = ProcessStageRunner::from_config(cfg);
    let mut stdout = std::io::stdout().lock();
    run_pipeline(&runner, &pipeline, &source, &mut stdout)?;
    Ok(exit_codes::OK)
}

fn cmd_config(cfg: &TerminalConfig) -> Result<i32> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(render_config(cfg)?.as_bytes())
        .context("write config")?;
    Ok(exit_codes::OK)
}
