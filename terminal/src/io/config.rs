//! Terminal configuration stored in `terminal.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "terminal.toml";

/// Terminal configuration (TOML).
///
/// Missing fields default to the values the terminal has always used: `./lexer`
/// and `./parser` next to the working directory, no timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TerminalConfig {
    /// Prompt printed before each input line.
    pub prompt: String,

    /// Directory for the two hand-off files. A fresh temporary directory is
    /// created for each session when unset.
    pub handoff_dir: Option<PathBuf>,

    /// Kill a stage that runs longer than this. Unset means wait forever.
    pub stage_timeout_secs: Option<u64>,

    /// Keep at most this many bytes of each stage's stdout and stderr.
    pub output_limit_bytes: usize,

    pub stderr: StderrPolicy,

    pub nonzero_exit: NonZeroExitPolicy,

    pub lexer: StageConfig,

    pub parser: StageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Executable invoked as `<executable> <handoff-file>`.
    pub executable: PathBuf,
}

/// What to do with a stage's stderr.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StderrPolicy {
    /// Send stderr to null.
    Discard,
    /// Append stderr after stdout in the stage result (and so in the next payload).
    Merge,
    /// Capture stderr and show it under its own label; never forwarded.
    #[default]
    Separate,
}

/// How a non-zero stage exit status is treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NonZeroExitPolicy {
    Ignore,
    /// Log a warning; the captured output is still used.
    #[default]
    Warn,
    /// Fail the stage like a launch or I/O failure.
    Fail,
}

impl StageConfig {
    fn with_executable(executable: &str) -> Self {
        Self {
            executable: PathBuf::from(executable),
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            prompt: "Sharkara> ".to_string(),
            handoff_dir: None,
            stage_timeout_secs: None,
            output_limit_bytes: 1_000_000,
            stderr: StderrPolicy::default(),
            nonzero_exit: NonZeroExitPolicy::default(),
            lexer: StageConfig::with_executable("./lexer"),
            parser: StageConfig::with_executable("./parser"),
        }
    }
}

impl TerminalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prompt.is_empty() {
            return Err(anyhow!("prompt must not be empty"));
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(anyhow!("stage_timeout_secs must be > 0 when set"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.lexer.executable.as_os_str().is_empty() {
            return Err(anyhow!("lexer.executable must not be empty"));
        }
        if self.parser.executable.as_os_str().is_empty() {
            return Err(anyhow!("parser.executable must not be empty"));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TerminalConfig::default()`.
pub fn load_config(path: &Path) -> Result<TerminalConfig> {
    if !path.exists() {
        let cfg = TerminalConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TerminalConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Render the config as TOML, for `terminal config`.
pub fn render_config(cfg: &TerminalConfig) -> Result<String> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    Ok(buf)
}
