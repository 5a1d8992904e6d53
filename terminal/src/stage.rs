//! One pipeline stage: persist a payload, run an external tool on it, capture stdout.
//!
//! The [`StageRunner`] trait decouples the session loop from process spawning.
//! Tests use a scripted runner that returns predetermined outputs without
//! spawning anything.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::exit_codes;
use crate::io::config::{NonZeroExitPolicy, StderrPolicy, TerminalConfig};
use crate::io::process::{collect_output, spawn_captured};

/// Which end of the pipeline a stage is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lexer,
    Parser,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Lexer => "lexer",
            Stage::Parser => "parser",
        }
    }

    /// Capitalized name used in output labels.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Lexer => "Lexer",
            Stage::Parser => "Parser",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters for one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRequest {
    pub stage: Stage,
    /// Text written verbatim to `handoff_path` before the tool starts.
    pub payload: String,
    /// File the tool receives as its only argument. Overwritten on every call.
    pub handoff_path: PathBuf,
    pub executable: PathBuf,
}

/// Result of a completed stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    /// Captured stdout, decoded lossily. Trailing newlines are kept as written.
    pub stdout: String,
    /// Captured stderr. Always empty under `discard` and `merge`.
    pub stderr: String,
    /// `None` when the tool was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl StageOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Failure class, used to pick an exit code and to report what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Launch,
    Io,
    ExitStatus,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Launch => "launch failure",
            FailureKind::Io => "I/O failure",
            FailureKind::ExitStatus => "non-zero exit",
        })
    }
}

/// Why a stage did not produce a result.
#[derive(Debug)]
pub enum StageError {
    /// The executable could not be started.
    Launch {
        stage: Stage,
        executable: PathBuf,
        source: std::io::Error,
    },
    /// The executable did not exit within the configured timeout and was killed.
    TimedOut {
        stage: Stage,
        executable: PathBuf,
        timeout: Duration,
    },
    /// The hand-off file could not be written, or the tool's output could not be read.
    Io {
        stage: Stage,
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    /// The tool exited non-zero and the policy is `fail`.
    ExitStatus {
        stage: Stage,
        executable: PathBuf,
        code: Option<i32>,
    },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Launch { stage, .. }
            | StageError::TimedOut { stage, .. }
            | StageError::Io { stage, .. }
            | StageError::ExitStatus { stage, .. } => *stage,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::Launch { .. } | StageError::TimedOut { .. } => FailureKind::Launch,
            StageError::Io { .. } => FailureKind::Io,
            StageError::ExitStatus { .. } => FailureKind::ExitStatus,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            FailureKind::Launch => exit_codes::LAUNCH_FAILURE,
            FailureKind::Io => exit_codes::IO_FAILURE,
            FailureKind::ExitStatus => exit_codes::STAGE_EXIT,
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            StageError::Launch {
                executable, source, ..
            } => write!(f, "{kind}: could not start {}: {source}", executable.display()),
            StageError::TimedOut {
                executable,
                timeout,
                ..
            } => write!(
                f,
                "{kind}: {} did not finish within {timeout:?}",
                executable.display()
            ),
            StageError::Io {
                action,
                path,
                source,
                ..
            } => write!(f, "{kind}: {action} {}: {source}", path.display()),
            StageError::ExitStatus {
                executable, code, ..
            } => match code {
                Some(code) => write!(f, "{kind}: {} exited with status {code}", executable.display()),
                None => write!(f, "{kind}: {} was terminated by a signal", executable.display()),
            },
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StageError::Launch { source, .. } | StageError::Io { source, .. } => Some(source),
            StageError::TimedOut { .. } | StageError::ExitStatus { .. } => None,
        }
    }
}

/// Abstraction over stage execution.
pub trait StageRunner {
    /// Write `request.payload` to `request.handoff_path`, run the executable on it and
    /// return what it printed.
    fn run(&self, request: &StageRequest) -> Result<StageOutput, StageError>;
}

/// Runner that spawns the stage executable as a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStageRunner {
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
    pub stderr: StderrPolicy,
    pub nonzero_exit: NonZeroExitPolicy,
}

impl Default for ProcessStageRunner {
    fn default() -> Self {
        Self::from_config(&TerminalConfig::default())
    }
}

impl ProcessStageRunner {
    pub fn from_config(cfg: &TerminalConfig) -> Self {
        Self {
            timeout: cfg.stage_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
            stderr: cfg.stderr,
            nonzero_exit: cfg.nonzero_exit,
        }
    }
}

impl StageRunner for ProcessStageRunner {
    #[instrument(skip_all, fields(stage = %request.stage, payload_bytes = request.payload.len()))]
    fn run(&self, request: &StageRequest) -> Result<StageOutput, StageError> {
        let stage = request.stage;

        write_payload(&request.handoff_path, &request.payload).map_err(|source| {
            error!(err = %source, path = %request.handoff_path.display(), "failed to write hand-off file");
            StageError::Io {
                stage,
                action: "write hand-off file",
                path: request.handoff_path.clone(),
                source,
            }
        })?;
        debug!(path = %request.handoff_path.display(), "hand-off file written");

        let mut cmd = Command::new(&request.executable);
        cmd.arg(&request.handoff_path);
        let child = spawn_captured(cmd, self.stderr != StderrPolicy::Discard).map_err(|source| {
            error!(err = %source, executable = %request.executable.display(), "failed to start stage");
            StageError::Launch {
                stage,
                executable: request.executable.clone(),
                source,
            }
        })?;

        let output = collect_output(child, self.timeout, self.output_limit_bytes).map_err(|err| {
            StageError::Io {
                stage,
                action: "collect output of",
                path: request.executable.clone(),
                source: std::io::Error::other(format!("{err:#}")),
            }
        })?;

        if output.timed_out {
            return Err(StageError::TimedOut {
                stage,
                executable: request.executable.clone(),
                timeout: self.timeout.unwrap_or_default(),
            });
        }

        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if self.stderr == StderrPolicy::Merge {
            stdout.push_str(&stderr);
            stderr.clear();
        }

        let exit_code = output.status.code();
        if !output.status.success() {
            match self.nonzero_exit {
                NonZeroExitPolicy::Ignore => {}
                NonZeroExitPolicy::Warn => {
                    warn!(stage = %stage, exit_code = ?exit_code, "stage exited non-zero");
                }
                NonZeroExitPolicy::Fail => {
                    return Err(StageError::ExitStatus {
                        stage,
                        executable: request.executable.clone(),
                        code: exit_code,
                    });
                }
            }
        }

        info!(exit_code = ?exit_code, stdout_bytes = stdout.len(), "stage finished");
        Ok(StageOutput {
            stdout,
            stderr,
            exit_code,
            stdout_truncated: output.stdout_truncated,
            stderr_truncated: output.stderr_truncated,
        })
    }
}

/// Run one stage with default settings and return its stdout.
///
/// `handoff_path` is overwritten with `payload` before the tool starts.
pub fn run_stage(
    stage: Stage,
    payload: &str,
    handoff_path: &Path,
    executable: &Path,
) -> Result<String, StageError> {
    let request = StageRequest {
        stage,
        payload: payload.to_string(),
        handoff_path: handoff_path.to_path_buf(),
        executable: executable.to_path_buf(),
    };
    ProcessStageRunner::default()
        .run(&request)
        .map(|output| output.stdout)
}

/// Truncate and rewrite the hand-off file, synced before any child is spawned.
fn write_payload(path: &Path, payload: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(payload.as_bytes())?;
    file.sync_all()
}
