//! Test-only helpers: a scripted stage runner and fake stage executables.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::stage::{StageError, StageOutput, StageRequest, StageRunner};

/// Canned response for one [`ScriptedStageRunner`] call.
#[derive(Debug, Clone)]
pub enum ScriptedStage {
    /// Succeed with this stdout and exit code 0.
    Output(String),
    /// Fail as if the executable were missing.
    LaunchFailure,
    /// Fail as if the hand-off file could not be written.
    IoFailure,
}

/// Stage runner that records every request and replays scripted responses in order.
///
/// Panics when called more times than responses were scripted.
pub struct ScriptedStageRunner {
    responses: RefCell<VecDeque<ScriptedStage>>,
    calls: RefCell<Vec<StageRequest>>,
}

impl ScriptedStageRunner {
    pub fn new(responses: Vec<ScriptedStage>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Requests received so far, oldest first.
    pub fn calls(&self) -> Vec<StageRequest> {
        self.calls.borrow().clone()
    }
}

impl StageRunner for ScriptedStageRunner {
    fn run(&self, request: &StageRequest) -> Result<StageOutput, StageError> {
        self.calls.borrow_mut().push(request.clone());
        let response = self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted response left for {} stage", request.stage));
        match response {
            ScriptedStage::Output(stdout) => Ok(stage_output(&stdout)),
            ScriptedStage::LaunchFailure => Err(StageError::Launch {
                stage: request.stage,
                executable: request.executable.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            ScriptedStage::IoFailure => Err(StageError::Io {
                stage: request.stage,
                action: "write hand-off file",
                path: request.handoff_path.clone(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            }),
        }
    }
}

/// Successful stage output with the given stdout.
pub fn stage_output(stdout: &str) -> StageOutput {
    StageOutput {
        stdout: stdout.to_string(),
        exit_code: Some(0),
        ..StageOutput::default()
    }
}

/// Write an executable `/bin/sh` script named `name` into `dir`.
///
/// The script receives the hand-off file as `$1`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> std::io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Fake lexer that appends its name to `log` and prints `LEX[<file contents>]`.
#[cfg(unix)]
pub fn echo_lexer(dir: &Path, log: &Path) -> std::io::Result<PathBuf> {
    write_script(
        dir,
        "lexer",
        &format!(
            "echo lexer >> '{}'\nprintf 'LEX[%s]\\n' \"$(cat \"$1\")\"",
            log.display()
        ),
    )
}

/// Fake parser that appends its name to `log` and prints `PARSE[<file contents>]`.
#[cfg(unix)]
pub fn echo_parser(dir: &Path, log: &Path) -> std::io::Result<PathBuf> {
    write_script(
        dir,
        "parser",
        &format!(
            "echo parser >> '{}'\nprintf 'PARSE[%s]\\n' \"$(cat \"$1\")\"",
            log.display()
        ),
    )
}

/// Lines of an invocation log written by [`echo_lexer`] / [`echo_parser`].
pub fn read_log(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
