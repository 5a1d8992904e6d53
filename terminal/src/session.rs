//! The interactive read/run/display loop.
//!
//! One line per iteration goes through [`run_pipeline`]. `exit`/`quit` (any case,
//! surrounding whitespace ignored) or end of input end the session. A failing
//! stage is reported and the loop carries on with the next prompt.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::pipeline::{Pipeline, run_pipeline};
use crate::stage::{StageError, StageRunner};

pub const WELCOME: &str = "Welcome to the Sharkara Terminal";
pub const FAREWELL: &str = "Exiting Sharkara Terminal.";

const EXIT_KEYWORDS: [&str; 2] = ["exit", "quit"];

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ExitKeyword,
    EndOfInput,
}

/// Summary of a session, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Lines that went through both stages.
    pub lines_processed: u32,
    /// Lines abandoned because a stage failed.
    pub stage_failures: u32,
    pub end: SessionEnd,
}

/// True when `line` asks to end the session.
pub fn is_exit_keyword(line: &str) -> bool {
    let folded = line.trim().to_lowercase();
    EXIT_KEYWORDS.contains(&folded.as_str())
}

/// Run the session until an exit keyword or end of input.
///
/// Stage failures are printed to `output` and do not end the session. Errors
/// reading `input` or writing `output` do.
pub fn run_session<R: BufRead, W: Write, S: StageRunner>(
    mut input: R,
    mut output: W,
    runner: &S,
    pipeline: &Pipeline,
    prompt: &str,
) -> Result<SessionSummary> {
    writeln!(output, "{WELCOME}").context("write welcome")?;
    info!(handoff_dir = %pipeline.handoff.dir().display(), "session started");

    let mut lines_processed = 0u32;
    let mut stage_failures = 0u32;
    loop {
        write!(output, "{prompt}").context("write prompt")?;
        output.flush().context("flush prompt")?;

        let Some(line) = read_input_line(&mut input).context("read input line")? else {
            debug!("end of input");
            writeln!(output).context("write newline")?;
            writeln!(output, "{FAREWELL}").context("write farewell")?;
            return Ok(SessionSummary {
                lines_processed,
                stage_failures,
                end: SessionEnd::EndOfInput,
            });
        };

        if is_exit_keyword(&line) {
            writeln!(output, "{FAREWELL}").context("write farewell")?;
            return Ok(SessionSummary {
                lines_processed,
                stage_failures,
                end: SessionEnd::ExitKeyword,
            });
        }

        match run_pipeline(runner, pipeline, &line, &mut output) {
            Ok(_) => lines_processed += 1,
            Err(err) => {
                let Some(stage_err) = err.downcast_ref::<StageError>() else {
                    return Err(err);
                };
                warn!(stage = %stage_err.stage(), kind = %stage_err.kind(), "stage failed");
                stage_failures += 1;
                writeln!(
                    output,
                    "error: {} stage failed: {stage_err}",
                    stage_err.stage()
                )
                .context("write stage failure")?;
            }
        }
    }
}

/// Read one line without its terminator. `None` at end of input.
///
/// Invalid UTF-8 is replaced rather than rejected so a stray byte cannot end the session.
fn read_input_line<R: BufRead>(input: &mut R) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    if input.read_until(b'\n', &mut buf)? == 0 {
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

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::io::handoff::Handoff;
    use crate::stage::Stage;
    use crate::test_support::{ScriptedStage, ScriptedStageRunner};

    fn pipeline() -> Pipeline {
        Pipeline::new(
            PathBuf::from("./lexer"),
            PathBuf::from("./parser"),
            Handoff::temporary().expect("handoff"),
        )
    }

    fn session(input: &str, runner: &ScriptedStageRunner) -> (SessionSummary, String) {
        let mut out = Vec::new();
        let summary = run_session(input.as_bytes(), &mut out, runner, &pipeline(), "> ")
            .expect("session");
        (summary, String::from_utf8(out).expect("utf8"))
    }

    #[test]
    fn exit_keywords_are_trimmed_and_case_folded() {
        for line in ["exit", "quit", "EXIT", "  Quit  ", "\tqUiT"] {
            assert!(is_exit_keyword(line), "{line:?}");
        }
        for line in ["", "exit now", "quit;", "ex it", "q"] {
            assert!(!is_exit_keyword(line), "{line:?}");
        }
    }

    #[test]
    fn quit_runs_no_stage() {
        let runner = ScriptedStageRunner::new(Vec::new());
        let (summary, out) = session("quit\n", &runner);

        assert_eq!(summary.end, SessionEnd::ExitKeyword);
        assert_eq!(summary.lines_processed, 0);
        assert!(runner.calls().is_empty());
        assert_eq!(out, format!("{WELCOME}\n> {FAREWELL}\n"));
    }

    #[test]
    fn each_line_runs_lexer_then_parser_once() {
        let runner = ScriptedStageRunner::new(vec![
            ScriptedStage::Output("A1".to_string()),
            ScriptedStage::Output("B1".to_string()),
            ScriptedStage::Output("A2".to_string()),
            ScriptedStage::Output("B2".to_string()),
        ]);
        let (summary, out) = session("x = 1\ny = 2\nexit\n", &runner);

        assert_eq!(summary.lines_processed, 2);
        let calls = runner.calls();
        let order: Vec<(Stage, &str)> = calls
            .iter()
            .map(|call| (call.stage, call.payload.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Stage::Lexer, "x = 1"),
                (Stage::Parser, "A1"),
                (Stage::Lexer, "y = 2"),
                (Stage::Parser, "A2"),
            ]
        );
        assert_eq!(
            out,
            format!(
                "{WELCOME}\n> Lexer Output:\nA1\nParser Output:\nB1\n> Lexer Output:\nA2\nParser Output:\nB2\n> {FAREWELL}\n"
            )
        );
    }

    #[test]
    fn empty_line_goes_through_both_stages() {
        let runner = ScriptedStageRunner::new(vec![
            ScriptedStage::Output(String::new()),
            ScriptedStage::Output(String::new()),
        ]);
        let (summary, _) = session("\nquit\n", &runner);

        assert_eq!(summary.lines_processed, 1);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].payload, "");
    }

    #[test]
    fn end_of_input_ends_session_cleanly() {
        let runner = ScriptedStageRunner::new(vec![
            ScriptedStage::Output("A".to_string()),
            ScriptedStage::Output("B".to_string()),
        ]);
        // Last line has no terminator.
        let (summary, out) = session("x", &runner);

        assert_eq!(summary.end, SessionEnd::EndOfInput);
        assert_eq!(summary.lines_processed, 1);
        assert!(out.ends_with(&format!("> \n{FAREWELL}\n")));
    }

    #[test]
    fn lexer_failure_is_reported_and_session_continues() {
        let runner = ScriptedStageRunner::new(vec![
            ScriptedStage::LaunchFailure,
            ScriptedStage::Output("A".to_string()),
            ScriptedStage::Output("B".to_string()),
        ]);
        let (summary, out) = session("x = 1\ny\nquit\n", &runner);

        assert_eq!(summary.stage_failures, 1);
        assert_eq!(summary.lines_processed, 1);
        let stages: Vec<Stage> = runner.calls().iter().map(|call| call.stage).collect();
        assert_eq!(stages, vec![Stage::Lexer, Stage::Lexer, Stage::Parser]);
        assert!(out.contains("> error: lexer stage failed: launch failure: could not start ./lexer"));
        // The next prompt follows the failure report.
        let after = out.split("error: lexer stage failed").nth(1).expect("failure line");
        assert!(after.contains("\n> Lexer Output:"));
    }

    #[test]
    fn parser_io_failure_names_parser_stage() {
        let runner = ScriptedStageRunner::new(vec![
            ScriptedStage::Output("A".to_string()),
            ScriptedStage::IoFailure,
        ]);
        let (summary, out) = session("x\n", &runner);

        assert_eq!(summary.stage_failures, 1);
        assert!(out.contains("Lexer Output:\nA\n"));
        assert!(out.contains("error: parser stage failed: I/O failure: write hand-off file"));
    }

    #[test]
    fn crlf_and_invalid_utf8_are_normalized() {
        let mut input: &[u8] = b"x = 1\r\n\xffy\n";
        assert_eq!(
            read_input_line(&mut input).expect("read"),
            Some("x = 1".to_string())
        );
        assert_eq!(
            read_input_line(&mut input).expect("read"),
            Some("\u{fffd}y".to_string())
        );
        assert_eq!(read_input_line(&mut input).expect("read"), None);
    }
}
