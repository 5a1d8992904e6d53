//! Lexer-then-parser orchestration for a single payload.
//!
//! Shared by the interactive session and by `terminal run`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::config::TerminalConfig;
use crate::io::handoff::Handoff;
use crate::stage::{Stage, StageOutput, StageRequest, StageRunner};

/// Executables and hand-off files for one session.
#[derive(Debug)]
pub struct Pipeline {
    pub lexer: PathBuf,
    pub parser: PathBuf,
    pub handoff: Handoff,
}

/// Both stage results of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub lexer: StageOutput,
    pub parser: StageOutput,
}

impl Pipeline {
    pub fn new(lexer: PathBuf, parser: PathBuf, handoff: Handoff) -> Self {
        Self {
            lexer,
            parser,
            handoff,
        }
    }

    pub fn from_config(cfg: &TerminalConfig) -> Result<Self> {
        let handoff = Handoff::from_dir_option(cfg.handoff_dir.as_deref())?;
        Ok(Self::new(
            cfg.lexer.executable.clone(),
            cfg.parser.executable.clone(),
            handoff,
        ))
    }

    pub fn executable(&self, stage: Stage) -> &PathBuf {
        match stage {
            Stage::Lexer => &self.lexer,
            Stage::Parser => &self.parser,
        }
    }

    pub fn request(&self, stage: Stage, payload: &str) -> StageRequest {
        StageRequest {
            stage,
            payload: payload.to_string(),
            handoff_path: self.handoff.path_for(stage),
            executable: self.executable(stage).clone(),
        }
    }
}

/// Run the lexer on `source`, show its output, then run the parser on exactly
/// that output and show the result.
///
/// A [`StageError`](crate::stage::StageError) from either stage is returned inside the
/// `anyhow::Error`; the parser is never started after a lexer failure.
#[instrument(skip_all, fields(source_bytes = source.len()))]
pub fn run_pipeline<S: StageRunner, W: Write>(
    runner: &S,
    pipeline: &Pipeline,
    source: &str,
    out: &mut W,
) -> Result<PipelineOutcome> {
    let lexer = runner.run(&pipeline.request(Stage::Lexer, source))?;
    display_stage(out, Stage::Lexer, &lexer).context("write lexer output")?;

    debug!(payload_bytes = lexer.stdout.len(), "handing lexer output to parser");
    let parser = runner.run(&pipeline.request(Stage::Parser, &lexer.stdout))?;
    display_stage(out, Stage::Parser, &parser).context("write parser output")?;

    Ok(PipelineOutcome { lexer, parser })
}

/// Print a stage's result under its label, plus stderr and truncation notes if any.
pub fn display_stage<W: Write>(
    out: &mut W,
    stage: Stage,
    output: &StageOutput,
) -> std::io::Result<()> {
    writeln!(out, "{} Output:", stage.label())?;
    write_block(out, &output.stdout)?;
    if !output.stderr.is_empty() {
        writeln!(out, "{} Errors:", stage.label())?;
        write_block(out, &output.stderr)?;
    }
    if output.stdout_truncated > 0 {
        writeln!(
            out,
            "[{stage} stdout truncated {} bytes]",
            output.stdout_truncated
        )?;
    }
    if output.stderr_truncated > 0 {
        writeln!(
            out,
            "[{stage} stderr truncated {} bytes]",
            output.stderr_truncated
        )?;
    }
    out.flush()
}

fn write_block<W: Write>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}
