//! Hand-off files passed to the stage executables.
//!
//! Each stage has one file with a fixed name inside the hand-off directory. By
//! default the directory is a fresh temporary directory owned by the session
//! and removed when it ends, so two sessions never share files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::debug;

use crate::stage::Stage;

/// Hand-off file for the lexer stage (raw source line).
pub const SOURCE_FILE: &str = "source.txt";
/// Hand-off file for the parser stage (lexer output).
pub const TOKENS_FILE: &str = "tokens.txt";

#[derive(Debug)]
pub struct Handoff {
    dir: PathBuf,
    // Held so the directory lives as long as the session.
    _temp: Option<TempDir>,
}

impl Handoff {
    /// Use a new temporary directory, deleted when the `Handoff` is dropped.
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("sharkara-")
            .tempdir()
            .context("create hand-off directory")?;
        debug!(dir = %temp.path().display(), "using temporary hand-off directory");
        Ok(Self {
            dir: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// Use a caller-chosen directory, created if missing. Files are left in place.
    pub fn in_dir(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create hand-off directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            _temp: None,
        })
    }

    pub fn from_dir_option(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::in_dir(dir),
            None => Self::temporary(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: Stage) -> PathBuf {
        match stage {
            Stage::Lexer => self.dir.join(SOURCE_FILE),
            Stage::Parser => self.dir.join(TOKENS_FILE),
        }
    }
}
