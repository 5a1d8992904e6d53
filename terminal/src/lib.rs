//! Interactive terminal for an out-of-process lexer/parser pipeline.
//!
//! Each line typed at the prompt is written to a hand-off file, the lexer
//! executable is run against that file, its stdout is written to a second
//! hand-off file, and the parser executable is run against that. Both outputs
//! are shown before the next prompt.
//!
//! - **[`session`]**: the read/display loop and termination handling.
//! - **[`stage`]**: one pipeline stage (write payload, spawn tool, capture stdout).
//! - **[`io`]**: side-effecting helpers (child processes, hand-off files, config).
//!
//! [`pipeline`] runs both stages once without a prompt, for scripted use.

pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod stage;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
