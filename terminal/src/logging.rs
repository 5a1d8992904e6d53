//! Diagnostic tracing for the terminal.
//!
//! Session output (prompt, stage results, failures) goes to stdout and is not
//! affected by `RUST_LOG`. Tracing is for diagnosing the stage runner and goes
//! to stderr only.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Level used when `RUST_LOG` is unset or names nothing usable.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

/// Install a compact stderr subscriber filtered by `RUST_LOG`.
///
/// `RUST_LOG=terminal=debug terminal session` shows each stage spawn and its exit.
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// Invalid directives are skipped rather than failing startup.
fn build_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(DEFAULT_LEVEL.into())
        .parse_lossy(directives.unwrap_or_default())
}
