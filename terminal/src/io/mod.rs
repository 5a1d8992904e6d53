//! I/O helpers for the terminal.

pub mod config;
pub mod handoff;
pub mod process;
