//! Stable exit codes for terminal CLI commands.

/// Session ended normally (exit keyword or end of input), or `run` succeeded.
pub const OK: i32 = 0;
/// Invalid configuration or arguments, or any other unclassified error.
pub const INVALID: i32 = 1;
/// A hand-off file or the input stream could not be written or read.
pub const IO_FAILURE: i32 = 2;
/// A stage executable could not be started or did not finish in time.
pub const LAUNCH_FAILURE: i32 = 3;
/// `terminal run` with `nonzero_exit = "fail"` and a stage exited non-zero.
pub const STAGE_EXIT: i32 = 4;

/// Pick the exit code for an error that ended a command.
///
/// Stage failures map by kind; other I/O errors anywhere in the chain map to
/// [`IO_FAILURE`]; everything else is [`INVALID`].
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(stage_err) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<crate::stage::StageError>())
    {
        return stage_err.exit_code();
    }
    if err
        .chain()
        .any(|cause| cause.downcast_ref::<std::io::Error>().is_some())
    {
        return IO_FAILURE;
    }
    INVALID
}
