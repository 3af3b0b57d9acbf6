//! Stable exit codes for autopr CLI commands.

/// Command succeeded; for `run`, the pull request was created.
pub const OK: i32 = 0;
/// Invalid request, config or arguments, or a listing command failed.
pub const INVALID: i32 = 1;
/// `autopr run` aborted at a pipeline stage.
pub const ABORTED: i32 = 2;
