//! Stable exit codes for campaign CLI commands.

/// Command succeeded; for `campaign run`, a report was approved.
pub const OK: i32 = 0;
/// Invalid config, transport or decision failure, or any other fatal error.
pub const FATAL: i32 = 1;
/// `campaign run` hit a revision cap before a report was approved.
pub const ESCALATED: i32 = 2;
