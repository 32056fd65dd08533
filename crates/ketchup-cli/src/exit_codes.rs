//! Standard exit codes for CLI operations
//!
//! Partial collections still exit with [`SUCCESS`]; the summary records what
//! was missed.

/// Success - the run completed, possibly with recorded failures
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - invalid config file, signature table or option value
pub const CONFIG_ERROR: i32 = 2;

/// Session error - kubeconfig unreadable or API server unreachable
pub const SESSION_ERROR: i32 = 3;

/// Archive error - the archive could not be created or read
pub const ARCHIVE_ERROR: i32 = 4;

/// Output error - the run directory or summary could not be written
pub const OUTPUT_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
