//! Configuration constants for CLI subprocesses

use std::time::Duration;

/// Default maximum length of one output line (1MB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Size of a single pipe read
pub(crate) const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long the exit supervisor waits for the output pumps to drain
pub(crate) const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long stdout may stay closed before the process is presumed wedged
pub(crate) const STREAM_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Dangerous environment variables that should not be passed to subprocess
///
/// These variables can affect how the subprocess loads and executes code,
/// potentially creating security vulnerabilities.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

/// Allowed extra CLI flags (allowlist approach)
///
/// Only these flags can be passed through the `extra_args` option.
pub const ALLOWED_EXTRA_FLAGS: &[&str] = &["max-turns", "fallback-model", "settings", "log-level"];
