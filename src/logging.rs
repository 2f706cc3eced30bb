//! Log subscriber installation.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{ModelError, Result};

/// Installs a global `tracing` fmt subscriber filtered by `level`.
///
/// `level` is an `EnvFilter` directive such as `info` or
/// `devtree=debug,warn`. Output goes to stderr so command output on stdout
/// stays machine-readable.
///
/// # Errors
/// * `ModelError::InvalidArgument` - bad directive, or a global subscriber
///   is already installed
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| ModelError::InvalidArgument(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| ModelError::InvalidArgument("logging already initialized".into()))
}
