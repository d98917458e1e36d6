//! Log sinks for hosts that do not install a `tracing` subscriber of their own.
//!
//! Both functions leave an already installed global subscriber alone.

use std::path::Path;

use tracing::Level;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "imstack.log";

/// `RUST_LOG` wins when set; otherwise everything at `level` and above.
fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Write to `dir/imstack.log`, usually the directory the overlay DLL was
/// loaded from. Returns whether this call installed the subscriber.
pub fn init(dir: impl AsRef<Path>, level: Level) -> bool {
    let file_appender = tracing_appender::rolling::never(dir.as_ref(), LOG_FILE_NAME);
    tracing_subscriber::fmt()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_env_filter(filter(level))
        .try_init()
        .is_ok()
}

/// Development sink on stderr.
pub fn init_stderr(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_env_filter(filter(level))
        .try_init()
        .is_ok()
}
