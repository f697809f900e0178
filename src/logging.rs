//! Logging set-up.
//!
//! Diagnostics go to stderr so nothing interferes with tool output. The
//! level follows `-quiet`/`-info`/`-debug` unless `RUST_LOG` is set.
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Info,
    Debug,
}

impl Verbosity {
    fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Info => "debug",
            Verbosity::Debug => "debug,dwi2response=trace",
        }
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
