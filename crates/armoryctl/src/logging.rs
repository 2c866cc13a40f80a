//! Logging for armoryctl
//!
//! Logs go to stderr so stdout stays clean for `--json`. Level precedence:
//! `-v` flags, then $RUST_LOG, then `log.level` from the config file.

use tracing_subscriber::EnvFilter;

pub fn filter_for(verbose: u8, configured: &str) -> EnvFilter {
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbose: u8, configured: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbose, configured))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
