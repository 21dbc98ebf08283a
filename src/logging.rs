//! Tracing subscriber setup for the `chx` binary.
//!
//! Logs go to stderr so command output on stdout stays clean.
//!
//! Filter priority, highest first:
//! 1. `CHX_LOG` (e.g. `comms_harness=debug,warn`)
//! 2. `RUST_LOG`
//! 3. `--verbose` → `debug` for this crate, otherwise `warn`

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(verbose: bool) {
    let filter = build_env_filter(verbose);

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_level(true);

    let result = if verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_timer(fmt::time::uptime()))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.without_time().compact())
            .try_init()
    };
    // Already installed (tests, embedding the library).
    let _ = result;
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    if let Ok(directives) = std::env::var("CHX_LOG") {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(default_directives(verbose))
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,comms_harness=debug"
    } else {
        "warn"
    }
}
