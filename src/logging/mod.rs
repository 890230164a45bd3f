//! provides logging helpers

use anyhow::{Context, Result};
use crossterm::tty::IsTty;
use tracing_subscriber::{
    filter::{Directive, EnvFilter, FilterExt, LevelFilter},
    fmt::{layer, time::LocalTime},
    prelude::*,
    registry,
};

pub use tracing::{debug, error, error_span, info, info_span, trace, warn, warn_span, Span};

/// extra filter, OR-ed with `RUST_LOG`
pub const MANAGER_LOG_ENV: &str = "DAMOCLES_MANAGER_LOG";

/// dependencies that only get to speak at WARN under `RUST_LOG`
const NOISY_TARGETS: &[&str] = &["want", "hyper", "mio", "reqwest", "jsonrpc_core", "rocksdb"];

fn quiet(target: &str) -> Result<Directive> {
    format!("{}=warn", target)
        .parse()
        .with_context(|| format!("build directive for {}", target))
}

fn rust_log_filter() -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()
        .context("invalid env filter")?;

    for target in NOISY_TARGETS {
        filter = filter.add_directive(quiet(target)?);
    }

    Ok(filter)
}

/// initiate the global tracing subscriber, writing to stderr
pub fn init() -> Result<()> {
    let manager_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::OFF.into())
        .with_env_var(MANAGER_LOG_ENV)
        .from_env()
        .context("invalid damocles manager log filter")?;

    let stderr_tty = std::io::stderr().is_tty();
    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_ansi(stderr_tty)
        .with_target(true)
        .with_thread_ids(true)
        .with_timer(LocalTime::rfc_3339())
        .with_filter(rust_log_filter()?.or(manager_filter));

    registry()
        .with(fmt_layer)
        .try_init()
        .context("set global subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_directives() {
        for target in NOISY_TARGETS {
            let directive = quiet(target).unwrap();
            assert!(directive.to_string().starts_with(target));
        }
    }
}
