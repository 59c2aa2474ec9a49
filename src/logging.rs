//! Logging setup for the CLI.
//!
//! Test progress (`Success for …`, comparator diagnostics) goes through
//! `tracing` to stderr, leaving stdout for reports.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default directives when `RUST_LOG` is unset.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "chain_smoker=debug,warn"
    } else {
        "chain_smoker=info,warn"
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default level.
///
/// Calling it twice is harmless; the second call does nothing.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_crate_level() {
        assert_eq!(default_directives(false), "chain_smoker=info,warn");
        assert_eq!(default_directives(true), "chain_smoker=debug,warn");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
