use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Overrides the computed filter, e.g. `TERMHIVE_LOG=termhive_daemon=debug`.
pub const LOG_ENV_VAR: &str = "TERMHIVE_LOG";

/// Default filter for the termhive crates.
///
/// Quiet keeps errors only; otherwise info and above.
pub fn default_directive(quiet: bool) -> &'static str {
    if quiet { "termhive=error" } else { "termhive=info" }
}

/// Install the JSON subscriber on stderr.
///
/// Every event is one JSON line carrying an `event` field named
/// `{layer}.{domain}.{action}_{state}`. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(quiet: bool) {
    let filter = match std::env::var(LOG_ENV_VAR) {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::new(spec),
        _ => EnvFilter::from_default_env().add_directive(
            default_directive(quiet)
                .parse()
                .expect("Invalid log directive"),
        ),
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        for quiet in [true, false] {
            let directive: Result<tracing_subscriber::filter::Directive, _> =
                default_directive(quiet).parse();
            assert!(directive.is_ok());
        }
        assert!(default_directive(true).ends_with("error"));
        assert!(default_directive(false).ends_with("info"));
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(true);
        init_logging(false);
    }
}
