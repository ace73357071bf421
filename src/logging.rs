// Tracing subscriber setup for the CLI
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "figure_harvest=info";

/// Installs the global subscriber. Logs go to stderr; `RUST_LOG` overrides the default filter.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // Ignore a second install (tests may call this more than once)
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
