use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr, filtered by `SCRIBE_LOG` (default `warn`) so the
/// recorded terminal stays clean.
pub fn init() {
    let filter = EnvFilter::try_from_env("SCRIBE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
