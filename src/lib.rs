pub mod adapters; // Sources and sinks: local RAW folders, Lightroom, Drive
pub mod config;
pub mod models;
pub mod pipeline;
pub mod report; // Manifest stats, filters and CSV exports
pub mod vocabulary;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over both defaults.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        config::verbose_log_filter()
    } else {
        config::default_log_filter()
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}
