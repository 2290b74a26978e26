pub mod logger;

pub use logger::{QueryLog, QueryLogger};

/// Installs the global tracing subscriber. `RUST_LOG` picks the filter
/// (default `info`); `json` switches to one JSON object per event.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
