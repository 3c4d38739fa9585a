//! Tracing setup.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log filter used when `RUST_LOG` is not set.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "info,hdfs_mesos_scheduler=debug"
    } else {
        "info"
    }
}

/// Install the global JSON subscriber. `RUST_LOG` wins over `debug`.
pub fn init_tracing(debug: bool) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(debug))),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
}
