//! Logging setup for the reconciler binary.
//!
//! Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
//! Initialization is guarded by `OnceLock` so tests can call it repeatedly.
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static OBS_INIT: OnceLock<()> = OnceLock::new();

pub fn init_observability() {
    OBS_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
    });
}
