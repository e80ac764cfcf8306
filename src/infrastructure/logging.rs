use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global fmt subscriber; `STRIDE_LOG` overrides the level.
/// Safe to call more than once (later calls are no-ops).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("STRIDE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
