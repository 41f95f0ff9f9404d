//! Tracing subscriber setup.
//!
//! Log verbosity follows `RUST_LOG` (for example `RUST_LOG=zoe=debug,tower_http=debug`) and
//! defaults to `info`. Output goes to stdout through the `fmt` layer.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    tracing::debug!("Telemetry initialized");
    Ok(())
}
