use anyhow::{Result, anyhow};
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoLocal;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Installs the global fmt subscriber.
///
/// Fails instead of panicking when a subscriber is already set, so the
/// caller can treat it as a startup error.
pub fn init(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("logger creating error: {e}"))
}
