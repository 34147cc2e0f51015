use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the global fmt subscriber on stderr
///
/// `RUST_LOG` takes precedence over `default_filter`. Calls after the first
/// successful one do nothing.
pub fn init(default_filter: &str) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| Error::custom(format!("invalid log filter {default_filter:?}: {e}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::custom(format!("failed to install log subscriber: {e}")))?;

    let _ = INSTALLED.set(());
    Ok(())
}
