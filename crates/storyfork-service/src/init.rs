//! Process start-up
//!
//! Call [`init`] once from `main` before constructing services. Later calls
//! are no-ops, so libraries and tests may call it defensively.

use once_cell::sync::OnceCell;
use storyfork_core::{ConfigError, ForkConfig, LogFormat};
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Validate configuration and install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.log_filter`. If the host process
/// already installed a subscriber it is left in place.
///
/// Returns `true` only for the call that performed initialization.
///
/// # Errors
/// `ConfigError::InvalidValue` if `config` fails validation; nothing is
/// initialized in that case.
pub fn init(config: &ForkConfig) -> Result<bool, ConfigError> {
    config.validate()?;

    let mut ran = false;
    INIT.get_or_init(|| {
        install_subscriber(config);
        ran = true;
    });
    Ok(ran)
}

fn install_subscriber(config: &ForkConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
    };

    match installed {
        Ok(()) => tracing::debug!(max_branches = config.max_branches, "storyfork initialized"),
        Err(_) => tracing::debug!("global subscriber already set, keeping it"),
    }
}
