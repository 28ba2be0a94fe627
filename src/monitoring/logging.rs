//! Tracing subscriber setup.

use crate::core::config::LoggingConfig;
use crate::core::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Returns an error
/// if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::Config(format!("invalid log filter '{}': {}", config.filter, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::Internal(format!("tracing already initialised: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_cleanly() {
        let config = LoggingConfig {
            filter: "rasoom=debug".to_string(),
            json: false,
        };
        // The first call may race with other tests; the second one must fail.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
