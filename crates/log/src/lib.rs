#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # regula-log
//!
//! Installs a `tracing` subscriber for hosts and tests of the Regula
//! engine.
//!
//! ```rust,ignore
//! let _guard = regula_log::init()?;
//! tracing::info!("ready");
//! ```

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard, ReloadHandle};
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

/// Install a subscriber configured from the environment.
///
/// Reads `REGULA_LOG` (falling back to `RUST_LOG`) for the filter and
/// `REGULA_LOG_FORMAT` for the format.
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::from_env())
}

/// Install a subscriber for `config`.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Install a subscriber for `config` unless one is already installed.
///
/// Returns `None` when a subscriber was already set, so it is safe to call
/// from every test.
pub fn try_init(config: Config) -> Option<LoggerGuard> {
    match init_with(config) {
        Ok(guard) => Some(guard),
        Err(LogError::AlreadyInitialized(_)) => None,
        Err(error) => {
            eprintln!("regula-log: {error}");
            None
        }
    }
}

/// [`try_init`] with [`Config::test`].
pub fn init_test() -> Option<LoggerGuard> {
    try_init(Config::test())
}
