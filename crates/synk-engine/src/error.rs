//! Error types for the synk engine binary.
//!
//! [`EngineError`] wraps every failure mode of a run so the trial loop can
//! propagate with `?`.

/// Top-level error for the synk engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: synk_core::config::ConfigError,
    },

    /// The `simulation` section of the config file is malformed.
    #[error("simulation settings error: {message}")]
    Settings {
        /// Description of the failure.
        message: String,
    },

    /// Component registration failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: synk_core::RegistryError,
    },

    /// The episode counter failed.
    #[error("episode counter error: {source}")]
    Counter {
        /// The underlying counter error.
        #[from]
        source: synk_core::CounterError,
    },

    /// A module step or one of its hooks failed.
    #[error("step error: {source}")]
    Step {
        /// The underlying hook chain error.
        #[from]
        source: synk_core::HookError,
    },

    /// Journaled state could not be written.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying store error.
        #[from]
        source: synk_core::StoreError,
    },
}
