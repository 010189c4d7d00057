//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and shutdown.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: citadel_core::ConfigError,
    },

    /// Connecting to or migrating the database failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: citadel_db::StoreError,
    },

    /// Warming the claim index failed.
    #[error("claim service error: {source}")]
    Service {
        /// The underlying service error.
        #[from]
        source: citadel_core::ServiceError,
    },

    /// The HTTP bridge failed to start.
    #[error("bridge error: {source}")]
    Bridge {
        /// The underlying startup error.
        #[from]
        source: citadel_api::StartupError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the signal failure.
        message: String,
    },
}
