//! Core error types for the sync service.
//!
//! Store implementations convert their own failures into [`StoreError`];
//! configuration problems surface as [`ConfigError`].

use thiserror::Error;

use marketsync_market_data::MarketDataError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the sync service.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown job: {0}")]
    UnknownJob(String),
}

/// Backend-agnostic error type for document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Documents must be JSON objects.
    #[error("Document for {collection}/{key} is not a JSON object")]
    NotAnObject { collection: String, key: String },

    /// The backend rejected or failed the operation.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}
