//! Error handling for the SuperADS session layer
//!
//! This module defines the error type shared by the connection manager,
//! the action dispatcher and the symbol override store, plus a Result alias.

use thiserror::Error;

/// Main error type for SuperADS operations
#[derive(Error, Debug)]
pub enum AdsError {
    /// A connect attempt is already in flight
    #[error("A connection attempt is already in progress")]
    Busy,

    /// A session is already connected
    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    /// The connect attempt failed and the partial handle was torn down
    #[error("Connection failed: {reason}")]
    ConnectFailed { reason: String },

    /// The device reported a run-state other than RUN
    #[error("Device is not running (state {state}, code {code})")]
    InvalidDeviceState { code: u16, state: String },

    /// Reading a named boolean failed
    #[error("Failed to read '{symbol}': {cause}")]
    ReadFailed { symbol: String, cause: String },

    /// Writing a named boolean failed
    #[error("Failed to write '{symbol}': {cause}")]
    WriteFailed { symbol: String, cause: String },

    /// No device is connected
    #[error("No active session")]
    NoActiveSession,

    /// Errors raised by the wire-level device client
    #[error("Transport error: {0}")]
    Transport(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AdsError>,
    },
}

impl AdsError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AdsError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap any error as the reason of a failed connect attempt
    pub fn connect_failed(reason: impl std::fmt::Display) -> Self {
        AdsError::ConnectFailed {
            reason: reason.to_string(),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &AdsError {
        match self {
            AdsError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for AdsError {
    fn from(err: serde_json::Error) -> Self {
        AdsError::Serialization(err.to_string())
    }
}

/// Result type alias for SuperADS operations
pub type Result<T> = std::result::Result<T, AdsError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
