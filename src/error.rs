//! Error types for phono
//!
//! Defines the crate-wide error type using thiserror for clear error
//! propagation between the resolver, source/sink, and playback layers.

use thiserror::Error;

/// Main error type for the phono crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A resolver accepted a request but failed to produce tracks
    #[error("Resolve error: {0}")]
    Resolve(String),

    /// No resolver in the routing chain accepted the request
    #[error("No resolver for input: {0}")]
    NoResolver(String),

    /// A track kind with no registered audio source and no fallback
    #[error("Unsupported track kind: {0}")]
    UnsupportedKind(String),

    /// Transcoder/source stream errors (retriable inside a session)
    #[error("Audio source error: {0}")]
    Source(String),

    /// Sink write/flush errors (fatal for the session)
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Child process spawn or termination errors
    #[error("Subprocess error: {0}")]
    Process(String),

    /// Command channel errors (the player loop is gone)
    #[error("Player channel error: {0}")]
    Channel(String),

    /// Aggregated shutdown failures from routed components
    #[error("Shutdown failures: {}", .0.join("; "))]
    Shutdown(Vec<String>),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unhandled fault from the player loop body, e.g. a panicking hook.
    /// Terminates the loop and surfaces through `on_loop_faulted`.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Cancellation sentinel. Never surfaced as a failure: the session
    /// maps it to `PlaybackEndReason::Cancelled` and disposal absorbs it.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for the cancellation sentinel
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Convenience Result type using the phono Error
pub type Result<T> = std::result::Result<T, Error>;
