//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while the CLI
//! uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors ([`TempoError`], [`ProviderError`], [`CacheError`])
//!   for detailed handling
//! - All errors implement `std::error::Error` for compatibility

use std::path::PathBuf;

use crate::cache::CacheError;
use crate::spotify::ProviderError;
use crate::tempo::TempoError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Console I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tap estimation failed
    #[error("Tempo error: {0}")]
    Tempo(#[from] TempoError),

    /// Spotify request or login failed
    #[error("Spotify error: {0}")]
    Provider(#[from] ProviderError),

    /// Tempo cache could not be written
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The user stopped the run with Ctrl-C
    #[error("Interrupted")]
    Interrupted,

    /// The reorder removed tracks it could not put back
    #[error("{missing} tracks were taken out of the playlist and could not be put back: {source}")]
    PartialCommit {
        missing: usize,
        /// File listing the missing tracks, if it could be written
        saved_to: Option<PathBuf>,
        source: ProviderError,
    },

    /// The run failed and the tempo cache could not be written either
    #[error("{source}; the tempo cache could not be saved either: {cache}")]
    Unsaved { source: Box<Error>, cache: CacheError },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// The error underneath any context or unsaved-cache wrapping.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } | Self::Unsaved { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, ProviderError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Provider(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, TempoError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Tempo(e).context(ctx))
    }
}
