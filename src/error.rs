//! Error types for the parlance speech client

use thiserror::Error;

/// Result type alias for parlance operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the parlance speech client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// WAVE container does not start with the RIFF/WAVE form tags, or is
    /// otherwise structurally unusable
    #[error("malformed wave container: {0}")]
    MalformedContainer(String),

    /// A data chunk appeared before any format chunk
    #[error("data chunk precedes format chunk")]
    MissingFormatChunk,

    /// Format chunk declares a bit depth outside {8, 16, 32}
    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    /// Network/HTTP failure surfaced from the transport collaborator
    #[error("transport error{}: {message}", .status.map_or_else(String::new, |s| format!(" (status {s})")))]
    Transport {
        /// HTTP status code, when a response was received
        status: Option<u16>,
        /// Underlying cause or response body excerpt
        message: String,
    },

    /// Token refresh failed or returned an empty credential
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
