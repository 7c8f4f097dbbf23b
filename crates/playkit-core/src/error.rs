//! Error types for playkit core

use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Embed errors
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container already hosts a player: {0}")]
    ContainerInUse(String),

    // Source errors
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Failed to load media from {url}: {reason}")]
    Load { url: String, reason: String },

    #[error("Playback operation '{operation}' failed: {reason}")]
    PlaybackOperation { operation: String, reason: String },

    /// Error raised by a third-party backend, wrapped with context
    #[error("{engine} error ({context}): {details}")]
    Engine {
        engine: String,
        context: String,
        details: String,
    },

    // Ad errors
    #[error("Ad playback failed: {0}")]
    Ad(String),

    #[error("Another ad break is already playing")]
    AdBusy,

    // Analytics errors
    #[error("Analytics send failed: {0}")]
    AnalyticsSend(String),

    // Configuration errors
    #[error("Invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    // State errors
    #[error("Invalid player state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Component has been destroyed")]
    Destroyed,

    // Internal errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a load error for a URL
    pub fn load(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Load {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a playback operation error
    pub fn playback(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::PlaybackOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error reported by a streaming engine or platform element
    pub fn engine(
        engine: impl Into<String>,
        context: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Error::Engine {
            engine: engine.into(),
            context: context.into(),
            details: details.into(),
        }
    }

    /// Returns true if this error ends the playback session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ContainerNotFound(_)
                | Error::ContainerInUse(_)
                | Error::UnsupportedMediaType(_)
                | Error::Load { .. }
                | Error::Validation(_)
        )
    }

    /// Returns the error code for analytics and `player:error` events
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ContainerNotFound(_) => "CONTAINER_NOT_FOUND",
            Error::ContainerInUse(_) => "CONTAINER_IN_USE",
            Error::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            Error::Load { .. } => "LOAD",
            Error::PlaybackOperation { .. } => "PLAYBACK_OPERATION",
            Error::Engine { .. } => "ENGINE",
            Error::Ad(_) => "AD",
            Error::AdBusy => "AD_BUSY",
            Error::AnalyticsSend(_) => "ANALYTICS_SEND",
            Error::Validation(_) => "VALIDATION",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::Destroyed => "DESTROYED",
            Error::Json(_) => "JSON",
            Error::Network(_) => "NETWORK",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_every_violation() {
        let err = Error::Validation(vec!["videoUrl is required".into(), "volume out of range".into()]);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: videoUrl is required; volume out of range"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_playback_errors_are_not_fatal() {
        let err = Error::playback("play", "autoplay blocked");
        assert!(!err.is_fatal());
        assert_eq!(err.error_code(), "PLAYBACK_OPERATION");
    }
}
