use thiserror::Error;

/// Why the output gave up on a track.  The engine reacts to every variant
/// the same way; the text is only for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("playback aborted: {0}")]
    Aborted(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl PlaybackError {
    /// Best-effort classification of a free-form error string from an output
    /// backend.
    pub fn classify(reason: &str) -> Self {
        let lower = reason.to_ascii_lowercase();
        let reason = reason.to_string();
        if lower.contains("abort") {
            Self::Aborted(reason)
        } else if lower.contains("format") || lower.contains("unsupported") {
            Self::UnsupportedFormat(reason)
        } else if ["network", "http", "connect", "timeout", "timed out", "resolve"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            Self::Network(reason)
        } else {
            Self::Decode(reason)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("track {index} is outside a playlist of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}
