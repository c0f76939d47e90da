use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{what} unavailable after {attempts} attempts: {reason}")]
    SourceUnavailable {
        what: String,
        attempts: u32,
        reason: String,
    },

    #[error("Failed to write artifact {path}: {reason}")]
    ArtifactWrite { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PulseError {
    /// Errors a retry can plausibly clear. Everything else fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PulseError::Database(_) | PulseError::Io(_) | PulseError::Other(_)
        )
    }
}

pub type PulseResult<T> = Result<T, PulseError>;
