use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Archive not found in object storage: {key}")]
    ArchiveNotFound { key: String },

    #[error("Failed to read archive {key}: {message}")]
    ArchiveRead { key: String, message: String },

    #[error("Archive {key} is corrupt: {message}")]
    ArchiveCorrupt { key: String, message: String },

    #[error("No output-*.xml report files found in archive {key}")]
    NoReportFiles { key: String },

    #[error("Malformed report {file}: {reason}")]
    MalformedReport { file: String, reason: String },

    #[error("Failed to persist {key}: {message}")]
    Persist { key: String, message: String },

    #[error("Invalid store '{spec}': {reason}")]
    InvalidStore { spec: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to report job status: {0}")]
    Reporter(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// Per-date errors that leave the dashboard with a gap rather than bad data.
    pub fn is_persist(&self) -> bool {
        matches!(self, Self::Persist { .. })
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
