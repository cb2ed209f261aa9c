//! Error types

use std::path::PathBuf;

/// Settings loading/validation errors (fatal at startup)
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Errors from the feed and watch-list endpoints
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Transport {
        url: String,
        message: String,
        retryable: bool,
    },

    #[error("{url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { retryable, .. } => *retryable,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode { .. } => false,
        }
    }
}

/// Per-file reconciliation errors; never escape the file's iteration
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Config file does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed JSON in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unexpected config shape: {0}")]
    Shape(String),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A failed external command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("command exited with {}: {message}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
pub struct CommandFailure {
    pub code: Option<i32>,
    pub message: String,
}

impl CommandFailure {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let server = FetchError::Status {
            url: "http://x".to_string(),
            status: 503,
            body: String::new(),
        };
        let client = FetchError::Status {
            url: "http://x".to_string(),
            status: 404,
            body: String::new(),
        };
        let decode = FetchError::Decode {
            url: "http://x".to_string(),
            message: "eof".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!decode.is_retryable());
    }

    #[test]
    fn test_command_failure_display() {
        let failure = CommandFailure::new(Some(1), "no server running");
        assert_eq!(
            failure.to_string(),
            "command exited with 1: no server running"
        );
        assert!(CommandFailure::new(None, "killed")
            .to_string()
            .contains("signal"));
    }
}
