use std::path::PathBuf;
use std::time::Duration;

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Browser failed to {action} {target}: {message}")]
    Browser {
        action: &'static str,
        target: String,
        message: String,
    },

    #[error("No stream url observed for {page_url} within {waited:?}")]
    StreamTimeout { page_url: String, waited: Duration },

    #[error("Network listener closed before {page_url} got a stream url")]
    StreamClosed { page_url: String },

    #[error("Pairing task stopped: {0}")]
    Pairing(String),

    #[error("Failed to download {title}: {reason}")]
    Download { title: String, reason: String },

    #[error("Download task failed: {0}")]
    Task(String),

    #[error("No stream records")]
    NoRecords,

    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse record list {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to bind status server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stream pattern: {0}")]
    StreamPattern(#[from] regex::Error),
}

impl ScrapeError {
    #[must_use]
    pub fn browser(
        action: &'static str,
        target: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        ScrapeError::Browser {
            action,
            target: target.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScrapeError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
