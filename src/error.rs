use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no accounts configured (set ACCOUNTS or add an `accounts` array to {0})")]
    NoAccounts(PathBuf),
    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

/// Failure while fetching one account from a post source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("unexpected page structure: {0}")]
    PageStructure(String),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("authentication challenge: {0}")]
    AuthChallenge(String),
}

impl FetchError {
    /// Challenges need a human; everything else is contained per account.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::AuthChallenge(_))
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("post record is not an object (got {0})")]
    NotAnObject(&'static str),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML write error: {0}")]
    Xml(String),
    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{account}: {message}. Verify the session in a browser, then refresh INSTAGRAM_SESSION_ID")]
    AuthChallenge { account: String, message: String },
    #[error("failed to prepare feeds directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
