use std::fmt;

use thiserror::Error;

use crate::registry_error::ErrorEntry;
use crate::transport::Response;

/// Malformed digest, reference or range text. Raised before anything reaches
/// the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid hash algorithm: {0}")]
    Algorithm(String),
    #[error("invalid digest: {0}")]
    Digest(String),
    #[error("invalid reference: {0}")]
    Reference(String),
    #[error("invalid range: {0}")]
    Range(String),
    #[error("invalid domain: {0}")]
    Domain(String),
    #[error("invalid argument: {0}")]
    Argument(String),
}

/// The registry answered in a way the protocol does not allow: a server
/// error, a missing header the endpoint requires, or an unexpected status.
/// The raw response is kept so callers can inspect it.
#[derive(Debug)]
pub struct ResError {
    response: Box<Response>,
    message: String,
}

impl ResError {
    pub fn new(response: Response, message: impl Into<String>) -> Self {
        Self {
            response: Box::new(response),
            message: message.into(),
        }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ResError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.message, self.response.status(), self.response.url())
    }
}

impl std::error::Error for ResError {}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Response(#[from] ResError),

    /// 4xx answer carrying the registry's structured error body.
    #[error("registry returned {status}: {}", summarize(.errors))]
    Registry {
        status: reqwest::StatusCode,
        errors: Vec<ErrorEntry>,
    },

    #[error("upload session is closed")]
    SessionClosed,

    #[error("Http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Url error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Status code of the response behind this error, if there was one.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Error::Response(err) => Some(err.response().status()),
            Error::Registry { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Structured registry errors, empty for anything but [`Error::Registry`].
    pub fn errors(&self) -> &[ErrorEntry] {
        match self {
            Error::Registry { errors, .. } => errors,
            _ => &[],
        }
    }

    /// The registry rejected an upload chunk because its range did not start
    /// at the offset the registry expected.
    pub fn is_range_mismatch(&self) -> bool {
        self.status() == Some(reqwest::StatusCode::RANGE_NOT_SATISFIABLE)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

fn summarize(errors: &[ErrorEntry]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
