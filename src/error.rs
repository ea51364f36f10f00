//! Error taxonomy for the acquisition pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while acquiring, parsing, or validating price data.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (request, connection, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// A parser could not make sense of a page it expected to understand.
    #[error("parser {parser}: {message}")]
    Parser { parser: String, message: String },

    /// Acquired data failed validation hard enough to be unusable.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// An operation exceeded its deadline.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// Browser session could not be established or driven.
    #[error("browser error: {0}")]
    Browser(String),
}

impl Error {
    pub fn parser(parser: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parser {
            parser: parser.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                operation: "http request".to_string(),
                seconds: 0,
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Config(e.to_string())
    }
}
