//! Crate-wide error type.
//!
//! Errors are never retried or swallowed inside the pipeline; every stage
//! propagates them to the caller, which turns them into a user-facing message
//! and a non-zero completion status.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Network or connection failure, surfaced verbatim from the HTTP stack.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Error payload embedded in the catalog's own JSON response.
    #[error("catalog error: {message}{}", fmt_details(.details))]
    Remote { message: String, details: Vec<String> },

    /// Malformed caller input (bad coordinates, missing identifiers, ...).
    #[error("invalid input: {0}")]
    Validation(String),

    /// A field or header a join/export step strictly needs is absent.
    #[error("unexpected data shape: {0}")]
    DataShape(String),

    #[error("workbook write error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("workbook read error: {0}")]
    WorkbookRead(#[from] calamine::XlsxError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

fn fmt_details(details: &[String]) -> String {
    if details.is_empty() {
        String::new()
    } else {
        format!(" ({})", details.join("; "))
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn data_shape(msg: impl Into<String>) -> Self {
        Error::DataShape(msg.into())
    }
}
