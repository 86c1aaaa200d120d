//! Error types shared by the export, warm and rename commands.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown book code '{0}'")]
    UnknownBook(String),

    #[error("No valid books specified")]
    NoBooks,

    #[error("Unsupported page size '{0}'. Choose from A4, LETTER")]
    InvalidPageSize(String),

    #[error("Catalog entry not found for {owner}/{repo}@{reference}")]
    CatalogNotFound {
        owner: String,
        repo: String,
        reference: String,
    },

    #[error("Failed to fetch catalog entry: {0}")]
    CatalogUnavailable(String),

    #[error("Print preview never became ready (gave up at stage {stage})")]
    RenderTimeout { stage: String },

    #[error("Timed out after {0:?} waiting for navigation")]
    NavigationTimeout(Duration),

    #[error("Timed out after {0:?} waiting for download")]
    DownloadTimeout(Duration),

    #[error("Timed out after {timeout:?} waiting for cache-html POST matching {pattern}")]
    CacheTimeout { timeout: Duration, pattern: String },

    #[error("Target already exists: {}", .0.display())]
    RenameCollision(PathBuf),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Browser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
