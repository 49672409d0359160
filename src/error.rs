//! Error types for the scrape pipeline.

use thiserror::Error;

use crate::repository::RepositoryError;

/// Errors surfaced by the browser session and page walker.
///
/// Store errors are fatal to a run; navigation and extraction errors are
/// document-scoped and handled by catch-and-continue in the walker.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("browser error: {0}")]
    Browser(String),

    #[error("navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error(transparent)]
    Store(#[from] RepositoryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// Whether this error aborts the run rather than a single document.
    ///
    /// Failing to launch the browser at all is fatal; failing to navigate to
    /// one page is not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Io(_) | Self::Browser(_))
    }
}
