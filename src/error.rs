use thiserror::Error;

use crate::browser::BrowserError;
use crate::model::{ExtractionStats, ProductRecord};

/// A page did not load within the navigation budget.
#[derive(Debug, Error)]
#[error("navigation to {url} failed after {attempts} attempt(s): {reason}")]
pub struct NavigationError {
    pub url: String,
    pub attempts: u32,
    pub reason: String,
}

/// A single catalog entry could not be turned into a record. Recovered
/// locally by the orchestrator; never propagated past the entry loop.
#[derive(Debug, Error)]
pub enum ExtractionEntryError {
    #[error("entry unreadable: {0}")]
    Unreadable(#[from] BrowserError),

    #[error("entry has no text")]
    Blank,
}

/// What killed a run.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("browser session failed: {0}")]
    Browser(#[from] BrowserError),

    #[error("run cancelled")]
    Cancelled,
}

/// Run-level failure. Raised only after the browser session has been
/// released and the stats finalized; carries whatever was collected.
#[derive(Debug, Error)]
#[error("extraction failed after {} categories: {cause}", .stats.categories_processed)]
pub struct ExtractionError {
    #[source]
    pub cause: RunFailure,
    pub stats: ExtractionStats,
    pub partial: Vec<ProductRecord>,
}

impl ExtractionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, RunFailure::Cancelled)
    }
}
