use chrono::{DateTime, Utc};
use thiserror::Error;

use warehouse_inventory::NewNotice;

/// Output of one analysis job: the notices to persist as a single batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub window_start: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    /// Number of operation records that fell inside the window.
    pub operations_considered: usize,
    /// Number of distinct (product, storage) pairs observed.
    pub pairs_considered: usize,
    pub notices: Vec<NewNotice>,
}

impl AnalysisReport {
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}
