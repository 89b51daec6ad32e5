//! Error types for the VoteGuard engine.
//!
//! Policy denials are not errors: they are reported through
//! [`VoteDecision`](crate::types::VoteDecision). Errors here cover lookups that
//! found nothing, terminal reports, and bad input or configuration.

use crate::types::ReportStatus;
use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    /// No report with the given id exists.
    #[error("report {0} not found")]
    ReportNotFound(String),

    /// The report already left the pending state.
    #[error("report {id} already reviewed (status: {status})")]
    ReportAlreadyReviewed {
        /// Report id
        id: String,
        /// Terminal status the report is in
        status: ReportStatus,
    },

    /// An argument could not be interpreted (e.g. unknown enum name).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GuardError {
    /// True for the "absent or already terminal" family of review failures.
    pub fn is_not_reviewable(&self) -> bool {
        matches!(
            self,
            GuardError::ReportNotFound(_) | GuardError::ReportAlreadyReviewed { .. }
        )
    }
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, GuardError>;
