//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{LayoutError, ProgressError, SubmissionError, TestId, TierError};
use storage::repository::StorageError;
use storage::sample::SampleError;
use storage::sqlite::SqliteInitError;

/// A test whose catalog rows cannot be taken or scored.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Tiers(#[from] TierError),
}

/// Errors emitted by `TestFlowService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError {
    #[error("test {0} not found")]
    NotFound(TestId),
    #[error(transparent)]
    Validation(#[from] SubmissionError),
    #[error("test is misconfigured: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<LayoutError> for FlowError {
    fn from(err: LayoutError) -> Self {
        Self::Configuration(err.into())
    }
}

impl From<TierError> for FlowError {
    fn from(err: TierError) -> Self {
        Self::Configuration(err.into())
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sample(#[from] SampleError),
}
