use thiserror::Error;

use crate::model::{LayoutError, ProgressError, QuestionError, SubmissionError, TestError, TierError};
use crate::proximity::SearchError;

/// Any domain error raised by this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Test(#[from] TestError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Tier(#[from] TierError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Search(#[from] SearchError),
}
