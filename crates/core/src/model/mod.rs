mod ids;
pub(crate) mod layout;
mod progress;
mod question;
mod tier;

pub use ids::{AnswerId, PageId, ParseIdError, QuestionId, SessionKey, TestId, TierId};
pub use layout::{AnswerSlot, LayoutError, PageLayout, QuestionLayout, TestLayout};
pub use progress::{
    AnswerSheet, PageSubmission, Progress, ProgressError, ProgressStatus, SubmissionError,
};
pub use question::{Answer, Page, Question, QuestionError};
pub use test::{Test, TestError};
pub use tier::{ResolvedTier, ResultTier, TierError};
