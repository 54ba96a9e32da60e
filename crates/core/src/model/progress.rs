use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AnswerId, QuestionId, TestId};
use crate::model::layout::PageLayout;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Reasons a page submission is refused. Progress is never touched when one
/// of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("missing answer for {} question(s)", .0.len())]
    MissingAnswers(Vec<QuestionId>),

    #[error("answer {answer} is not an option of question {question}")]
    ForeignAnswer {
        question: QuestionId,
        answer: AnswerId,
    },

    #[error("progress is {}, not active", .0.as_str())]
    NotActive(ProgressStatus),

    #[error("page {0} is not part of the test")]
    PageUnavailable(u32),
}

impl SubmissionError {
    /// Questions the respondent still has to answer, if that is the failure.
    #[must_use]
    pub fn missing_questions(&self) -> &[QuestionId] {
        match self {
            SubmissionError::MissingAnswers(ids) => ids,
            _ => &[],
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("page count must be > 0")]
    NoPages,

    #[error("current page {current} outside 1..={count}")]
    PageOutOfRange { current: u32, count: u32 },

    #[error("finished progress must sit on its last page")]
    FinishedBeforeLastPage,

    #[error("invalid progress status: {0}")]
    InvalidStatus(String),
}

//
// ─── ANSWER SHEET ──────────────────────────────────────────────────────────────
//

/// Selected answers per question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSheet(BTreeMap<QuestionId, BTreeSet<AnswerId>>);

impl AnswerSheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the selection of every question present in `submission`.
    pub fn merge(&mut self, submission: PageSubmission) {
        for (question, answers) in submission.0 {
            self.0.insert(question, answers);
        }
    }

    #[must_use]
    pub fn selected(&self, question: QuestionId) -> Option<&BTreeSet<AnswerId>> {
        self.0.get(&question)
    }

    /// Every selected answer id across all questions.
    #[must_use]
    pub fn checked(&self) -> BTreeSet<AnswerId> {
        self.0.values().flatten().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of answered questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Empties the sheet question by question.
    pub fn drain(&mut self) -> impl Iterator<Item = (QuestionId, BTreeSet<AnswerId>)> {
        std::mem::take(&mut self.0).into_iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &BTreeSet<AnswerId>)> {
        self.0.iter()
    }
}

//
// ─── PAGE SUBMISSION ───────────────────────────────────────────────────────────
//

/// Answers posted for one page, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageSubmission(BTreeMap<QuestionId, BTreeSet<AnswerId>>);

impl PageSubmission {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `answer` to the selection of `question`.
    #[must_use]
    pub fn select(mut self, question: QuestionId, answer: AnswerId) -> Self {
        self.0.entry(question).or_default().insert(answer);
        self
    }

    /// Keeps only questions of `page`, requiring ≥1 valid answer for each.
    ///
    /// Selections for questions that are not on the page are dropped.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::ForeignAnswer` if an answer id is not an
    /// option of its question, `SubmissionError::MissingAnswers` if any
    /// question of the page has no selection.
    pub fn validate(mut self, page: &PageLayout) -> Result<Self, SubmissionError> {
        let mut accepted = BTreeMap::new();
        let mut missing = Vec::new();

        for question in &page.questions {
            let id = question.question.id();
            let selected = self.0.remove(&id).unwrap_or_default();
            if selected.is_empty() {
                missing.push(id);
                continue;
            }
            if let Some(answer) = selected.iter().find(|a| !question.offers(**a)) {
                return Err(SubmissionError::ForeignAnswer {
                    question: id,
                    answer: *answer,
                });
            }
            accepted.insert(id, selected);
        }

        if !missing.is_empty() {
            return Err(SubmissionError::MissingAnswers(missing));
        }
        Ok(Self(accepted))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(QuestionId, AnswerId)> for PageSubmission {
    fn from_iter<I: IntoIterator<Item = (QuestionId, AnswerId)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |acc, (question, answer)| acc.select(question, answer))
    }
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    Active,
    Finished,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::Active => "active",
            ProgressStatus::Finished => "finished",
        }
    }

    /// # Errors
    ///
    /// Returns `ProgressError::InvalidStatus` for unknown strings.
    pub fn parse(raw: &str) -> Result<Self, ProgressError> {
        match raw {
            "not_started" => Ok(ProgressStatus::NotStarted),
            "active" => Ok(ProgressStatus::Active),
            "finished" => Ok(ProgressStatus::Finished),
            other => Err(ProgressError::InvalidStatus(other.to_owned())),
        }
    }
}

/// In-flight test-taking state of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    status: ProgressStatus,
    test_id: TestId,
    current_page: u32,
    page_count: u32,
    answers: AnswerSheet,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Progress {
    /// Fresh active progress positioned on page 1.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoPages` if `page_count` is zero.
    pub fn start(
        test_id: TestId,
        page_count: u32,
        started_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if page_count == 0 {
            return Err(ProgressError::NoPages);
        }
        Ok(Self {
            status: ProgressStatus::Active,
            test_id,
            current_page: 1,
            page_count,
            answers: AnswerSheet::new(),
            started_at,
            finished_at: None,
        })
    }

    /// Rehydrate progress from a store.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the page cursor is out of range or a
    /// finished record is not on its last page.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        status: ProgressStatus,
        test_id: TestId,
        current_page: u32,
        page_count: u32,
        answers: AnswerSheet,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if page_count == 0 {
            return Err(ProgressError::NoPages);
        }
        if current_page == 0 || current_page > page_count {
            return Err(ProgressError::PageOutOfRange {
                current: current_page,
                count: page_count,
            });
        }
        if status == ProgressStatus::Finished && current_page != page_count {
            return Err(ProgressError::FinishedBeforeLastPage);
        }
        Ok(Self {
            status,
            test_id,
            current_page,
            page_count,
            answers,
            started_at,
            finished_at,
        })
    }

    #[must_use]
    pub fn status(&self) -> ProgressStatus {
        self.status
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ProgressStatus::Active
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == ProgressStatus::Finished
    }

    /// Merges an already validated submission and moves the cursor forward,
    /// finishing on the last page.
    pub(crate) fn record_page(&mut self, submission: PageSubmission, at: DateTime<Utc>) {
        self.answers.merge(submission);
        if self.current_page < self.page_count {
            self.current_page += 1;
        } else {
            self.status = ProgressStatus::Finished;
            self.finished_at = Some(at);
        }
    }

    /// Takes the accumulated answers out, ending the record's useful life.
    pub fn drain_answers(&mut self) -> BTreeSet<AnswerId> {
        let drained: BTreeSet<AnswerId> = self
            .answers
            .drain()
            .flat_map(|(_, answers)| answers)
            .collect();
        self.status = ProgressStatus::NotStarted;
        drained
    }
}
