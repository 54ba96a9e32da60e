//! Render-ready shapes returned by `TestFlowService`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use quiz_core::flow::Redirect;
use quiz_core::model::{
    AnswerId, AnswerSheet, AnswerSlot, PageId, PageLayout, ProgressStatus, QuestionId,
    ResolvedTier, Test, TestId, TestLayout,
};
use quiz_core::proximity::{Alternate, BudgetLimit, SearchError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestSummary {
    pub id: TestId,
    pub name: String,
    pub description: Option<String>,
}

impl From<&Test> for TestSummary {
    fn from(test: &Test) -> Self {
        Self {
            id: test.id(),
            name: test.name().to_owned(),
            description: test.description().map(ToOwned::to_owned),
        }
    }
}

/// Landing listing: every test plus where the session currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexView {
    pub tests: Vec<TestSummary>,
    pub status: Option<ProgressStatus>,
    pub active_test: Option<TestId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOption {
    pub id: AnswerId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub text: String,
    pub answers: Vec<AnswerOption>,
    /// Previously recorded selection, if the page was answered before.
    pub selected: BTreeSet<AnswerId>,
    /// Set when a submission left this question unanswered.
    pub missing: bool,
}

/// One page of a test ready to display, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageView {
    pub test: TestSummary,
    pub page_id: PageId,
    pub number: u32,
    pub count: u32,
    pub questions: Vec<QuestionView>,
}

impl PageView {
    pub(crate) fn build(
        layout: &TestLayout,
        page: &PageLayout,
        number: u32,
        answers: &AnswerSheet,
        missing: &[QuestionId],
    ) -> Self {
        let questions = page
            .questions
            .iter()
            .map(|q| QuestionView {
                id: q.question.id(),
                text: q.question.text().to_owned(),
                answers: q
                    .answers
                    .iter()
                    .map(|a| AnswerOption {
                        id: a.id(),
                        text: a.text().to_owned(),
                    })
                    .collect(),
                selected: answers.selected(q.question.id()).cloned().unwrap_or_default(),
                missing: missing.contains(&q.question.id()),
            })
            .collect();
        Self {
            test: TestSummary::from(layout.test()),
            page_id: page.page.id(),
            number,
            count: layout.page_count(),
            questions,
        }
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.number == self.count
    }

    #[must_use]
    pub fn missing_questions(&self) -> Vec<QuestionId> {
        self.questions
            .iter()
            .filter(|q| q.missing)
            .map(|q| q.id)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PageOutcome {
    Page(PageView),
    Redirect(Redirect),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerView {
    pub question_id: QuestionId,
    pub answer_id: AnswerId,
    pub text: String,
    pub weight: i64,
}

impl AnswerView {
    pub(crate) fn from_slot(layout: &TestLayout, slot: AnswerSlot) -> Self {
        Self {
            question_id: slot.question_id,
            answer_id: slot.answer_id,
            text: layout
                .answer(slot.answer_id)
                .map(|a| a.text().to_owned())
                .unwrap_or_default(),
            weight: slot.weight,
        }
    }
}

/// An alternate tier and the additional answers that would reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlternateView {
    pub tier: ResolvedTier,
    pub score: i64,
    pub answers: Vec<AnswerView>,
}

impl AlternateView {
    pub(crate) fn build(layout: &TestLayout, alternate: Alternate) -> Self {
        Self {
            tier: alternate.tier,
            score: alternate.score,
            answers: alternate
                .answers
                .into_iter()
                .map(|slot| AnswerView::from_slot(layout, slot))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SearchStatus {
    Complete,
    /// Alternates are absent because the search stopped at its budget.
    BudgetExceeded(BudgetLimit),
}

impl From<&SearchError> for SearchStatus {
    fn from(err: &SearchError) -> Self {
        Self::BudgetExceeded(err.limit())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultView {
    pub test: TestSummary,
    pub score: i64,
    pub tier: ResolvedTier,
    pub checked: Vec<AnswerView>,
    pub better: Option<AlternateView>,
    pub worse: Option<AlternateView>,
    pub search: SearchStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResultOutcome {
    Result(Box<ResultView>),
    Redirect(Redirect),
}
