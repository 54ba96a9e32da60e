use thiserror::Error;

use crate::model::ids::{AnswerId, PageId, QuestionId, TestId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyQuestionText,

    #[error("answer text cannot be empty")]
    EmptyAnswerText,

    #[error("page position must be >= 1")]
    InvalidPagePosition,
}

//
// ─── PAGE ──────────────────────────────────────────────────────────────────────
//

/// One page of a test. `position` defines the flow order between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    id: PageId,
    test_id: TestId,
    position: u32,
}

impl Page {
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidPagePosition` for position 0.
    pub fn new(id: PageId, test_id: TestId, position: u32) -> Result<Self, QuestionError> {
        if position == 0 {
            return Err(QuestionError::InvalidPagePosition);
        }
        Ok(Self {
            id,
            test_id,
            position,
        })
    }

    #[must_use]
    pub fn id(&self) -> PageId {
        self.id
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Stable ordering key among the pages of a test.
    #[must_use]
    pub fn sort_key(&self) -> (u32, PageId) {
        (self.position, self.id)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    page_id: PageId,
    text: String,
}

impl Question {
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyQuestionText` if text is blank.
    pub fn new(
        id: QuestionId,
        page_id: PageId,
        text: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyQuestionText);
        }
        Ok(Self {
            id,
            page_id,
            text: text.trim().to_owned(),
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

//
// ─── ANSWER ────────────────────────────────────────────────────────────────────
//

/// A selectable option of a question. The weight may be negative, zero or positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    id: AnswerId,
    question_id: QuestionId,
    text: String,
    weight: i64,
}

impl Answer {
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyAnswerText` if text is blank.
    pub fn new(
        id: AnswerId,
        question_id: QuestionId,
        text: impl Into<String>,
        weight: i64,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyAnswerText);
        }
        Ok(Self {
            id,
            question_id,
            text: text.trim().to_owned(),
            weight,
        })
    }

    #[must_use]
    pub fn id(&self) -> AnswerId {
        self.id
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn weight(&self) -> i64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_rejects_zero_position() {
        let err = Page::new(PageId::new(1), TestId::new(1), 0).unwrap_err();
        assert_eq!(err, QuestionError::InvalidPagePosition);
    }

    #[test]
    fn page_sort_key_breaks_ties_by_id() {
        let a = Page::new(PageId::new(5), TestId::new(1), 1).unwrap();
        let b = Page::new(PageId::new(2), TestId::new(1), 1).unwrap();
        assert!(b.sort_key() < a.sort_key());
    }

    #[test]
    fn answer_allows_negative_weight() {
        let answer = Answer::new(AnswerId::new(1), QuestionId::new(1), " never ", -3).unwrap();
        assert_eq!(answer.weight(), -3);
        assert_eq!(answer.text(), "never");
    }

    #[test]
    fn blank_texts_are_rejected() {
        assert_eq!(
            Question::new(QuestionId::new(1), PageId::new(1), "").unwrap_err(),
            QuestionError::EmptyQuestionText
        );
        assert_eq!(
            Answer::new(AnswerId::new(1), QuestionId::new(1), " ", 1).unwrap_err(),
            QuestionError::EmptyAnswerText
        );
    }
}
