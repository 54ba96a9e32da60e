use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::model::ids::{AnswerId, PageId, QuestionId, TestId};
use crate::model::question::{Answer, Page, Question};
use crate::model::test::Test;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LayoutError {
    #[error("test {0} has no pages")]
    NoPages(TestId),

    #[error("page {0} has no questions")]
    EmptyPage(PageId),

    #[error("question {0} has no answers")]
    NoAnswers(QuestionId),

    #[error("page {page} does not belong to test {test}")]
    ForeignPage { page: PageId, test: TestId },

    #[error("question {question} does not belong to page {page}")]
    ForeignQuestion { question: QuestionId, page: PageId },

    #[error("answer {answer} does not belong to question {question}")]
    ForeignAnswer {
        answer: AnswerId,
        question: QuestionId,
    },

    #[error("answer {0} appears more than once")]
    DuplicateAnswer(AnswerId),

    #[error("too many pages: {0}")]
    TooManyPages(usize),
}

/// Where an answer lives inside a test, plus its weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnswerSlot {
    pub page_id: PageId,
    pub question_id: QuestionId,
    pub answer_id: AnswerId,
    pub weight: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionLayout {
    pub question: Question,
    pub answers: Vec<Answer>,
}

impl QuestionLayout {
    #[must_use]
    pub fn offers(&self, answer_id: AnswerId) -> bool {
        self.answers.iter().any(|a| a.id() == answer_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub page: Page,
    pub questions: Vec<QuestionLayout>,
}

impl PageLayout {
    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&QuestionLayout> {
        self.questions.iter().find(|q| q.question.id() == id)
    }

    #[must_use]
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(|q| q.question.id()).collect()
    }
}

/// Fully loaded, validated shape of a test: ordered pages, their questions
/// (ordered by id) and the answers of each question (ordered by id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestLayout {
    test: Test,
    pages: Vec<PageLayout>,
    slots: HashMap<AnswerId, AnswerSlot>,
}

impl TestLayout {
    /// Validates ownership and the non-empty invariants, then fixes the order.
    ///
    /// # Errors
    ///
    /// Returns `LayoutError` when a page, question or answer is missing its
    /// children, points at the wrong parent, or an answer id repeats.
    pub fn new(test: Test, mut pages: Vec<PageLayout>) -> Result<Self, LayoutError> {
        if pages.is_empty() {
            return Err(LayoutError::NoPages(test.id()));
        }
        if u32::try_from(pages.len()).is_err() {
            return Err(LayoutError::TooManyPages(pages.len()));
        }

        pages.sort_by_key(|p| p.page.sort_key());

        let mut slots = HashMap::new();
        for page in &mut pages {
            if page.page.test_id() != test.id() {
                return Err(LayoutError::ForeignPage {
                    page: page.page.id(),
                    test: test.id(),
                });
            }
            if page.questions.is_empty() {
                return Err(LayoutError::EmptyPage(page.page.id()));
            }
            page.questions.sort_by_key(|q| q.question.id());

            for question in &mut page.questions {
                if question.question.page_id() != page.page.id() {
                    return Err(LayoutError::ForeignQuestion {
                        question: question.question.id(),
                        page: page.page.id(),
                    });
                }
                if question.answers.is_empty() {
                    return Err(LayoutError::NoAnswers(question.question.id()));
                }
                question.answers.sort_by_key(Answer::id);

                for answer in &question.answers {
                    if answer.question_id() != question.question.id() {
                        return Err(LayoutError::ForeignAnswer {
                            answer: answer.id(),
                            question: question.question.id(),
                        });
                    }
                    let slot = AnswerSlot {
                        page_id: page.page.id(),
                        question_id: question.question.id(),
                        answer_id: answer.id(),
                        weight: answer.weight(),
                    };
                    if slots.insert(answer.id(), slot).is_some() {
                        return Err(LayoutError::DuplicateAnswer(answer.id()));
                    }
                }
            }
        }

        Ok(Self { test, pages, slots })
    }

    #[must_use]
    pub fn test(&self) -> &Test {
        &self.test
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test.id()
    }

    #[must_use]
    pub fn pages(&self) -> &[PageLayout] {
        &self.pages
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        // Bounded by the constructor.
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }

    /// Page by 1-based number in flow order.
    #[must_use]
    pub fn page(&self, number: u32) -> Option<&PageLayout> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.pages.get(index)
    }

    #[must_use]
    pub fn slot(&self, answer_id: AnswerId) -> Option<AnswerSlot> {
        self.slots.get(&answer_id).copied()
    }

    #[must_use]
    pub fn answer(&self, answer_id: AnswerId) -> Option<&Answer> {
        let slot = self.slot(answer_id)?;
        self.pages
            .iter()
            .find(|p| p.page.id() == slot.page_id)?
            .question(slot.question_id)?
            .answers
            .iter()
            .find(|a| a.id() == answer_id)
    }

    /// All answer slots, ordered by (question id, answer id).
    #[must_use]
    pub fn slots_by_question(&self) -> Vec<AnswerSlot> {
        let mut slots: Vec<_> = self.slots.values().copied().collect();
        slots.sort_by_key(|s| (s.question_id, s.answer_id));
        slots
    }

    /// Slots not contained in `checked`, ordered by (question id, answer id).
    #[must_use]
    pub fn unchecked_slots(&self, checked: &BTreeSet<AnswerId>) -> Vec<AnswerSlot> {
        self.slots_by_question()
            .into_iter()
            .filter(|s| !checked.contains(&s.answer_id))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Builds a layout from `(page, [(question, [(answer, weight)])])` tuples.
    pub fn layout(pages: &[(u64, &[(u64, &[(u64, i64)])])]) -> TestLayout {
        let test_id = TestId::new(1);
        let test = Test::new(test_id, "Fixture", None).unwrap();
        let pages = pages
            .iter()
            .enumerate()
            .map(|(index, (page_id, questions))| {
                let page_id = PageId::new(*page_id);
                let position = u32::try_from(index + 1).unwrap();
                PageLayout {
                    page: Page::new(page_id, test_id, position).unwrap(),
                    questions: questions
                        .iter()
                        .map(|(question_id, answers)| {
                            let question_id = QuestionId::new(*question_id);
                            QuestionLayout {
                                question: Question::new(question_id, page_id, "Q").unwrap(),
                                answers: answers
                                    .iter()
                                    .map(|(answer_id, weight)| {
                                        Answer::new(
                                            AnswerId::new(*answer_id),
                                            question_id,
                                            format!("A{answer_id}"),
                                            *weight,
                                        )
                                        .unwrap()
                                    })
                                    .collect(),
                            }
                        })
                        .collect(),
                }
            })
            .collect();
        TestLayout::new(test, pages).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::layout;
    use super::*;

    #[test]
    fn layout_orders_pages_and_exposes_slots() {
        let layout = layout(&[(10, &[(2, &[(5, 1), (4, 2)])]), (11, &[(1, &[(3, 7)])])]);
        assert_eq!(layout.page_count(), 2);
        assert_eq!(layout.page(1).unwrap().page.id(), PageId::new(10));
        assert!(layout.page(0).is_none());
        assert!(layout.page(3).is_none());

        let order: Vec<_> = layout
            .slots_by_question()
            .iter()
            .map(|s| s.answer_id.value())
            .collect();
        assert_eq!(order, vec![3, 4, 5]);
        assert_eq!(layout.slot(AnswerId::new(3)).unwrap().page_id, PageId::new(11));
        assert_eq!(layout.answer(AnswerId::new(4)).unwrap().weight(), 2);
    }

    #[test]
    fn layout_rejects_empty_page() {
        let test = Test::new(TestId::new(1), "T", None).unwrap();
        let page = PageLayout {
            page: Page::new(PageId::new(1), TestId::new(1), 1).unwrap(),
            questions: Vec::new(),
        };
        let err = TestLayout::new(test, vec![page]).unwrap_err();
        assert_eq!(err, LayoutError::EmptyPage(PageId::new(1)));
    }

    #[test]
    fn layout_rejects_question_without_answers() {
        let test = Test::new(TestId::new(1), "T", None).unwrap();
        let page = PageLayout {
            page: Page::new(PageId::new(1), TestId::new(1), 1).unwrap(),
            questions: vec![QuestionLayout {
                question: Question::new(QuestionId::new(9), PageId::new(1), "Q").unwrap(),
                answers: Vec::new(),
            }],
        };
        let err = TestLayout::new(test, vec![page]).unwrap_err();
        assert_eq!(err, LayoutError::NoAnswers(QuestionId::new(9)));
    }

    #[test]
    fn layout_rejects_test_without_pages() {
        let test = Test::new(TestId::new(4), "T", None).unwrap();
        assert_eq!(
            TestLayout::new(test, Vec::new()).unwrap_err(),
            LayoutError::NoPages(TestId::new(4))
        );
    }

    #[test]
    fn unchecked_slots_skip_checked_answers() {
        let layout = layout(&[(1, &[(1, &[(1, 1), (2, 10)])])]);
        let checked = BTreeSet::from([AnswerId::new(1)]);
        let unchecked = layout.unchecked_slots(&checked);
        assert_eq!(unchecked.len(), 1);
        assert_eq!(unchecked[0].answer_id, AnswerId::new(2));
    }
}
