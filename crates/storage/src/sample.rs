//! Bundled demo test used by the seed binary and the CLI.

use quiz_core::model::{
    Answer, AnswerId, Page, PageId, PageLayout, Question, QuestionId, QuestionLayout, ResultTier,
    Test, TestId, TestLayout, TierId,
};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SampleError {
    #[error(transparent)]
    Domain(#[from] quiz_core::Error),
    #[error("test id {0} is too large for the sample id range")]
    IdOverflow(u64),
}

/// `(prompt, [(answer, weight)])` per question, one slice per page.
const PAGES: &[&[(&str, &[(&str, i64)])]] = &[
    &[
        (
            "When do you get up?",
            &[("Before six", 3), ("Around seven", 1), ("After nine", -2)],
        ),
        (
            "What comes first?",
            &[("Exercise", 3), ("Coffee", 0), ("Phone", -1)],
        ),
    ],
    &[(
        "Breakfast?",
        &[("Cooked", 2), ("Something quick", 1), ("Skipped", -1)],
    )],
    &[(
        "How do you plan the day?",
        &[("Written list", 2), ("In my head", 0), ("I don't", -2)],
    )],
];

const TIERS: &[(&str, i64)] = &[
    ("Night owl", -3),
    ("Steady starter", 2),
    ("Early bird", 7),
];

/// Builds the demo test under `test_id`. Child ids are allocated from
/// `test_id * 1000` so several copies can share one database.
///
/// # Errors
///
/// Returns `SampleError` if the name is blank or the id range overflows.
pub fn morning_routine(
    test_id: TestId,
    name: impl Into<String>,
    description: Option<String>,
) -> Result<(TestLayout, Vec<ResultTier>), SampleError> {
    let base = test_id
        .value()
        .checked_mul(1_000)
        .ok_or(SampleError::IdOverflow(test_id.value()))?;
    Ok(build(test_id, base, name.into(), description)?)
}

fn build(
    test_id: TestId,
    base: u64,
    name: String,
    description: Option<String>,
) -> Result<(TestLayout, Vec<ResultTier>), quiz_core::Error> {
    let test = Test::new(test_id, name, description)?;

    let mut next_question = base;
    let mut next_answer = base;
    let mut pages = Vec::with_capacity(PAGES.len());
    for (position, questions) in (1_u32..).zip(PAGES.iter()) {
        let page_id = PageId::new(base + u64::from(position));
        let mut question_layouts = Vec::with_capacity(questions.len());
        for (prompt, answers) in *questions {
            next_question += 1;
            let question_id = QuestionId::new(next_question);
            let mut built = Vec::with_capacity(answers.len());
            for (text, weight) in *answers {
                next_answer += 1;
                built.push(Answer::new(
                    AnswerId::new(next_answer),
                    question_id,
                    *text,
                    *weight,
                )?);
            }
            question_layouts.push(QuestionLayout {
                question: Question::new(question_id, page_id, *prompt)?,
                answers: built,
            });
        }
        pages.push(PageLayout {
            page: Page::new(page_id, test_id, position)?,
            questions: question_layouts,
        });
    }

    let tiers = (1_u64..)
        .zip(TIERS.iter())
        .map(|(offset, (label, threshold))| {
            ResultTier::new(TierId::new(base + offset), test_id, *label, *threshold)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((TestLayout::new(test, pages)?, tiers))
}
