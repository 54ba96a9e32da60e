use crate::model::{Answer, AnswerSlot};

/// Anything that contributes a score weight.
pub trait Weighted {
    fn weight(&self) -> i64;
}

impl Weighted for Answer {
    fn weight(&self) -> i64 {
        Answer::weight(self)
    }
}

impl Weighted for AnswerSlot {
    fn weight(&self) -> i64 {
        self.weight
    }
}

impl<T: Weighted + ?Sized> Weighted for &T {
    fn weight(&self) -> i64 {
        (**self).weight()
    }
}

/// Sum of weights. The empty set scores 0; the sum saturates at the `i64` bounds.
#[must_use]
pub fn score<I>(answers: I) -> i64
where
    I: IntoIterator,
    I::Item: Weighted,
{
    answers
        .into_iter()
        .fold(0_i64, |acc, answer| acc.saturating_add(answer.weight()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerId, PageId, QuestionId};
    use proptest::prelude::*;

    fn slot(weight: i64) -> AnswerSlot {
        AnswerSlot {
            page_id: PageId::new(1),
            question_id: QuestionId::new(1),
            answer_id: AnswerId::new(1),
            weight,
        }
    }

    #[test]
    fn empty_set_scores_zero() {
        assert_eq!(score(Vec::<AnswerSlot>::new()), 0);
    }

    #[test]
    fn mixed_signs_sum() {
        let answers = [slot(5), slot(-3), slot(0), slot(10)];
        assert_eq!(score(&answers), 12);
    }

    #[test]
    fn answers_score_by_weight() {
        let answers = vec![
            Answer::new(AnswerId::new(1), QuestionId::new(1), "low", 1).unwrap(),
            Answer::new(AnswerId::new(2), QuestionId::new(1), "high", 10).unwrap(),
        ];
        assert_eq!(score(&answers), 11);
    }

    #[test]
    fn sum_saturates() {
        assert_eq!(score([slot(i64::MAX), slot(1)]), i64::MAX);
    }

    proptest! {
        #[test]
        fn score_is_sum_of_weights(weights in proptest::collection::vec(-1_000_i64..1_000, 0..32)) {
            let slots: Vec<_> = weights.iter().copied().map(slot).collect();
            prop_assert_eq!(score(&slots), weights.iter().sum::<i64>());
        }
    }
}
