//! Minimal-change search for alternate result tiers.
//!
//! Combinations of unchecked answers are tried smallest first and, within one
//! size, in lexicographic order of their positions in the (question id,
//! answer id) ordering. The first admissible combination that moves the score
//! into a strictly better tier wins the "better" slot, likewise for "worse".
//! The cost is exponential in the number of unchecked answers, so every run is
//! bounded by a `SearchBudget`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::model::{AnswerId, AnswerSlot, PageId, QuestionId, ResolvedTier, TestLayout};
use crate::resolver::TierLadder;
use crate::scoring::score;

/// How often the wall clock is consulted, in evaluated combinations.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SearchError {
    #[error("search budget exceeded: {0}")]
    BudgetExceeded(BudgetLimit),
}

impl SearchError {
    /// The bound that stopped the search.
    #[must_use]
    pub fn limit(&self) -> BudgetLimit {
        match self {
            SearchError::BudgetExceeded(limit) => *limit,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "bound", rename_all = "snake_case")]
pub enum BudgetLimit {
    #[error("{unchecked} unchecked answers, limit is {limit}")]
    Unchecked { unchecked: usize, limit: usize },

    #[error("more than {limit} combinations")]
    Combinations { limit: u64 },

    #[error("ran longer than {limit:?}")]
    Time { limit: Duration },
}

/// Upper bounds for one search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    pub max_unchecked: usize,
    pub max_combinations: u64,
    pub max_duration: Option<Duration>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_unchecked: 20,
            max_combinations: 1 << 20,
            max_duration: Some(Duration::from_secs(2)),
        }
    }
}

/// A hypothetical answer set and the tier it would reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternate {
    pub tier: ResolvedTier,
    pub score: i64,
    pub answers: Vec<AnswerSlot>,
}

impl Alternate {
    #[must_use]
    pub fn answer_ids(&self) -> Vec<AnswerId> {
        self.answers.iter().map(|s| s.answer_id).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proximity {
    pub better: Option<Alternate>,
    pub worse: Option<Alternate>,
    /// Combinations taken from the enumeration, including skipped ones.
    pub evaluated: u64,
}

//
// ─── PAGE GROUPING ─────────────────────────────────────────────────────────────
//

/// Answers of a combination grouped by page, then by question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageGroups {
    pages: BTreeMap<PageId, BTreeMap<QuestionId, Vec<AnswerSlot>>>,
}

impl PageGroups {
    #[must_use]
    pub fn group(slots: &[AnswerSlot]) -> Self {
        let mut pages: BTreeMap<PageId, BTreeMap<QuestionId, Vec<AnswerSlot>>> = BTreeMap::new();
        for slot in slots {
            pages
                .entry(slot.page_id)
                .or_default()
                .entry(slot.question_id)
                .or_default()
                .push(*slot);
        }
        Self { pages }
    }

    /// Pages on which the combination touches exactly one question.
    #[must_use]
    pub fn single_question_pages(&self) -> BTreeSet<PageId> {
        self.pages
            .iter()
            .filter(|(_, questions)| questions.len() == 1)
            .map(|(page, _)| *page)
            .collect()
    }
}

/// Drops every answer that sits on a page where the combination touches more
/// than one question. Order of the remaining answers is kept.
#[must_use]
pub fn admissible(combination: &[AnswerSlot]) -> Vec<AnswerSlot> {
    let keep = PageGroups::group(combination).single_question_pages();
    combination
        .iter()
        .filter(|slot| keep.contains(&slot.page_id))
        .copied()
        .collect()
}

//
// ─── COMBINATIONS ──────────────────────────────────────────────────────────────
//

/// Index combinations of `0..n`, size 1 first, lexicographic within a size.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    fresh: bool,
}

impl Combinations {
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            n,
            indices: Vec::new(),
            fresh: true,
        }
    }

    fn advance(&mut self) -> bool {
        let r = self.indices.len();
        if r == 0 {
            return false;
        }
        let Some(i) = (0..r).rev().find(|&i| self.indices[i] < self.n - r + i) else {
            return false;
        };
        self.indices[i] += 1;
        for j in i + 1..r {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        true
    }

    fn grow(&mut self) -> bool {
        let r = self.indices.len() + 1;
        if r > self.n {
            return false;
        }
        self.indices = (0..r).collect();
        true
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let moved = if self.fresh {
            self.fresh = false;
            self.grow()
        } else {
            self.advance() || self.grow()
        };
        moved.then(|| self.indices.clone())
    }
}

//
// ─── SEARCH ────────────────────────────────────────────────────────────────────
//

pub struct ProximitySearch<'a> {
    layout: &'a TestLayout,
    ladder: &'a TierLadder,
    budget: SearchBudget,
}

impl<'a> ProximitySearch<'a> {
    #[must_use]
    pub fn new(layout: &'a TestLayout, ladder: &'a TierLadder) -> Self {
        Self {
            layout,
            ladder,
            budget: SearchBudget::default(),
        }
    }

    #[must_use]
    pub fn with_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Looks for the smallest admissible additions to `checked` that change
    /// `current` (the tier reached by `base_score`) in each direction.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::BudgetExceeded` when the unchecked answers,
    /// the number of combinations or the elapsed time pass the budget.
    pub fn search(
        &self,
        checked: &BTreeSet<AnswerId>,
        base_score: i64,
        current: &ResolvedTier,
    ) -> Result<Proximity, SearchError> {
        let unchecked = self.layout.unchecked_slots(checked);
        if unchecked.len() > self.budget.max_unchecked {
            return Err(SearchError::BudgetExceeded(BudgetLimit::Unchecked {
                unchecked: unchecked.len(),
                limit: self.budget.max_unchecked,
            }));
        }

        let started = Instant::now();
        let mut result = Proximity::default();

        for positions in Combinations::new(unchecked.len()) {
            result.evaluated += 1;
            self.check_budget(result.evaluated, started)?;

            let combination: Vec<AnswerSlot> = positions.iter().map(|&i| unchecked[i]).collect();
            let filtered = admissible(&combination);
            if filtered.is_empty() {
                continue;
            }

            let candidate_score = base_score.saturating_add(score(&filtered));
            let tier = self.ladder.resolve(candidate_score);
            let slot = match tier.rank_cmp(current) {
                Ordering::Greater => &mut result.better,
                Ordering::Less => &mut result.worse,
                Ordering::Equal => continue,
            };
            if slot.is_none() {
                *slot = Some(Alternate {
                    tier,
                    score: candidate_score,
                    answers: filtered,
                });
            }

            if result.better.is_some() && result.worse.is_some() {
                break;
            }
        }

        Ok(result)
    }

    fn check_budget(&self, evaluated: u64, started: Instant) -> Result<(), SearchError> {
        if evaluated > self.budget.max_combinations {
            return Err(SearchError::BudgetExceeded(BudgetLimit::Combinations {
                limit: self.budget.max_combinations,
            }));
        }
        if let Some(limit) = self.budget.max_duration
            && evaluated % CLOCK_CHECK_INTERVAL == 0
            && started.elapsed() > limit
        {
            return Err(SearchError::BudgetExceeded(BudgetLimit::Time { limit }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layout::fixtures::layout;

    fn ids(values: &[u64]) -> BTreeSet<AnswerId> {
        values.iter().copied().map(AnswerId::new).collect()
    }

    fn ladder_for(layout: &TestLayout, thresholds: &[(u64, i64)]) -> TierLadder {
        let tiers = thresholds
            .iter()
            .map(|(id, t)| {
                crate::model::ResultTier::new(
                    crate::model::TierId::new(*id),
                    layout.test_id(),
                    format!("T{id}"),
                    *t,
                )
                .unwrap()
            })
            .collect();
        TierLadder::new(layout.test_id(), tiers).unwrap()
    }

    fn run(
        layout: &TestLayout,
        ladder: &TierLadder,
        checked: &BTreeSet<AnswerId>,
    ) -> Result<Proximity, SearchError> {
        let base = score(checked.iter().filter_map(|id| layout.slot(*id)));
        let current = ladder.resolve(base);
        ProximitySearch::new(layout, ladder).search(checked, base, &current)
    }

    #[test]
    fn combinations_are_size_then_lexicographic() {
        let all: Vec<_> = Combinations::new(3).collect();
        assert_eq!(
            all,
            vec![
                vec![0],
                vec![1],
                vec![2],
                vec![0, 1],
                vec![0, 2],
                vec![1, 2],
                vec![0, 1, 2],
            ]
        );
        assert_eq!(Combinations::new(0).count(), 0);
        assert_eq!(Combinations::new(10).count(), 1023);
    }

    #[test]
    fn single_question_finds_better_tier_only() {
        // low:1, high:10; T0 at 0, T1 at 5.
        let layout = layout(&[(1, &[(1, &[(1, 1), (2, 10)])])]);
        let ladder = ladder_for(&layout, &[(10, 0), (11, 5)]);
        let result = run(&layout, &ladder, &ids(&[1])).unwrap();

        let better = result.better.unwrap();
        assert_eq!(better.tier.label(), "T11");
        assert_eq!(better.score, 11);
        assert_eq!(better.answer_ids(), vec![AnswerId::new(2)]);
        assert!(result.worse.is_none());
    }

    #[test]
    fn same_page_cross_question_combination_is_discarded() {
        // X (answer 1) on Q1 and Y (answer 2) on Q2 share page 1.
        // Only X+Y together would reach T2.
        let layout = layout(&[(1, &[(1, &[(1, 3), (3, 0)]), (2, &[(2, 3), (4, 0)])])]);
        let ladder = ladder_for(&layout, &[(1, 0), (2, 6)]);
        let result = run(&layout, &ladder, &ids(&[3, 4])).unwrap();

        assert!(result.better.is_none());
        assert!(result.worse.is_none());
        // {X}, {Y}, {X,Y} are all evaluated; the pair is filtered to nothing.
        assert_eq!(result.evaluated, 3);
    }

    #[test]
    fn single_answers_on_shared_page_are_still_evaluated() {
        let layout = layout(&[(1, &[(1, &[(1, 6), (3, 0)]), (2, &[(2, -5), (4, 0)])])]);
        let ladder = ladder_for(&layout, &[(1, -5), (2, 0), (3, 5)]);
        let result = run(&layout, &ladder, &ids(&[3, 4])).unwrap();

        assert_eq!(result.better.unwrap().answer_ids(), vec![AnswerId::new(1)]);
        assert_eq!(result.worse.unwrap().answer_ids(), vec![AnswerId::new(2)]);
    }

    #[test]
    fn two_answers_of_one_question_count_together() {
        let layout = layout(&[(1, &[(1, &[(1, 0), (2, 3), (3, 3)])])]);
        let ladder = ladder_for(&layout, &[(1, 0), (2, 6)]);
        let result = run(&layout, &ladder, &ids(&[1])).unwrap();

        let better = result.better.unwrap();
        assert_eq!(better.answer_ids(), vec![AnswerId::new(2), AnswerId::new(3)]);
        assert_eq!(better.score, 6);
    }

    #[test]
    fn smallest_cardinality_wins_over_lexicographic_order() {
        // Answer 2 alone reaches T2; pairs containing answer 1 would too but
        // come later in the enumeration.
        let layout = layout(&[(1, &[(1, &[(1, 4), (2, 5)])]), (2, &[(2, &[(3, 1), (4, 0)])])]);
        let ladder = ladder_for(&layout, &[(1, 0), (2, 5)]);
        let result = run(&layout, &ladder, &ids(&[4])).unwrap();
        assert_eq!(result.better.unwrap().answer_ids(), vec![AnswerId::new(2)]);
    }

    #[test]
    fn lexicographic_order_breaks_ties_within_a_size() {
        let layout = layout(&[(1, &[(1, &[(1, 5), (2, 5), (3, 0)])])]);
        let ladder = ladder_for(&layout, &[(1, 0), (2, 5)]);
        let result = run(&layout, &ladder, &ids(&[3])).unwrap();
        assert_eq!(result.better.unwrap().answer_ids(), vec![AnswerId::new(1)]);
    }

    #[test]
    fn answers_on_different_pages_combine() {
        let layout = layout(&[(1, &[(1, &[(1, 2), (3, 0)])]), (2, &[(2, &[(2, 2), (4, 0)])])]);
        let ladder = ladder_for(&layout, &[(1, 0), (2, 4)]);
        let result = run(&layout, &ladder, &ids(&[3, 4])).unwrap();
        assert_eq!(
            result.better.unwrap().answer_ids(),
            vec![AnswerId::new(1), AnswerId::new(2)]
        );
    }

    #[test]
    fn sentinel_current_tier_finds_better() {
        let layout = layout(&[(1, &[(1, &[(1, -10), (2, 10)])])]);
        let ladder = ladder_for(&layout, &[(1, 0)]);
        let result = run(&layout, &ladder, &ids(&[1])).unwrap();
        let better = result.better.unwrap();
        assert_eq!(better.tier.label(), "T1");
        assert!(result.worse.is_none());
    }

    #[test]
    fn no_tiers_means_no_alternates() {
        let layout = layout(&[(1, &[(1, &[(1, 1), (2, 10)])])]);
        let ladder = TierLadder::new(layout.test_id(), Vec::new()).unwrap();
        let result = run(&layout, &ladder, &ids(&[1])).unwrap();
        assert_eq!(result, Proximity { better: None, worse: None, evaluated: 1 });
    }

    #[test]
    fn too_many_unchecked_answers_exceed_budget() {
        let layout = layout(&[(1, &[(1, &[(1, 1), (2, 1), (3, 1), (4, 1)])])]);
        let ladder = ladder_for(&layout, &[(1, 0)]);
        let budget = SearchBudget {
            max_unchecked: 2,
            ..SearchBudget::default()
        };
        let err = ProximitySearch::new(&layout, &ladder)
            .with_budget(budget)
            .search(&ids(&[1]), 1, &ladder.resolve(1))
            .unwrap_err();
        assert_eq!(
            err,
            SearchError::BudgetExceeded(BudgetLimit::Unchecked {
                unchecked: 3,
                limit: 2
            })
        );
    }

    #[test]
    fn combination_cap_exceeds_budget() {
        let layout = layout(&[(1, &[(1, &[(1, 0), (2, 0), (3, 0), (4, 0)])])]);
        let ladder = ladder_for(&layout, &[(1, 0), (2, 100)]);
        let budget = SearchBudget {
            max_combinations: 4,
            ..SearchBudget::default()
        };
        let err = ProximitySearch::new(&layout, &ladder)
            .with_budget(budget)
            .search(&ids(&[1]), 0, &ladder.resolve(0))
            .unwrap_err();
        assert_eq!(err, SearchError::BudgetExceeded(BudgetLimit::Combinations { limit: 4 }));
    }

    #[test]
    fn time_limit_is_read_once_per_clock_interval() {
        let zero_weights = |n: u64| (1..=n).map(|id| (id, 0)).collect::<Vec<(u64, i64)>>();
        let budget = SearchBudget {
            max_duration: Some(Duration::ZERO),
            ..SearchBudget::default()
        };

        // 10 unchecked answers give 1023 combinations; the clock is never read.
        let answers = zero_weights(11);
        let short = layout(&[(1, &[(1, answers.as_slice())])]);
        let ladder = ladder_for(&short, &[(1, 0), (2, 100)]);
        let result = ProximitySearch::new(&short, &ladder)
            .with_budget(budget)
            .search(&ids(&[1]), 0, &ladder.resolve(0))
            .unwrap();
        assert_eq!(result.evaluated, 1023);

        let answers = zero_weights(12);
        let long = layout(&[(1, &[(1, answers.as_slice())])]);
        let ladder = ladder_for(&long, &[(1, 0), (2, 100)]);
        let err = ProximitySearch::new(&long, &ladder)
            .with_budget(budget)
            .search(&ids(&[1]), 0, &ladder.resolve(0))
            .unwrap_err();
        assert_eq!(
            err,
            SearchError::BudgetExceeded(BudgetLimit::Time {
                limit: Duration::ZERO
            })
        );
    }

    #[test]
    fn admissible_keeps_pages_with_one_question() {
        let slot = |page, question, answer| AnswerSlot {
            page_id: PageId::new(page),
            question_id: QuestionId::new(question),
            answer_id: AnswerId::new(answer),
            weight: 1,
        };
        let combination = [slot(1, 1, 1), slot(1, 2, 2), slot(2, 3, 3), slot(2, 3, 4)];
        let kept: Vec<_> = admissible(&combination)
            .iter()
            .map(|s| s.answer_id.value())
            .collect();
        assert_eq!(kept, vec![3, 4]);
    }
}
