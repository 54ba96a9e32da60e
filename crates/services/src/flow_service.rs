use std::collections::BTreeSet;
use std::sync::Arc;

use quiz_core::flow::{self, FlowEffect, Redirect, ResultGate, StoreAction, Transition};
use quiz_core::model::{
    AnswerId, AnswerSlot, PageSubmission, Progress, ProgressError, ProgressStatus, SessionKey,
    SubmissionError, TestId, TestLayout,
};
use quiz_core::proximity::{Proximity, ProximitySearch};
use quiz_core::scoring::score;
use storage::repository::{CatalogRepository, ProgressRepository};
use tracing::{debug, info, warn};

use crate::Clock;
use crate::catalog::{load_ladder, load_layout, load_test};
use crate::config::SearchSettings;
use crate::error::FlowError;
use crate::views::{
    AlternateView, AnswerView, IndexView, PageOutcome, PageView, ResultOutcome, ResultView,
    SearchStatus, TestSummary,
};

/// Drives a session through a test: opening, page submission, giving up and
/// the final result with its alternate tiers.
#[derive(Clone)]
pub struct TestFlowService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
    search: SearchSettings,
}

impl TestFlowService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            progress,
            search: SearchSettings::default(),
        }
    }

    #[must_use]
    pub fn with_search_settings(mut self, search: SearchSettings) -> Self {
        self.search = search;
        self
    }

    #[must_use]
    pub fn search_settings(&self) -> SearchSettings {
        self.search
    }

    /// All tests plus the session's live status and test.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Storage` if the catalog or progress cannot be read.
    pub async fn index(&self, session: &SessionKey) -> Result<IndexView, FlowError> {
        let tests = self.catalog.list_tests().await?;
        let live = self.live_progress(session).await?;
        Ok(IndexView {
            tests: tests.iter().map(TestSummary::from).collect(),
            status: live.as_ref().map(Progress::status),
            active_test: live.as_ref().map(Progress::test_id),
        })
    }

    /// Open `test_id`, creating progress if the session has none.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` for an unknown test and
    /// `FlowError::Configuration` for a test that cannot be taken.
    pub async fn start_or_resume(
        &self,
        session: &SessionKey,
        test_id: TestId,
    ) -> Result<FlowEffect, FlowError> {
        let test = load_test(self.catalog.as_ref(), test_id).await?;
        if let Some(redirect) = self.active_elsewhere(session, test_id).await? {
            return Ok(FlowEffect::Redirect(redirect));
        }
        let layout = load_layout(self.catalog.as_ref(), test).await?;
        Ok(self.open(session, &layout).await?.effect)
    }

    /// Record answers for the current page of the session's active test.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Validation` when the session has no active test,
    /// a question on the page is unanswered, or an answer does not belong to
    /// its question. Progress is left unchanged in that case.
    pub async fn submit_page(
        &self,
        session: &SessionKey,
        submission: PageSubmission,
    ) -> Result<FlowEffect, FlowError> {
        let progress = self
            .live_progress(session)
            .await?
            .ok_or(SubmissionError::NotActive(ProgressStatus::NotStarted))?;
        let layout = self.layout(progress.test_id()).await?;
        Ok(self
            .submit(session, progress, &layout, submission)
            .await?
            .effect)
    }

    /// The page the session should see now, if a test is in progress.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` if the test cannot be loaded or no longer has the
    /// recorded page.
    pub async fn current_page(&self, session: &SessionKey) -> Result<Option<PageView>, FlowError> {
        let Some(progress) = self
            .live_progress(session)
            .await?
            .filter(Progress::is_active)
        else {
            return Ok(None);
        };
        let layout = self.layout(progress.test_id()).await?;
        Ok(Some(page_view(&layout, &progress, &[])?))
    }

    /// Drop the session's progress, whatever state it is in.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Storage` if the record cannot be removed.
    pub async fn give_up(&self, session: &SessionKey) -> Result<Redirect, FlowError> {
        let current = self.progress.get_progress(session).await?;
        let abandoned = current.as_ref().map(Progress::test_id);
        let transition = flow::give_up(current);
        self.persist(session, &transition).await?;
        debug!(%session, ?abandoned, "progress discarded");
        Ok(Redirect::Index)
    }

    /// Open a test page, or record `submission` for it and move on.
    ///
    /// A submission with unanswered questions comes back as the same page
    /// with those questions flagged.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` for an unknown test, `FlowError::Validation`
    /// for answers that do not belong to their question, and storage or
    /// configuration errors.
    pub async fn open_or_advance_page(
        &self,
        session: &SessionKey,
        test_id: TestId,
        submission: Option<PageSubmission>,
    ) -> Result<PageOutcome, FlowError> {
        let test = load_test(self.catalog.as_ref(), test_id).await?;
        if let Some(redirect) = self.active_elsewhere(session, test_id).await? {
            return Ok(PageOutcome::Redirect(redirect));
        }
        let layout = load_layout(self.catalog.as_ref(), test).await?;
        let opened = self.open(session, &layout).await?;
        if let FlowEffect::Redirect(redirect) = opened.effect {
            return Ok(PageOutcome::Redirect(redirect));
        }
        let progress = opened.progress.ok_or(ProgressError::NoPages)?;

        let Some(submission) = submission else {
            return Ok(PageOutcome::Page(page_view(&layout, &progress, &[])?));
        };

        match self
            .submit(session, progress.clone(), &layout, submission)
            .await
        {
            Ok(Transition {
                effect: FlowEffect::Redirect(redirect),
                ..
            }) => Ok(PageOutcome::Redirect(redirect)),
            Ok(Transition { progress: next, .. }) => {
                let next = next.ok_or(ProgressError::NoPages)?;
                Ok(PageOutcome::Page(page_view(&layout, &next, &[])?))
            }
            Err(FlowError::Validation(SubmissionError::MissingAnswers(missing))) => {
                debug!(%session, %test_id, missing = missing.len(), "page incomplete");
                Ok(PageOutcome::Page(page_view(&layout, &progress, &missing)?))
            }
            Err(err) => Err(err),
        }
    }

    /// Score a finished test, resolve its tier and search for the nearest
    /// better and worse tiers. The session's progress is consumed.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotFound` for an unknown test, configuration
    /// errors for an invalid tier set, and storage errors.
    pub async fn view_result(
        &self,
        session: &SessionKey,
        test_id: TestId,
    ) -> Result<ResultOutcome, FlowError> {
        let test = load_test(self.catalog.as_ref(), test_id).await?;
        let current = self.progress.get_progress(session).await?;
        let mut progress = match flow::result_gate(current, test_id) {
            ResultGate::Ready(progress) => progress,
            ResultGate::Redirect(redirect) => {
                debug!(%session, %test_id, ?redirect, "result not available");
                return Ok(ResultOutcome::Redirect(redirect));
            }
        };

        let layout = load_layout(self.catalog.as_ref(), test).await?;
        let ladder = load_ladder(self.catalog.as_ref(), test_id).await?;

        let recorded = progress.drain_answers();
        let mut slots: Vec<AnswerSlot> = recorded.iter().filter_map(|id| layout.slot(*id)).collect();
        if slots.len() != recorded.len() {
            warn!(
                %session,
                %test_id,
                dropped = recorded.len() - slots.len(),
                "recorded answers are no longer part of the test"
            );
        }
        slots.sort_by_key(|s| (s.question_id, s.answer_id));
        let checked: BTreeSet<AnswerId> = slots.iter().map(|s| s.answer_id).collect();

        let total = score(&slots);
        let tier = ladder.resolve(total);

        let search = ProximitySearch::new(&layout, &ladder).with_budget(self.search.budget());
        let (proximity, status) = match search.search(&checked, total, &tier) {
            Ok(found) => (found, SearchStatus::Complete),
            Err(err) => {
                warn!(%session, %test_id, %err, "alternate tier search abandoned");
                (Proximity::default(), SearchStatus::from(&err))
            }
        };

        self.progress.delete_progress(session).await?;
        info!(
            %session,
            %test_id,
            score = total,
            tier = tier.label(),
            tier_id = ?tier.tier_id(),
            evaluated = proximity.evaluated,
            "result computed"
        );

        Ok(ResultOutcome::Result(Box::new(ResultView {
            test: TestSummary::from(layout.test()),
            score: total,
            tier,
            checked: slots
                .iter()
                .map(|slot| AnswerView::from_slot(&layout, *slot))
                .collect(),
            better: proximity
                .better
                .map(|alternate| AlternateView::build(&layout, alternate)),
            worse: proximity
                .worse
                .map(|alternate| AlternateView::build(&layout, alternate)),
            search: status,
            started_at: progress.started_at(),
            finished_at: progress.finished_at(),
        })))
    }

    async fn layout(&self, test_id: TestId) -> Result<TestLayout, FlowError> {
        let test = load_test(self.catalog.as_ref(), test_id).await?;
        load_layout(self.catalog.as_ref(), test).await
    }

    /// A redirect to the session's live test when it is not `test_id`.
    async fn active_elsewhere(
        &self,
        session: &SessionKey,
        test_id: TestId,
    ) -> Result<Option<Redirect>, FlowError> {
        let active = self
            .live_progress(session)
            .await?
            .map(|p| p.test_id())
            .filter(|active| *active != test_id);
        if let Some(active) = active {
            warn!(%session, requested = %test_id, %active, "another test is in progress");
        }
        Ok(active.map(Redirect::Test))
    }

    async fn live_progress(&self, session: &SessionKey) -> Result<Option<Progress>, FlowError> {
        Ok(self
            .progress
            .get_progress(session)
            .await?
            .filter(|p| p.status() != ProgressStatus::NotStarted))
    }

    async fn open(
        &self,
        session: &SessionKey,
        layout: &TestLayout,
    ) -> Result<Transition, FlowError> {
        let test_id = layout.test_id();
        let current = self.progress.get_progress(session).await?;
        let transition =
            flow::start_or_resume(current, test_id, layout.page_count(), self.clock.now())?;
        match transition.effect {
            FlowEffect::Redirect(Redirect::Test(active)) => {
                warn!(%session, requested = %test_id, %active, "another test is in progress");
            }
            FlowEffect::Redirect(redirect) => {
                debug!(%session, %test_id, ?redirect, "test already finished");
            }
            FlowEffect::ShowPage { number, count } if transition.store == StoreAction::Save => {
                debug!(%session, %test_id, number, count, "test started");
            }
            FlowEffect::ShowPage { .. } => {}
        }
        self.persist(session, &transition).await?;
        Ok(transition)
    }

    async fn submit(
        &self,
        session: &SessionKey,
        progress: Progress,
        layout: &TestLayout,
        submission: PageSubmission,
    ) -> Result<Transition, FlowError> {
        let transition = flow::submit_page(progress, layout, submission, self.clock.now())?;
        self.persist(session, &transition).await?;
        match transition.effect {
            FlowEffect::ShowPage { number, count } => {
                debug!(%session, test_id = %layout.test_id(), number, count, "page recorded");
            }
            FlowEffect::Redirect(_) => {
                info!(%session, test_id = %layout.test_id(), "test finished");
            }
        }
        Ok(transition)
    }

    async fn persist(&self, session: &SessionKey, transition: &Transition) -> Result<(), FlowError> {
        match (transition.store, &transition.progress) {
            (StoreAction::Save, Some(progress)) => {
                self.progress.put_progress(session, progress).await?;
            }
            (StoreAction::Delete, _) => self.progress.delete_progress(session).await?,
            (StoreAction::Save | StoreAction::Unchanged, _) => {}
        }
        Ok(())
    }
}

fn page_view(
    layout: &TestLayout,
    progress: &Progress,
    missing: &[quiz_core::model::QuestionId],
) -> Result<PageView, FlowError> {
    let number = progress.current_page();
    let page = layout.page(number).ok_or(ProgressError::PageOutOfRange {
        current: number,
        count: layout.page_count(),
    })?;
    Ok(PageView::build(
        layout,
        page,
        number,
        progress.answers(),
        missing,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{
        Answer, Page, PageId, Question, QuestionId, ResolvedTier, ResultTier, Test,
    };
    use quiz_core::proximity::BudgetLimit;
    use quiz_core::time::fixed_clock;
    use storage::repository::{CatalogWriter, InMemoryRepository, StorageError};
    use storage::sample;

    async fn service() -> (TestFlowService, TestLayout) {
        let repo = InMemoryRepository::new();
        let (layout, tiers) = sample::morning_routine(TestId::new(1), "Morning", None).unwrap();
        repo.upsert_test(&layout, &tiers).await.unwrap();
        let repo = Arc::new(repo);
        let service = TestFlowService::new(fixed_clock(), repo.clone(), repo);
        (service, layout)
    }

    fn session() -> SessionKey {
        SessionKey::new("session-1").unwrap()
    }

    /// Picks the first answer of every question on page `number`.
    fn first_answers(layout: &TestLayout, number: u32) -> PageSubmission {
        layout
            .page(number)
            .unwrap()
            .questions
            .iter()
            .map(|q| (q.question.id(), q.answers[0].id()))
            .collect()
    }

    #[tokio::test]
    async fn index_reports_live_test() {
        let (service, _) = service().await;
        let view = service.index(&session()).await.unwrap();
        assert_eq!(view.tests.len(), 1);
        assert_eq!(view.status, None);
        assert_eq!(view.active_test, None);

        service
            .start_or_resume(&session(), TestId::new(1))
            .await
            .unwrap();
        let view = service.index(&session()).await.unwrap();
        assert_eq!(view.status, Some(ProgressStatus::Active));
        assert_eq!(view.active_test, Some(TestId::new(1)));
    }

    #[tokio::test]
    async fn unknown_test_is_not_found() {
        let (service, _) = service().await;
        let err = service
            .start_or_resume(&session(), TestId::new(42))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
    }

    #[tokio::test]
    async fn submit_without_progress_is_rejected() {
        let (service, layout) = service().await;
        let err = service
            .submit_page(&session(), first_answers(&layout, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Validation(SubmissionError::NotActive(ProgressStatus::NotStarted))
        ));
    }

    #[tokio::test]
    async fn incomplete_page_is_redisplayed_with_missing_questions() {
        let (service, layout) = service().await;
        let page = layout.page(1).unwrap();
        let answered = &page.questions[0];
        let partial = PageSubmission::new().select(answered.question.id(), answered.answers[0].id());

        let outcome = service
            .open_or_advance_page(&session(), TestId::new(1), Some(partial))
            .await
            .unwrap();
        let view = match outcome {
            PageOutcome::Page(view) => view,
            other => panic!("expected page, got {other:?}"),
        };
        assert_eq!(view.number, 1);
        assert_eq!(view.missing_questions(), vec![page.questions[1].question.id()]);

        let current = service.current_page(&session()).await.unwrap().unwrap();
        assert_eq!(current.number, 1);
        assert!(current.questions.iter().all(|q| q.selected.is_empty()));
    }

    #[tokio::test]
    async fn resumed_page_shows_recorded_selection() {
        let (service, layout) = service().await;
        service
            .open_or_advance_page(&session(), TestId::new(1), Some(first_answers(&layout, 1)))
            .await
            .unwrap();
        let progress = service.progress.get_progress(&session()).await.unwrap().unwrap();
        let first_question: QuestionId = layout.page(1).unwrap().questions[0].question.id();
        assert!(progress.answers().selected(first_question).is_some());
        assert_eq!(
            service.current_page(&session()).await.unwrap().unwrap().number,
            2
        );
    }

    #[tokio::test]
    async fn give_up_clears_progress() {
        let (service, layout) = service().await;
        service
            .open_or_advance_page(&session(), TestId::new(1), Some(first_answers(&layout, 1)))
            .await
            .unwrap();
        assert_eq!(service.give_up(&session()).await.unwrap(), Redirect::Index);
        assert!(service.current_page(&session()).await.unwrap().is_none());
        assert_eq!(service.index(&session()).await.unwrap().status, None);
    }

    #[tokio::test]
    async fn tiny_budget_still_produces_result() {
        let (service, layout) = service().await;
        let service = service.with_search_settings(SearchSettings {
            max_unchecked: 1,
            ..SearchSettings::default()
        });
        for number in 1..=layout.page_count() {
            service
                .open_or_advance_page(
                    &session(),
                    TestId::new(1),
                    Some(first_answers(&layout, number)),
                )
                .await
                .unwrap();
        }

        let outcome = service.view_result(&session(), TestId::new(1)).await.unwrap();
        let view = match outcome {
            ResultOutcome::Result(view) => view,
            other => panic!("expected result, got {other:?}"),
        };
        // First answers weigh 3 + 3 + 2 + 2.
        assert_eq!(view.score, 10);
        assert_eq!(view.tier.label(), "Early bird");
        assert!(matches!(
            view.search,
            SearchStatus::BudgetExceeded(BudgetLimit::Unchecked { limit: 1, .. })
        ));
        assert!(view.better.is_none() && view.worse.is_none());
        assert_ne!(view.tier, ResolvedTier::BelowLowest);
        assert!(
            service
                .progress
                .get_progress(&session())
                .await
                .unwrap()
                .is_none()
        );
    }

    /// Serves the in-memory catalog but hides the pages of one test.
    struct MissingPages {
        inner: InMemoryRepository,
        broken: TestId,
    }

    #[async_trait::async_trait]
    impl CatalogRepository for MissingPages {
        async fn get_test(&self, id: TestId) -> Result<Test, StorageError> {
            self.inner.get_test(id).await
        }

        async fn list_tests(&self) -> Result<Vec<Test>, StorageError> {
            self.inner.list_tests().await
        }

        async fn pages(&self, test_id: TestId) -> Result<Vec<Page>, StorageError> {
            if test_id == self.broken {
                return Ok(Vec::new());
            }
            self.inner.pages(test_id).await
        }

        async fn questions(&self, page_id: PageId) -> Result<Vec<Question>, StorageError> {
            self.inner.questions(page_id).await
        }

        async fn answers(&self, question_id: QuestionId) -> Result<Vec<Answer>, StorageError> {
            self.inner.answers(question_id).await
        }

        async fn tiers(&self, test_id: TestId) -> Result<Vec<ResultTier>, StorageError> {
            self.inner.tiers(test_id).await
        }

        async fn answer(&self, id: AnswerId) -> Result<Answer, StorageError> {
            self.inner.answer(id).await
        }
    }

    #[tokio::test]
    async fn active_test_redirect_wins_over_broken_request() {
        let repo = InMemoryRepository::new();
        for id in [1, 2] {
            let (layout, tiers) =
                sample::morning_routine(TestId::new(id), "Morning", None).unwrap();
            repo.upsert_test(&layout, &tiers).await.unwrap();
        }
        let catalog = Arc::new(MissingPages {
            inner: repo.clone(),
            broken: TestId::new(2),
        });
        let service = TestFlowService::new(fixed_clock(), catalog, Arc::new(repo));

        service
            .start_or_resume(&session(), TestId::new(1))
            .await
            .unwrap();
        assert_eq!(
            service
                .start_or_resume(&session(), TestId::new(2))
                .await
                .unwrap(),
            FlowEffect::Redirect(Redirect::Test(TestId::new(1)))
        );
        assert_eq!(
            service
                .open_or_advance_page(&session(), TestId::new(2), None)
                .await
                .unwrap(),
            PageOutcome::Redirect(Redirect::Test(TestId::new(1)))
        );

        service.give_up(&session()).await.unwrap();
        let err = service
            .start_or_resume(&session(), TestId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
    }
}
