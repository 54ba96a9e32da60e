use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    Answer, AnswerId, AnswerSheet, Page, PageId, Progress, ProgressStatus, Question, QuestionId,
    ResultTier, SessionKey, Test, TestId, TestLayout, TierId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape of a progress record.
///
/// Answers travel as a JSON object (question id → answer ids) so a store can
/// keep the whole record in one row, cookie or blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub status: ProgressStatus,
    pub test_id: TestId,
    pub current_page: u32,
    pub page_count: u32,
    pub answers_json: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the answers cannot be encoded.
    pub fn from_progress(progress: &Progress) -> Result<Self, StorageError> {
        let answers_json = serde_json::to_string(progress.answers())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Self {
            status: progress.status(),
            test_id: progress.test_id(),
            current_page: progress.current_page(),
            page_count: progress.page_count(),
            answers_json,
            started_at: progress.started_at(),
            finished_at: progress.finished_at(),
        })
    }

    /// Convert the record back into domain `Progress`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the answers JSON is malformed
    /// or the record violates progress invariants.
    pub fn into_progress(self) -> Result<Progress, StorageError> {
        let answers: AnswerSheet = serde_json::from_str(&self.answers_json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Progress::from_persisted(
            self.status,
            self.test_id,
            self.current_page,
            self.page_count,
            answers,
            self.started_at,
            self.finished_at,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Read-only view of authored tests.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Fetch a test by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_test(&self, id: TestId) -> Result<Test, StorageError>;

    /// All tests ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the listing cannot be read.
    async fn list_tests(&self) -> Result<Vec<Test>, StorageError>;

    /// Pages of a test in flow order (position, then id).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn pages(&self, test_id: TestId) -> Result<Vec<Page>, StorageError>;

    /// Questions of a page ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn questions(&self, page_id: PageId) -> Result<Vec<Question>, StorageError>;

    /// Answers of a question ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn answers(&self, question_id: QuestionId) -> Result<Vec<Answer>, StorageError>;

    /// Result tiers of a test ordered by threshold.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn tiers(&self, test_id: TestId) -> Result<Vec<ResultTier>, StorageError>;

    /// Fetch a single answer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn answer(&self, id: AnswerId) -> Result<Answer, StorageError>;
}

/// Write side of the catalog, used by seeding and tests. Replaces the whole
/// test: its pages, questions, answers and tiers.
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the test cannot be stored.
    async fn upsert_test(&self, layout: &TestLayout, tiers: &[ResultTier])
    -> Result<(), StorageError>;
}

/// Per-session progress persistence.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read failures or undecodable records.
    async fn get_progress(&self, session: &SessionKey) -> Result<Option<Progress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    async fn put_progress(&self, session: &SessionKey, progress: &Progress)
    -> Result<(), StorageError>;

    /// Removing an absent record is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn delete_progress(&self, session: &SessionKey) -> Result<(), StorageError>;
}

#[derive(Default)]
struct CatalogTables {
    tests: BTreeMap<TestId, Test>,
    pages: BTreeMap<PageId, Page>,
    questions: BTreeMap<QuestionId, Question>,
    answers: BTreeMap<AnswerId, Answer>,
    tiers: BTreeMap<TierId, ResultTier>,
}

impl CatalogTables {
    fn page_owner(&self, id: PageId) -> Option<TestId> {
        self.pages.get(&id).map(Page::test_id)
    }

    fn question_owner(&self, id: QuestionId) -> Option<TestId> {
        self.questions
            .get(&id)
            .and_then(|q| self.page_owner(q.page_id()))
    }

    fn answer_owner(&self, id: AnswerId) -> Option<TestId> {
        self.answers
            .get(&id)
            .and_then(|a| self.question_owner(a.question_id()))
    }

    /// Rejects tiers of another test and ids already held by another test,
    /// mirroring the primary key failures of the SQLite adapter.
    fn check_upsert(
        &self,
        layout: &TestLayout,
        tiers: &[ResultTier],
    ) -> Result<(), StorageError> {
        let test_id = layout.test_id();
        let foreign = |owner: Option<TestId>| owner.is_some_and(|owner| owner != test_id);

        let mut tier_ids = BTreeSet::new();
        for tier in tiers {
            let owner = self.tiers.get(&tier.id()).map(ResultTier::test_id);
            if tier.test_id() != test_id || foreign(owner) || !tier_ids.insert(tier.id()) {
                return Err(StorageError::Conflict);
            }
        }
        for page in layout.pages() {
            if foreign(self.page_owner(page.page.id())) {
                return Err(StorageError::Conflict);
            }
            for question in &page.questions {
                if foreign(self.question_owner(question.question.id())) {
                    return Err(StorageError::Conflict);
                }
                if question
                    .answers
                    .iter()
                    .any(|a| foreign(self.answer_owner(a.id())))
                {
                    return Err(StorageError::Conflict);
                }
            }
        }
        Ok(())
    }

    fn remove_test(&mut self, test_id: TestId) {
        let pages: Vec<PageId> = self
            .pages
            .values()
            .filter(|p| p.test_id() == test_id)
            .map(Page::id)
            .collect();
        let questions: Vec<QuestionId> = self
            .questions
            .values()
            .filter(|q| pages.contains(&q.page_id()))
            .map(Question::id)
            .collect();
        self.answers
            .retain(|_, a| !questions.contains(&a.question_id()));
        self.questions.retain(|id, _| !questions.contains(id));
        self.pages.retain(|id, _| !pages.contains(id));
        self.tiers.retain(|_, t| t.test_id() != test_id);
        self.tests.remove(&test_id);
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    catalog: Arc<Mutex<CatalogTables>>,
    progress: Arc<Mutex<HashMap<SessionKey, ProgressRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_catalog<T>(
        &self,
        f: impl FnOnce(&mut CatalogTables) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self
            .catalog
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        f(&mut guard)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn get_test(&self, id: TestId) -> Result<Test, StorageError> {
        self.with_catalog(|c| c.tests.get(&id).cloned().ok_or(StorageError::NotFound))
    }

    async fn list_tests(&self) -> Result<Vec<Test>, StorageError> {
        self.with_catalog(|c| Ok(c.tests.values().cloned().collect()))
    }

    async fn pages(&self, test_id: TestId) -> Result<Vec<Page>, StorageError> {
        self.with_catalog(|c| {
            let mut pages: Vec<Page> = c
                .pages
                .values()
                .filter(|p| p.test_id() == test_id)
                .copied()
                .collect();
            pages.sort_by_key(Page::sort_key);
            Ok(pages)
        })
    }

    async fn questions(&self, page_id: PageId) -> Result<Vec<Question>, StorageError> {
        self.with_catalog(|c| {
            Ok(c.questions
                .values()
                .filter(|q| q.page_id() == page_id)
                .cloned()
                .collect())
        })
    }

    async fn answers(&self, question_id: QuestionId) -> Result<Vec<Answer>, StorageError> {
        self.with_catalog(|c| {
            Ok(c.answers
                .values()
                .filter(|a| a.question_id() == question_id)
                .cloned()
                .collect())
        })
    }

    async fn tiers(&self, test_id: TestId) -> Result<Vec<ResultTier>, StorageError> {
        self.with_catalog(|c| {
            let mut tiers: Vec<ResultTier> = c
                .tiers
                .values()
                .filter(|t| t.test_id() == test_id)
                .cloned()
                .collect();
            tiers.sort_by_key(|t| (t.threshold(), t.id()));
            Ok(tiers)
        })
    }

    async fn answer(&self, id: AnswerId) -> Result<Answer, StorageError> {
        self.with_catalog(|c| c.answers.get(&id).cloned().ok_or(StorageError::NotFound))
    }
}

#[async_trait]
impl CatalogWriter for InMemoryRepository {
    async fn upsert_test(
        &self,
        layout: &TestLayout,
        tiers: &[ResultTier],
    ) -> Result<(), StorageError> {
        self.with_catalog(|c| {
            c.check_upsert(layout, tiers)?;
            c.remove_test(layout.test_id());
            c.tests.insert(layout.test_id(), layout.test().clone());
            for page in layout.pages() {
                c.pages.insert(page.page.id(), page.page);
                for question in &page.questions {
                    c.questions
                        .insert(question.question.id(), question.question.clone());
                    for answer in &question.answers {
                        c.answers.insert(answer.id(), answer.clone());
                    }
                }
            }
            for tier in tiers {
                c.tiers.insert(tier.id(), tier.clone());
            }
            Ok(())
        })
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(&self, session: &SessionKey) -> Result<Option<Progress>, StorageError> {
        let record = {
            let guard = self
                .progress
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.get(session).cloned()
        };
        record.map(ProgressRecord::into_progress).transpose()
    }

    async fn put_progress(
        &self,
        session: &SessionKey,
        progress: &Progress,
    ) -> Result<(), StorageError> {
        let record = ProgressRecord::from_progress(progress)?;
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(session.clone(), record);
        Ok(())
    }

    async fn delete_progress(&self, session: &SessionKey) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(session);
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub catalog_writer: Arc<dyn CatalogWriter>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let catalog_writer: Arc<dyn CatalogWriter> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self {
            catalog,
            catalog_writer,
            progress,
        }
    }
}
