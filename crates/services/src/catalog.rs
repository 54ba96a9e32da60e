//! Assembles validated test snapshots from catalog rows.

use quiz_core::model::{PageLayout, QuestionLayout, Test, TestId, TestLayout};
use quiz_core::resolver::TierLadder;
use storage::repository::{CatalogRepository, StorageError};

use crate::error::FlowError;

/// Fetch a test, mapping a missing row to `FlowError::NotFound`.
///
/// # Errors
///
/// Returns `FlowError::NotFound` or the underlying storage error.
pub async fn load_test(catalog: &dyn CatalogRepository, id: TestId) -> Result<Test, FlowError> {
    match catalog.get_test(id).await {
        Ok(test) => Ok(test),
        Err(StorageError::NotFound) => Err(FlowError::NotFound(id)),
        Err(err) => Err(err.into()),
    }
}

/// Load every page, question and answer of `test` into a `TestLayout`.
///
/// # Errors
///
/// Returns `FlowError::Configuration` if the test has no pages, an empty page
/// or a question without answers.
pub async fn load_layout(
    catalog: &dyn CatalogRepository,
    test: Test,
) -> Result<TestLayout, FlowError> {
    let pages = catalog.pages(test.id()).await?;
    let mut layouts = Vec::with_capacity(pages.len());
    for page in pages {
        let questions = catalog.questions(page.id()).await?;
        let mut question_layouts = Vec::with_capacity(questions.len());
        for question in questions {
            let answers = catalog.answers(question.id()).await?;
            question_layouts.push(QuestionLayout { question, answers });
        }
        layouts.push(PageLayout {
            page,
            questions: question_layouts,
        });
    }
    Ok(TestLayout::new(test, layouts)?)
}

/// Load and validate the result tiers of a test.
///
/// # Errors
///
/// Returns `FlowError::Configuration` when two tiers share a threshold.
pub async fn load_ladder(
    catalog: &dyn CatalogRepository,
    test_id: TestId,
) -> Result<TierLadder, FlowError> {
    let tiers = catalog.tiers(test_id).await?;
    Ok(TierLadder::new(test_id, tiers)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use quiz_core::model::{
        Answer, AnswerId, LayoutError, Page, PageId, Question, QuestionId, ResultTier, TierError,
        TierId,
    };
    use storage::repository::{CatalogWriter, InMemoryRepository};
    use storage::sample;

    #[tokio::test]
    async fn loads_sample_test() {
        let repo = InMemoryRepository::new();
        let (layout, tiers) = sample::morning_routine(TestId::new(1), "Morning", None).unwrap();
        repo.upsert_test(&layout, &tiers).await.unwrap();

        let test = load_test(&repo, TestId::new(1)).await.unwrap();
        let loaded = load_layout(&repo, test).await.unwrap();
        assert_eq!(loaded, layout);

        let ladder = load_ladder(&repo, TestId::new(1)).await.unwrap();
        assert_eq!(ladder.tiers().len(), 3);
    }

    #[tokio::test]
    async fn unknown_test_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = load_test(&repo, TestId::new(9)).await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound(id) if id == TestId::new(9)));
    }

    #[tokio::test]
    async fn test_without_pages_is_misconfigured() {
        let repo = InMemoryRepository::new();
        let test = Test::new(TestId::new(3), "Empty", None).unwrap();
        let err = load_layout(&repo, test).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Configuration(ConfigurationError::Layout(LayoutError::NoPages(id)))
                if id == TestId::new(3)
        ));
    }

    /// Ladder validation runs on whatever a store hands back, so a store
    /// that does not check thresholds is still caught here.
    struct DuplicateTiers;

    #[async_trait::async_trait]
    impl CatalogRepository for DuplicateTiers {
        async fn get_test(&self, _id: TestId) -> Result<Test, StorageError> {
            Err(StorageError::NotFound)
        }
        async fn list_tests(&self) -> Result<Vec<Test>, StorageError> {
            Ok(Vec::new())
        }
        async fn pages(&self, _test_id: TestId) -> Result<Vec<Page>, StorageError> {
            Ok(Vec::new())
        }
        async fn questions(&self, _page_id: PageId) -> Result<Vec<Question>, StorageError> {
            Ok(Vec::new())
        }
        async fn answers(&self, _question_id: QuestionId) -> Result<Vec<Answer>, StorageError> {
            Ok(Vec::new())
        }
        async fn tiers(&self, test_id: TestId) -> Result<Vec<ResultTier>, StorageError> {
            Ok(vec![
                ResultTier::new(TierId::new(1), test_id, "A", 5).unwrap(),
                ResultTier::new(TierId::new(2), test_id, "B", 5).unwrap(),
            ])
        }
        async fn answer(&self, _id: AnswerId) -> Result<Answer, StorageError> {
            Err(StorageError::NotFound)
        }
    }

    #[tokio::test]
    async fn duplicate_thresholds_are_misconfiguration() {
        let err = load_ladder(&DuplicateTiers, TestId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Configuration(ConfigurationError::Tiers(
                TierError::DuplicateThreshold { threshold: 5, .. }
            ))
        ));
    }
}
