use std::sync::Arc;

use quiz_core::model::TestId;
use storage::repository::{CatalogRepository, CatalogWriter, Storage};
use storage::sample;
use tracing::info;

use crate::Clock;
use crate::config::SearchSettings;
use crate::error::AppServicesError;
use crate::flow_service::TestFlowService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    seeded_sample: bool,
    catalog_writer: Arc<dyn CatalogWriter>,
    flow: Arc<TestFlowService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage. An empty catalog receives
    /// the bundled sample test.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or seeding fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        search: SearchSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(storage, clock, search).await
    }

    /// Same as `new_sqlite` over the in-memory repository.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if seeding fails.
    pub async fn in_memory(clock: Clock, search: SearchSettings) -> Result<Self, AppServicesError> {
        Self::from_storage(Storage::in_memory(), clock, search).await
    }

    async fn from_storage(
        storage: Storage,
        clock: Clock,
        search: SearchSettings,
    ) -> Result<Self, AppServicesError> {
        let seeded_sample =
            ensure_catalog(storage.catalog.as_ref(), storage.catalog_writer.as_ref()).await?;
        let flow = Arc::new(
            TestFlowService::new(
                clock,
                Arc::clone(&storage.catalog),
                Arc::clone(&storage.progress),
            )
            .with_search_settings(search),
        );
        Ok(Self {
            seeded_sample,
            catalog_writer: storage.catalog_writer,
            flow,
        })
    }

    /// Whether the sample test was inserted during startup.
    #[must_use]
    pub fn seeded_sample(&self) -> bool {
        self.seeded_sample
    }

    #[must_use]
    pub fn flow(&self) -> Arc<TestFlowService> {
        Arc::clone(&self.flow)
    }

    #[must_use]
    pub fn catalog_writer(&self) -> Arc<dyn CatalogWriter> {
        Arc::clone(&self.catalog_writer)
    }
}

async fn ensure_catalog(
    catalog: &dyn CatalogRepository,
    writer: &dyn CatalogWriter,
) -> Result<bool, AppServicesError> {
    if !catalog.list_tests().await?.is_empty() {
        return Ok(false);
    }

    let (layout, tiers) = sample::morning_routine(TestId::new(1), "Morning routine", None)?;
    writer.upsert_test(&layout, &tiers).await?;
    info!(test_id = %layout.test_id(), "seeded sample test into empty catalog");
    Ok(true)
}
