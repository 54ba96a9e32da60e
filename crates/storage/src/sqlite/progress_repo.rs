use chrono::Utc;
use quiz_core::model::{Progress, SessionKey};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_progress_row};
use crate::repository::{ProgressRecord, ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(&self, session: &SessionKey) -> Result<Option<Progress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT status, test_id, current_page, page_count, answers, started_at, finished_at
            FROM progress
            WHERE session_key = ?1
            ",
        )
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|row| map_progress_row(&row).and_then(ProgressRecord::into_progress))
            .transpose()
    }

    async fn put_progress(
        &self,
        session: &SessionKey,
        progress: &Progress,
    ) -> Result<(), StorageError> {
        let record = ProgressRecord::from_progress(progress)?;

        sqlx::query(
            r"
            INSERT INTO progress (
                session_key, status, test_id, current_page, page_count,
                answers, started_at, finished_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(session_key) DO UPDATE SET
                status = excluded.status,
                test_id = excluded.test_id,
                current_page = excluded.current_page,
                page_count = excluded.page_count,
                answers = excluded.answers,
                started_at = excluded.started_at,
                finished_at = excluded.finished_at,
                updated_at = excluded.updated_at
            ",
        )
        .bind(session.as_str())
        .bind(record.status.as_str())
        .bind(id_to_i64("test_id", record.test_id.value())?)
        .bind(i64::from(record.current_page))
        .bind(i64::from(record.page_count))
        .bind(record.answers_json)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn delete_progress(&self, session: &SessionKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM progress WHERE session_key = ?1")
            .bind(session.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
