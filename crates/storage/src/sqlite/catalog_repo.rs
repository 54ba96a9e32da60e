use quiz_core::model::{
    Answer, AnswerId, Page, PageId, Question, QuestionId, ResultTier, Test, TestId, TestLayout,
};
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    conn, id_to_i64, map_answer_row, map_page_row, map_question_row, map_test_row, map_tier_row,
};
use crate::repository::{CatalogRepository, CatalogWriter, StorageError};

fn map_rows<T>(
    rows: &[SqliteRow],
    map: impl Fn(&SqliteRow) -> Result<T, StorageError>,
) -> Result<Vec<T>, StorageError> {
    rows.iter().map(map).collect()
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn get_test(&self, id: TestId) -> Result<Test, StorageError> {
        let row = sqlx::query("SELECT id, name, description FROM tests WHERE id = ?1")
            .bind(id_to_i64("test_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => map_test_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn list_tests(&self) -> Result<Vec<Test>, StorageError> {
        let rows = sqlx::query("SELECT id, name, description FROM tests ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        map_rows(&rows, map_test_row)
    }

    async fn pages(&self, test_id: TestId) -> Result<Vec<Page>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, test_id, position
            FROM pages
            WHERE test_id = ?1
            ORDER BY position ASC, id ASC
            ",
        )
        .bind(id_to_i64("test_id", test_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        map_rows(&rows, map_page_row)
    }

    async fn questions(&self, page_id: PageId) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, page_id, text FROM questions WHERE page_id = ?1 ORDER BY id ASC",
        )
        .bind(id_to_i64("page_id", page_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        map_rows(&rows, map_question_row)
    }

    async fn answers(&self, question_id: QuestionId) -> Result<Vec<Answer>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, question_id, text, weight
            FROM answers
            WHERE question_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(id_to_i64("question_id", question_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        map_rows(&rows, map_answer_row)
    }

    async fn tiers(&self, test_id: TestId) -> Result<Vec<ResultTier>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, test_id, label, threshold
            FROM result_tiers
            WHERE test_id = ?1
            ORDER BY threshold ASC, id ASC
            ",
        )
        .bind(id_to_i64("test_id", test_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        map_rows(&rows, map_tier_row)
    }

    async fn answer(&self, id: AnswerId) -> Result<Answer, StorageError> {
        let row = sqlx::query("SELECT id, question_id, text, weight FROM answers WHERE id = ?1")
            .bind(id_to_i64("answer_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            Some(row) => map_answer_row(&row),
            None => Err(StorageError::NotFound),
        }
    }
}

#[async_trait::async_trait]
impl CatalogWriter for SqliteRepository {
    async fn upsert_test(
        &self,
        layout: &TestLayout,
        tiers: &[ResultTier],
    ) -> Result<(), StorageError> {
        let test = layout.test();
        if tiers.iter().any(|tier| tier.test_id() != test.id()) {
            return Err(StorageError::Conflict);
        }
        let test_id = id_to_i64("test_id", test.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO tests (id, name, description)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description
            ",
        )
        .bind(test_id)
        .bind(test.name())
        .bind(test.description())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Children are replaced wholesale; cascades clear questions and answers.
        sqlx::query("DELETE FROM pages WHERE test_id = ?1")
            .bind(test_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        sqlx::query("DELETE FROM result_tiers WHERE test_id = ?1")
            .bind(test_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for page in layout.pages() {
            let page_id = id_to_i64("page_id", page.page.id().value())?;
            sqlx::query("INSERT INTO pages (id, test_id, position) VALUES (?1, ?2, ?3)")
                .bind(page_id)
                .bind(test_id)
                .bind(i64::from(page.page.position()))
                .execute(&mut *tx)
                .await
                .map_err(|_| StorageError::Conflict)?;

            for question in &page.questions {
                let question_id = id_to_i64("question_id", question.question.id().value())?;
                sqlx::query("INSERT INTO questions (id, page_id, text) VALUES (?1, ?2, ?3)")
                    .bind(question_id)
                    .bind(page_id)
                    .bind(question.question.text())
                    .execute(&mut *tx)
                    .await
                    .map_err(|_| StorageError::Conflict)?;

                for answer in &question.answers {
                    sqlx::query(
                        r"
                        INSERT INTO answers (id, question_id, text, weight)
                        VALUES (?1, ?2, ?3, ?4)
                        ",
                    )
                    .bind(id_to_i64("answer_id", answer.id().value())?)
                    .bind(question_id)
                    .bind(answer.text())
                    .bind(answer.weight())
                    .execute(&mut *tx)
                    .await
                    .map_err(|_| StorageError::Conflict)?;
                }
            }
        }

        for tier in tiers {
            sqlx::query(
                r"
                INSERT INTO result_tiers (id, test_id, label, threshold)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id_to_i64("tier_id", tier.id().value())?)
            .bind(test_id)
            .bind(tier.label())
            .bind(tier.threshold())
            .execute(&mut *tx)
            .await
            .map_err(|_| StorageError::Conflict)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
