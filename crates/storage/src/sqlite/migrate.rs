use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS tests (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS pages (
            id INTEGER PRIMARY KEY,
            test_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position > 0),
            FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            page_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS answers (
            id INTEGER PRIMARY KEY,
            question_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            weight INTEGER NOT NULL,
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS result_tiers (
            id INTEGER PRIMARY KEY,
            test_id INTEGER NOT NULL,
            label TEXT NOT NULL,
            threshold INTEGER NOT NULL,
            FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS progress (
            session_key TEXT PRIMARY KEY,
            status TEXT NOT NULL CHECK (status IN ('not_started', 'active', 'finished')),
            test_id INTEGER NOT NULL,
            current_page INTEGER NOT NULL CHECK (current_page > 0),
            page_count INTEGER NOT NULL CHECK (page_count > 0),
            answers TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_pages_test_position
            ON pages(test_id, position, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_page
            ON questions(page_id, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_answers_question
            ON answers(question_id, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_result_tiers_test_threshold
            ON result_tiers(test_id, threshold);
    ",
];

/// Runs the schema migrations that have not been applied yet.
///
/// Version 1 creates the catalog (tests, pages, questions, answers, result
/// tiers) and the per-session progress table.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
