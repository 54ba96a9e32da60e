use chrono::{DateTime, Utc};
use quiz_core::model::{
    Answer, AnswerId, Page, PageId, ProgressStatus, Question, QuestionId, ResultTier, Test,
    TestId, TierId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{ProgressRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn get_i64(row: &SqliteRow, column: &str) -> Result<i64, StorageError> {
    row.try_get::<i64, _>(column).map_err(ser)
}

pub(crate) fn map_test_row(row: &SqliteRow) -> Result<Test, StorageError> {
    Test::new(
        TestId::new(i64_to_u64("test_id", get_i64(row, "id")?)?),
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<Option<String>, _>("description")
            .map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_page_row(row: &SqliteRow) -> Result<Page, StorageError> {
    Page::new(
        PageId::new(i64_to_u64("page_id", get_i64(row, "id")?)?),
        TestId::new(i64_to_u64("test_id", get_i64(row, "test_id")?)?),
        u32_from_i64("position", get_i64(row, "position")?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    Question::new(
        QuestionId::new(i64_to_u64("question_id", get_i64(row, "id")?)?),
        PageId::new(i64_to_u64("page_id", get_i64(row, "page_id")?)?),
        row.try_get::<String, _>("text").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_answer_row(row: &SqliteRow) -> Result<Answer, StorageError> {
    Answer::new(
        AnswerId::new(i64_to_u64("answer_id", get_i64(row, "id")?)?),
        QuestionId::new(i64_to_u64("question_id", get_i64(row, "question_id")?)?),
        row.try_get::<String, _>("text").map_err(ser)?,
        get_i64(row, "weight")?,
    )
    .map_err(ser)
}

pub(crate) fn map_tier_row(row: &SqliteRow) -> Result<ResultTier, StorageError> {
    ResultTier::new(
        TierId::new(i64_to_u64("tier_id", get_i64(row, "id")?)?),
        TestId::new(i64_to_u64("test_id", get_i64(row, "test_id")?)?),
        row.try_get::<String, _>("label").map_err(ser)?,
        get_i64(row, "threshold")?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let started_at: DateTime<Utc> = row.try_get("started_at").map_err(ser)?;
    Ok(ProgressRecord {
        status: ProgressStatus::parse(&status).map_err(ser)?,
        test_id: TestId::new(i64_to_u64("test_id", get_i64(row, "test_id")?)?),
        current_page: u32_from_i64("current_page", get_i64(row, "current_page")?)?,
        page_count: u32_from_i64("page_count", get_i64(row, "page_count")?)?,
        answers_json: row.try_get("answers").map_err(ser)?,
        started_at,
        finished_at: row.try_get("finished_at").map_err(ser)?,
    })
}
