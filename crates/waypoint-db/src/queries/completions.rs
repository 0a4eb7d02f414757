//! Database query functions for the `completion_records` table.
//!
//! Writes are monotonic: [`mark_stage`] only ever raises a flag. There is no
//! query that sets a completion flag back to false.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CompletionRecord, CompletionStage};

/// Fetch the completion record for a user, if one exists.
pub async fn get_completion_record(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<CompletionRecord>> {
    let record = sqlx::query_as::<_, CompletionRecord>(
        "SELECT * FROM completion_records WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch completion record")?;

    Ok(record)
}

/// Fetch the completion record for a user, creating an all-false row on first
/// interaction.
pub async fn ensure_completion_record(pool: &PgPool, user_id: Uuid) -> Result<CompletionRecord> {
    sqlx::query(
        "INSERT INTO completion_records (user_id) VALUES ($1) \
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .execute(pool)
    .await
    .context("failed to ensure completion record")?;

    let record = get_completion_record(pool, user_id)
        .await?
        .context("completion record missing after ensure")?;

    Ok(record)
}

/// Raise one completion flag for a user, creating the record if absent.
///
/// Monotonic by construction: the column is set to TRUE unconditionally, so a
/// repeated mark is a no-op and nothing ever lowers a flag.
pub async fn mark_stage(
    pool: &PgPool,
    user_id: Uuid,
    stage: CompletionStage,
) -> Result<CompletionRecord> {
    // The column name comes from the CompletionStage enum, never from user
    // input, so formatting it into the statement is safe.
    let column = stage.column();
    let stmt = format!(
        "INSERT INTO completion_records (user_id, {column}) VALUES ($1, TRUE) \
         ON CONFLICT (user_id) \
         DO UPDATE SET {column} = TRUE, updated_at = now() \
         RETURNING *"
    );

    let record = sqlx::query_as::<_, CompletionRecord>(&stmt)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to mark stage {stage} for user {user_id}"))?;

    Ok(record)
}
