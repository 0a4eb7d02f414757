//! Database query functions for the `artifacts` table.
//!
//! Status transitions are compare-and-set: every UPDATE is guarded by the
//! expected prior status, so a lost race affects zero rows instead of
//! overwriting a concurrent writer's terminal state.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Artifact;

/// Insert a new artifact row in `pending` status. Returns the inserted row.
///
/// Fails with a unique violation if the (plan, key) pair already exists.
pub async fn insert_artifact(pool: &PgPool, plan_id: Uuid, artifact_key: &str) -> Result<Artifact> {
    let artifact = sqlx::query_as::<_, Artifact>(
        "INSERT INTO artifacts (plan_id, artifact_key) VALUES ($1, $2) RETURNING *",
    )
    .bind(plan_id)
    .bind(artifact_key)
    .fetch_one(pool)
    .await
    .context("failed to insert artifact")?;

    Ok(artifact)
}

/// Insert an artifact row in `pending` status if the (plan, key) pair does
/// not already exist.
///
/// Uses `ON CONFLICT DO NOTHING` so this is idempotent; used by the repair
/// path to fill in missing catalog kinds without duplicating state.
pub async fn ensure_artifact(pool: &PgPool, plan_id: Uuid, artifact_key: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO artifacts (plan_id, artifact_key) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(plan_id)
    .bind(artifact_key)
    .execute(pool)
    .await
    .context("failed to ensure artifact")?;

    Ok(())
}

/// Fetch a single artifact by ID.
pub async fn get_artifact(pool: &PgPool, id: Uuid) -> Result<Option<Artifact>> {
    let artifact = sqlx::query_as::<_, Artifact>("SELECT * FROM artifacts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch artifact")?;

    Ok(artifact)
}

/// List all artifacts for a plan.
///
/// Ordered by artifact key so consecutive reads with no intervening write
/// return rows in the same order.
pub async fn list_artifacts_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<Artifact>> {
    let artifacts = sqlx::query_as::<_, Artifact>(
        "SELECT * FROM artifacts WHERE plan_id = $1 ORDER BY artifact_key ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list artifacts for plan")?;

    Ok(artifacts)
}

/// List the artifacts of a plan still in `pending` status.
pub async fn list_pending_artifacts(pool: &PgPool, plan_id: Uuid) -> Result<Vec<Artifact>> {
    let artifacts = sqlx::query_as::<_, Artifact>(
        "SELECT * FROM artifacts \
         WHERE plan_id = $1 AND status = 'pending' \
         ORDER BY artifact_key ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list pending artifacts")?;

    Ok(artifacts)
}

/// Claim an artifact for generation: `pending -> generating`.
///
/// Sets `generation_started_at` and clears any stale completion timestamp.
/// Returns the number of rows affected; 0 means another worker already
/// claimed the row (or it is not pending), which callers treat as "skip",
/// not as an error.
pub async fn begin_generation(pool: &PgPool, artifact_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE artifacts \
         SET status = 'generating', \
             generation_started_at = now(), \
             completed_at = NULL \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(artifact_id)
    .execute(pool)
    .await
    .context("failed to begin artifact generation")?;

    Ok(result.rows_affected())
}

/// Finish an artifact successfully: `generating -> complete`.
///
/// Stores the generated content, clears any stale error detail, and stamps
/// `completed_at`. Returns rows affected (0 on a lost race).
pub async fn complete_artifact(pool: &PgPool, artifact_id: Uuid, content: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE artifacts \
         SET status = 'complete', \
             content = $1, \
             error_detail = NULL, \
             completed_at = now() \
         WHERE id = $2 AND status = 'generating'",
    )
    .bind(content)
    .bind(artifact_id)
    .execute(pool)
    .await
    .context("failed to complete artifact")?;

    Ok(result.rows_affected())
}

/// Finish an artifact with a failure: `generating -> error`.
///
/// Stores the failure detail, clears any stale content (the CHECK constraint
/// requires content to be NULL outside `complete`), and stamps
/// `completed_at`. Returns rows affected (0 on a lost race).
pub async fn fail_artifact(pool: &PgPool, artifact_id: Uuid, error_detail: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE artifacts \
         SET status = 'error', \
             content = NULL, \
             error_detail = $1, \
             completed_at = now() \
         WHERE id = $2 AND status = 'generating'",
    )
    .bind(error_detail)
    .bind(artifact_id)
    .execute(pool)
    .await
    .context("failed to record artifact failure")?;

    Ok(result.rows_affected())
}

/// Reset a single terminal artifact back to `pending`, clearing stale
/// content, error detail, and timestamps. Used for per-artifact regeneration.
pub async fn requeue_artifact(pool: &PgPool, artifact_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE artifacts \
         SET status = 'pending', \
             content = NULL, \
             error_detail = NULL, \
             generation_started_at = NULL, \
             completed_at = NULL \
         WHERE id = $1 AND status IN ('complete', 'error')",
    )
    .bind(artifact_id)
    .execute(pool)
    .await
    .context("failed to requeue artifact")?;

    Ok(result.rows_affected())
}

/// Reset every terminal artifact of a plan back to `pending`.
///
/// This is the force-regenerate path. Returns the reset rows.
pub async fn requeue_terminal_artifacts(pool: &PgPool, plan_id: Uuid) -> Result<Vec<Artifact>> {
    let artifacts = sqlx::query_as::<_, Artifact>(
        "UPDATE artifacts \
         SET status = 'pending', \
             content = NULL, \
             error_detail = NULL, \
             generation_started_at = NULL, \
             completed_at = NULL \
         WHERE plan_id = $1 AND status IN ('complete', 'error') \
         RETURNING *",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to requeue terminal artifacts")?;

    Ok(artifacts)
}

/// Reset artifacts stuck in `generating` longer than `stuck_after_secs` back
/// to `pending`.
///
/// A row left in `generating` past the external-call timeout means a worker
/// crashed mid-generation. Returns the reset rows so callers can log them.
pub async fn reset_stuck_artifacts(
    pool: &PgPool,
    plan_id: Uuid,
    stuck_after_secs: f64,
) -> Result<Vec<Artifact>> {
    let artifacts = sqlx::query_as::<_, Artifact>(
        "UPDATE artifacts \
         SET status = 'pending', \
             generation_started_at = NULL, \
             completed_at = NULL \
         WHERE plan_id = $1 \
           AND status = 'generating' \
           AND generation_started_at < now() - make_interval(secs => $2) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(stuck_after_secs)
    .fetch_all(pool)
    .await
    .context("failed to reset stuck artifacts")?;

    Ok(artifacts)
}

/// Status counts for a plan's artifacts.
#[derive(Debug, Clone, Default)]
pub struct ArtifactProgress {
    pub pending: i64,
    pub generating: i64,
    pub complete: i64,
    pub error: i64,
    pub total: i64,
}

impl ArtifactProgress {
    /// Whether every artifact has reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.pending == 0 && self.generating == 0
    }
}

/// Get a summary of artifact counts by status for a given plan.
pub async fn get_artifact_progress(pool: &PgPool, plan_id: Uuid) -> Result<ArtifactProgress> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status::text, COUNT(*) as cnt \
         FROM artifacts \
         WHERE plan_id = $1 \
         GROUP BY status",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to get artifact progress")?;

    let mut progress = ArtifactProgress::default();
    for (status, count) in &rows {
        match status.as_str() {
            "pending" => progress.pending = *count,
            "generating" => progress.generating = *count,
            "complete" => progress.complete = *count,
            "error" => progress.error = *count,
            _ => {}
        }
        progress.total += count;
    }
    Ok(progress)
}
