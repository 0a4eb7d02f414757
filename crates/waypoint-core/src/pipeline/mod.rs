//! Artifact generation pipeline: idempotent plan creation and the
//! generation runner.
//!
//! [`ensure_artifacts`] owns the check-then-create step (plan row plus one
//! artifact row per catalog kind, all-or-nothing) and its re-entry semantics:
//! repeated calls converge on the same plan, concurrent calls are resolved at
//! the unique-constraint level, and force-regenerate resets terminal rows.
//! The runner in [`runner`] then drives each pending artifact to a terminal
//! status independently.

pub mod runner;

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use waypoint_db::models::{CompletionStage, Plan};
use waypoint_db::queries::{artifacts, completions, plans};

use crate::generator::ArtifactKind;
use crate::watchdog;

pub use runner::{generate_artifact, run_generation, ArtifactOutcome, GenerationSummary};

/// Tunables for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of artifacts generated concurrently per plan.
    pub max_concurrent: usize,
    /// Wall time limit for one external generator call.
    pub generation_timeout: Duration,
    /// Age past which a `generating` row counts as stuck (worker crashed
    /// mid-call) and is eligible for a watchdog reset.
    pub stuck_after: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let generation_timeout = Duration::from_secs(120);
        Self {
            max_concurrent: 4,
            generation_timeout,
            // A row older than twice the call timeout cannot still be making
            // progress.
            stuck_after: generation_timeout * 2,
        }
    }
}

/// Result of an `ensure_artifacts` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureOutcome {
    pub plan_id: Uuid,
    /// Whether this call created the plan (false when it already existed).
    pub created: bool,
    /// Keys of the plan's artifacts, in catalog order.
    pub artifact_keys: Vec<String>,
}

/// Error from `ensure_artifacts`.
///
/// `NotReady` is retryable: the prerequisite upstream state (a completed
/// interview) does not exist yet, so the caller should back off and retry
/// rather than treat this as a hard failure.
#[derive(Debug, Error)]
pub enum EnsureError {
    #[error("user {0} has not completed the interview; plan generation is not ready")]
    NotReady(Uuid),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Ensure the user has a plan with a full artifact set.
///
/// - No plan: creates the plan row and one `pending` artifact per catalog
///   kind in a single transaction, then raises the `has_plan` flag.
/// - Existing plan, `force_regenerate` false: returns it unchanged apart
///   from a watchdog pass over stuck rows (and filling in any catalog kind
///   missing after a partial manual repair).
/// - Existing plan, `force_regenerate` true: additionally resets terminal
///   artifacts to `pending`, clearing stale content and error detail.
/// - Lost creation race: the unique violation is swallowed, the winner's
///   plan is re-read and returned with `created = false`.
pub async fn ensure_artifacts(
    pool: &PgPool,
    user_id: Uuid,
    force_regenerate: bool,
    config: &PipelineConfig,
) -> Result<EnsureOutcome, EnsureError> {
    let record = completions::get_completion_record(pool, user_id)
        .await
        .map_err(EnsureError::Other)?;
    if !record.is_some_and(|r| r.interview_complete) {
        return Err(EnsureError::NotReady(user_id));
    }

    if let Some(plan) = plans::get_plan_for_user(pool, user_id)
        .await
        .map_err(EnsureError::Other)?
    {
        return reconcile_existing(pool, &plan, force_regenerate, config)
            .await
            .map_err(EnsureError::Other);
    }

    match create_plan_with_artifacts(pool, user_id).await {
        Ok(outcome) => {
            // Eventually consistent with plan existence; raised only after
            // the creation transaction committed.
            completions::mark_stage(pool, user_id, CompletionStage::Plan)
                .await
                .map_err(EnsureError::Other)?;
            tracing::info!(user_id = %user_id, plan_id = %outcome.plan_id, "plan created");
            Ok(outcome)
        }
        Err(e) if is_unique_violation(&e) => {
            // Another request created the plan between our check and insert.
            // Converge on the winner's rows instead of surfacing an error.
            tracing::info!(user_id = %user_id, "lost plan creation race, reusing existing plan");
            let plan = plans::get_plan_for_user(pool, user_id)
                .await
                .map_err(EnsureError::Other)?
                .context("plan missing after unique violation")
                .map_err(EnsureError::Other)?;
            reconcile_existing(pool, &plan, force_regenerate, config)
                .await
                .map_err(EnsureError::Other)
        }
        Err(e) => Err(EnsureError::Other(
            anyhow::Error::new(e).context("failed to create plan with artifacts"),
        )),
    }
}

/// Create the plan row and all catalog artifacts in one transaction.
///
/// Either every row exists afterwards or none do; a partial artifact set is
/// never observable. Returns the raw `sqlx::Error` so the caller can detect
/// the unique-violation race.
async fn create_plan_with_artifacts(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<EnsureOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let plan = sqlx::query_as::<_, Plan>("INSERT INTO plans (user_id) VALUES ($1) RETURNING *")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    let mut artifact_keys = Vec::with_capacity(ArtifactKind::ALL.len());
    for kind in ArtifactKind::ALL {
        sqlx::query("INSERT INTO artifacts (plan_id, artifact_key) VALUES ($1, $2)")
            .bind(plan.id)
            .bind(kind.key())
            .execute(&mut *tx)
            .await?;
        artifact_keys.push(kind.key().to_owned());
    }

    tx.commit().await?;

    Ok(EnsureOutcome {
        plan_id: plan.id,
        created: true,
        artifact_keys,
    })
}

/// Bring an existing plan back to a generatable state.
async fn reconcile_existing(
    pool: &PgPool,
    plan: &Plan,
    force_regenerate: bool,
    config: &PipelineConfig,
) -> Result<EnsureOutcome> {
    watchdog::reset_stuck_artifacts(pool, plan.id, config.stuck_after).await?;

    if force_regenerate {
        let reset = artifacts::requeue_terminal_artifacts(pool, plan.id).await?;
        if !reset.is_empty() {
            tracing::info!(
                plan_id = %plan.id,
                count = reset.len(),
                "requeued terminal artifacts for regeneration"
            );
        }
    }

    // Fill in any catalog kind that is missing (e.g. after a partial manual
    // cleanup). Idempotent: existing rows are untouched.
    for kind in ArtifactKind::ALL {
        artifacts::ensure_artifact(pool, plan.id, kind.key()).await?;
    }

    let artifact_keys = ArtifactKind::ALL
        .iter()
        .map(|kind| kind.key().to_owned())
        .collect();

    Ok(EnsureOutcome {
        plan_id: plan.id,
        created: false,
        artifact_keys,
    })
}

/// Whether a sqlx error is a PostgreSQL unique violation (SQLSTATE 23505).
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
