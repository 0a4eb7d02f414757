//! Generation runner: drives every pending artifact of a plan to a terminal
//! status.
//!
//! Artifacts are generated concurrently up to a configurable limit. Each one
//! is claimed with a compare-and-set `pending -> generating`, run through the
//! external generator under a timeout, and resolved to `complete` or `error`.
//! Failure of one artifact never blocks or rolls back its siblings.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use waypoint_db::models::Artifact;
use waypoint_db::queries::{artifacts, plans};

use crate::generator::{ArtifactKind, ContentGenerator, GenerationRequest};

use super::PipelineConfig;

/// Terminal outcome of a single artifact's generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Content stored, artifact is `complete`.
    Completed,
    /// Failure detail stored, artifact is `error`.
    Failed,
    /// Another worker claimed the row first; nothing was done.
    Skipped,
}

/// Counts of artifact outcomes from one runner invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Message sent from spawned generation tasks back to the runner loop.
struct GenerationDone {
    artifact_key: String,
    outcome: Result<ArtifactOutcome>,
}

/// Generate every pending artifact of a plan.
///
/// Spawns one task per pending artifact, bounded by a semaphore. The
/// cancellation token stops new work from being claimed; in-flight artifacts
/// still run to their terminal status (a claimed-then-abandoned row would be
/// a stuck row, which is exactly what the watchdog exists to flag).
pub async fn run_generation(
    pool: &PgPool,
    generator: Arc<dyn ContentGenerator>,
    plan_id: Uuid,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<GenerationSummary> {
    let plan = plans::get_plan(pool, plan_id)
        .await?
        .with_context(|| format!("plan {plan_id} not found"))?;

    let pending = artifacts::list_pending_artifacts(pool, plan_id).await?;
    if pending.is_empty() {
        return Ok(GenerationSummary::default());
    }

    tracing::info!(
        plan_id = %plan_id,
        count = pending.len(),
        generator = generator.name(),
        "starting artifact generation"
    );

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
    let (tx, mut rx) = mpsc::channel::<GenerationDone>(pending.len());
    let mut summary = GenerationSummary::default();
    let mut in_flight: usize = 0;

    for artifact in pending {
        if cancel.is_cancelled() {
            tracing::info!(plan_id = %plan_id, "generation cancelled, not claiming further artifacts");
            summary.skipped += 1;
            continue;
        }

        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit?,
            _ = cancel.cancelled() => {
                summary.skipped += 1;
                continue;
            }
        };

        let pool_clone = pool.clone();
        let generator_clone = Arc::clone(&generator);
        let timeout = config.generation_timeout;
        let user_id = plan.user_id;
        let tx_clone = tx.clone();
        let artifact_key = artifact.artifact_key.clone();

        in_flight += 1;

        tokio::spawn(async move {
            let outcome =
                generate_artifact(&pool_clone, generator_clone.as_ref(), &artifact, user_id, timeout)
                    .await;

            drop(permit);

            let _ = tx_clone
                .send(GenerationDone {
                    artifact_key,
                    outcome,
                })
                .await;
        });
    }
    drop(tx);

    while in_flight > 0 {
        let Some(done) = rx.recv().await else { break };
        in_flight -= 1;

        match done.outcome {
            Ok(ArtifactOutcome::Completed) => summary.completed += 1,
            Ok(ArtifactOutcome::Failed) => summary.failed += 1,
            Ok(ArtifactOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                // Infrastructure failure (database unreachable, etc). The row
                // is left for the watchdog; count it as failed for reporting.
                tracing::error!(
                    artifact_key = %done.artifact_key,
                    error = %e,
                    "artifact generation errored outside the status lifecycle"
                );
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        plan_id = %plan_id,
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        "artifact generation finished"
    );

    Ok(summary)
}

/// Run one artifact through its full lifecycle.
///
/// Steps:
/// 1. Claim the row (`pending -> generating`, compare-and-set).
/// 2. Resolve the artifact kind from its key.
/// 3. Invoke the generator under the configured timeout.
/// 4. Store the result (`generating -> complete` or `generating -> error`).
///
/// On both the happy and sad path the row ends terminal; only a crash between
/// steps 1 and 4 can leave it `generating`, and the watchdog surfaces that.
pub async fn generate_artifact(
    pool: &PgPool,
    generator: &dyn ContentGenerator,
    artifact: &Artifact,
    user_id: Uuid,
    timeout: std::time::Duration,
) -> Result<ArtifactOutcome> {
    let claimed = artifacts::begin_generation(pool, artifact.id).await?;
    if claimed == 0 {
        tracing::debug!(
            artifact_id = %artifact.id,
            artifact_key = %artifact.artifact_key,
            "artifact already claimed, skipping"
        );
        return Ok(ArtifactOutcome::Skipped);
    }

    let kind: ArtifactKind = match artifact.artifact_key.parse() {
        Ok(kind) => kind,
        Err(e) => {
            // A key outside the catalog cannot be generated; resolve the row
            // to error rather than leaving it claimed.
            artifacts::fail_artifact(pool, artifact.id, &e.to_string()).await?;
            tracing::warn!(
                artifact_id = %artifact.id,
                artifact_key = %artifact.artifact_key,
                "artifact key not in catalog"
            );
            return Ok(ArtifactOutcome::Failed);
        }
    };

    let request = GenerationRequest {
        user_id,
        plan_id: artifact.plan_id,
        kind,
    };

    match tokio::time::timeout(timeout, generator.generate(&request)).await {
        Ok(Ok(content)) => {
            let rows = artifacts::complete_artifact(pool, artifact.id, &content.body).await?;
            if rows == 0 {
                // Someone reset or finished the row while we were generating.
                tracing::warn!(
                    artifact_id = %artifact.id,
                    artifact_key = %artifact.artifact_key,
                    "lost completion race, discarding generated content"
                );
                return Ok(ArtifactOutcome::Skipped);
            }
            tracing::info!(
                artifact_id = %artifact.id,
                artifact_key = %artifact.artifact_key,
                "artifact complete"
            );
            Ok(ArtifactOutcome::Completed)
        }
        Ok(Err(e)) => {
            artifacts::fail_artifact(pool, artifact.id, &format!("{e:#}")).await?;
            tracing::warn!(
                artifact_id = %artifact.id,
                artifact_key = %artifact.artifact_key,
                error = %e,
                "artifact generation failed"
            );
            Ok(ArtifactOutcome::Failed)
        }
        Err(_elapsed) => {
            let detail = format!(
                "content generator timed out after {}s",
                timeout.as_secs()
            );
            artifacts::fail_artifact(pool, artifact.id, &detail).await?;
            tracing::warn!(
                artifact_id = %artifact.id,
                artifact_key = %artifact.artifact_key,
                "artifact generation timed out"
            );
            Ok(ArtifactOutcome::Failed)
        }
    }
}
