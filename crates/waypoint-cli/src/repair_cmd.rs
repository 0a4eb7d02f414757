//! `waypoint repair` command: bring a stuck or missing plan back to a
//! healthy state and re-run generation for whatever is pending afterwards.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use waypoint_core::generator::ContentGenerator;
use waypoint_core::pipeline::{self, EnsureError, PipelineConfig};
use waypoint_db::queries::artifacts;

/// Run the repair command for one user.
///
/// `force` resets every terminal artifact so the whole plan regenerates;
/// `artifact_key` instead requeues just that artifact (a targeted retry
/// after a transient generation failure).
pub async fn run_repair(
    pool: &PgPool,
    generator: Arc<dyn ContentGenerator>,
    user_id: Uuid,
    force: bool,
    artifact_key: Option<&str>,
    config: &PipelineConfig,
) -> Result<()> {
    let outcome = match pipeline::ensure_artifacts(pool, user_id, force, config).await {
        Ok(outcome) => outcome,
        Err(EnsureError::NotReady(_)) => {
            println!(
                "User {user_id} has not completed the interview yet; there is nothing to repair."
            );
            return Ok(());
        }
        Err(EnsureError::Other(e)) => return Err(e),
    };

    println!(
        "Plan {} ({}, {} artifacts)",
        outcome.plan_id,
        if outcome.created { "created" } else { "existing" },
        outcome.artifact_keys.len()
    );

    if let Some(key) = artifact_key {
        let rows = artifacts::list_artifacts_for_plan(pool, outcome.plan_id).await?;
        let target = rows
            .iter()
            .find(|a| a.artifact_key == key)
            .with_context(|| format!("plan has no artifact {key:?}"))?;
        let requeued = artifacts::requeue_artifact(pool, target.id).await?;
        if requeued == 0 {
            println!("Artifact {key} is not in a terminal state; nothing to requeue.");
        } else {
            println!("Requeued artifact {key} for regeneration.");
        }
    }

    let summary = pipeline::run_generation(
        pool,
        generator,
        outcome.plan_id,
        config,
        CancellationToken::new(),
    )
    .await?;

    println!(
        "Generation finished: {} complete, {} failed, {} skipped.",
        summary.completed, summary.failed, summary.skipped
    );
    if summary.failed > 0 {
        println!("Re-run with --force to regenerate errored artifacts.");
    }

    Ok(())
}
