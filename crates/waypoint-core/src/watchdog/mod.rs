//! Stuck-row watchdog.
//!
//! A row that has sat in `generating` past the external-call timeout means a
//! worker died between claiming the artifact and writing its terminal status.
//! Such rows are never silently left in place: every `ensure_artifacts` entry
//! and the `repair` command run a watchdog pass that resets them to `pending`
//! and logs each one.

use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use waypoint_db::models::Artifact;
use waypoint_db::queries::artifacts;

/// Reset artifacts stuck in `generating` longer than `stuck_after` back to
/// `pending`, returning the rows that were reset.
pub async fn reset_stuck_artifacts(
    pool: &PgPool,
    plan_id: Uuid,
    stuck_after: Duration,
) -> Result<Vec<Artifact>> {
    let reset =
        artifacts::reset_stuck_artifacts(pool, plan_id, stuck_after.as_secs_f64()).await?;

    for artifact in &reset {
        tracing::warn!(
            artifact_id = %artifact.id,
            artifact_key = %artifact.artifact_key,
            stuck_after_secs = stuck_after.as_secs(),
            "reset stuck artifact to pending"
        );
    }

    Ok(reset)
}
