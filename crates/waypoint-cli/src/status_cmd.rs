//! `waypoint status` command: show the journey position and per-artifact
//! plan progress for a user.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use waypoint_core::aggregate;
use waypoint_core::journey;
use waypoint_db::models::ArtifactStatus;
use waypoint_db::queries::{artifacts, completions};

/// Run the status command for one user.
pub async fn run_status(pool: &PgPool, user_id: Uuid) -> Result<()> {
    match completions::get_completion_record(pool, user_id).await? {
        None => {
            println!("User: {user_id}");
            println!("No completion record yet (journey starts at /interview).");
        }
        Some(record) => {
            let resolution = journey::resolve(&record);
            println!("User: {user_id}");
            println!("Journey step: {} -> {}", resolution.step, resolution.path);
            println!(
                "Completed: interview={} payment={} module_1={} module_2={} module_3={} plan={}",
                record.interview_complete,
                record.payment_verified,
                record.module1_complete,
                record.module2_complete,
                record.module3_complete,
                record.has_plan,
            );
        }
    }
    println!();

    match aggregate::plan_overview(pool, user_id).await? {
        None => println!("Plan: none"),
        Some(overview) => {
            println!("Plan: {} ({})", overview.plan.id, overview.status);
            println!(
                "Created: {}",
                overview.plan.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );

            let progress = artifacts::get_artifact_progress(pool, overview.plan.id).await?;
            println!("Progress: {}/{} complete", progress.complete, progress.total);
            println!(
                "  pending={} generating={} complete={} error={}",
                progress.pending, progress.generating, progress.complete, progress.error,
            );

            println!("Artifacts:");
            for artifact in &overview.artifacts {
                let status_icon = match artifact.status {
                    ArtifactStatus::Pending => ".",
                    ArtifactStatus::Generating => "*",
                    ArtifactStatus::Complete => "+",
                    ArtifactStatus::Error => "!",
                };
                println!(
                    "  [{}] {} ({})",
                    status_icon, artifact.artifact_key, artifact.status
                );
                if let Some(detail) = &artifact.error_detail {
                    println!("      {detail}");
                }
            }
        }
    }

    Ok(())
}
