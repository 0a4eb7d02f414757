//! Integration tests for the artifact generation pipeline: idempotent plan
//! creation, force-regeneration, per-artifact failure isolation, and the
//! terminal-status closure after a generation run.
//!
//! Each test creates an isolated temporary database inside a shared
//! PostgreSQL testcontainer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use waypoint_core::aggregate::{self, PlanStatus};
use waypoint_core::generator::{
    ArtifactKind, ContentGenerator, GeneratedContent, GenerationRequest,
};
use waypoint_core::pipeline::{self, EnsureError, PipelineConfig};
use waypoint_db::models::{ArtifactStatus, CompletionStage};
use waypoint_db::queries::{artifacts, completions};
use waypoint_test_utils::{create_test_db, drop_test_db};

/// Generator with scripted behavior: optional delay, optional failures for
/// specific kinds.
struct ScriptedGenerator {
    fail_kinds: Vec<ArtifactKind>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    fn succeeding() -> Self {
        Self {
            fail_kinds: Vec::new(),
            delay: None,
        }
    }

    fn failing_for(kinds: &[ArtifactKind]) -> Self {
        Self {
            fail_kinds: kinds.to_vec(),
            delay: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            fail_kinds: Vec::new(),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_kinds.contains(&request.kind) {
            anyhow::bail!("scripted failure for {}", request.kind);
        }
        Ok(GeneratedContent {
            body: format!("# {}\n\ngenerated body\n", request.kind.title()),
        })
    }
}

/// A user whose interview is complete, i.e. eligible for plan creation.
async fn ready_user(pool: &sqlx::PgPool) -> Uuid {
    let user_id = Uuid::new_v4();
    completions::mark_stage(pool, user_id, CompletionStage::Interview)
        .await
        .expect("mark should succeed");
    user_id
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        max_concurrent: 4,
        generation_timeout: Duration::from_secs(5),
        stuck_after: Duration::from_secs(10),
    }
}

// -----------------------------------------------------------------------
// ensure_artifacts
// -----------------------------------------------------------------------

#[tokio::test]
async fn ensure_rejects_user_without_interview() {
    let (pool, db_name) = create_test_db().await;

    // No completion record at all.
    let result = pipeline::ensure_artifacts(&pool, Uuid::new_v4(), false, &fast_config()).await;
    assert!(matches!(result, Err(EnsureError::NotReady(_))));

    // Record exists but the interview is not complete.
    let user_id = Uuid::new_v4();
    completions::ensure_completion_record(&pool, user_id).await.unwrap();
    let result = pipeline::ensure_artifacts(&pool, user_id, false, &fast_config()).await;
    assert!(matches!(result, Err(EnsureError::NotReady(_))));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_creates_full_pending_catalog() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;

    let outcome = pipeline::ensure_artifacts(&pool, user_id, false, &fast_config())
        .await
        .expect("ensure should succeed");

    assert!(outcome.created);
    assert_eq!(outcome.artifact_keys.len(), ArtifactKind::ALL.len());

    let rows = artifacts::list_artifacts_for_plan(&pool, outcome.plan_id)
        .await
        .unwrap();
    assert_eq!(rows.len(), ArtifactKind::ALL.len());
    assert!(rows.iter().all(|a| a.status == ArtifactStatus::Pending));

    // No duplicate keys.
    let mut keys: Vec<&str> = rows.iter().map(|a| a.artifact_key.as_str()).collect();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), ArtifactKind::ALL.len());

    // Plan existence is reflected in the completion record.
    let record = completions::get_completion_record(&pool, user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(record.has_plan);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_twice_returns_same_plan_and_artifacts() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;

    let first = pipeline::ensure_artifacts(&pool, user_id, false, &fast_config())
        .await
        .unwrap();
    let first_rows = artifacts::list_artifacts_for_plan(&pool, first.plan_id)
        .await
        .unwrap();

    let second = pipeline::ensure_artifacts(&pool, user_id, false, &fast_config())
        .await
        .unwrap();
    let second_rows = artifacts::list_artifacts_for_plan(&pool, second.plan_id)
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.plan_id, second.plan_id);

    let first_ids: Vec<Uuid> = first_rows.iter().map(|a| a.id).collect();
    let second_ids: Vec<Uuid> = second_rows.iter().map(|a| a.id).collect();
    assert_eq!(first_ids, second_ids, "re-ensure must not recreate rows");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn concurrent_ensure_calls_converge_on_one_plan() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;

    let config = fast_config();
    let (a, b) = tokio::join!(
        pipeline::ensure_artifacts(&pool, user_id, false, &config),
        pipeline::ensure_artifacts(&pool, user_id, false, &config),
    );
    let a = a.expect("first ensure should succeed");
    let b = b.expect("second ensure should succeed");

    assert_eq!(a.plan_id, b.plan_id);

    let rows = artifacts::list_artifacts_for_plan(&pool, a.plan_id).await.unwrap();
    assert_eq!(
        rows.len(),
        ArtifactKind::ALL.len(),
        "no duplicate artifact rows after racing creations"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn force_regenerate_resets_terminal_artifacts() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;
    let config = fast_config();

    let outcome = pipeline::ensure_artifacts(&pool, user_id, false, &config)
        .await
        .unwrap();

    let generator = Arc::new(ScriptedGenerator::failing_for(&[ArtifactKind::ResourceMap]));
    pipeline::run_generation(
        &pool,
        generator,
        outcome.plan_id,
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let again = pipeline::ensure_artifacts(&pool, user_id, true, &config)
        .await
        .unwrap();
    assert_eq!(again.plan_id, outcome.plan_id);

    let rows = artifacts::list_artifacts_for_plan(&pool, outcome.plan_id)
        .await
        .unwrap();
    for row in &rows {
        assert_eq!(row.status, ArtifactStatus::Pending, "{}", row.artifact_key);
        assert!(row.content.is_none());
        assert!(row.error_detail.is_none());
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_resets_stuck_generating_rows() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;
    let config = fast_config();

    let outcome = pipeline::ensure_artifacts(&pool, user_id, false, &config)
        .await
        .unwrap();
    let rows = artifacts::list_artifacts_for_plan(&pool, outcome.plan_id)
        .await
        .unwrap();

    // Simulate a worker that claimed a row and died: stuck in `generating`
    // with a start time far in the past.
    let stuck = &rows[0];
    artifacts::begin_generation(&pool, stuck.id).await.unwrap();
    sqlx::query(
        "UPDATE artifacts SET generation_started_at = now() - interval '1 hour' WHERE id = $1",
    )
    .bind(stuck.id)
    .execute(&pool)
    .await
    .unwrap();

    pipeline::ensure_artifacts(&pool, user_id, false, &config)
        .await
        .unwrap();

    let row = artifacts::get_artifact(&pool, stuck.id).await.unwrap().unwrap();
    assert_eq!(
        row.status,
        ArtifactStatus::Pending,
        "stuck row must be requeued on re-entry"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

// -----------------------------------------------------------------------
// run_generation
// -----------------------------------------------------------------------

#[tokio::test]
async fn generation_drives_all_artifacts_to_complete() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;
    let config = fast_config();

    let outcome = pipeline::ensure_artifacts(&pool, user_id, false, &config)
        .await
        .unwrap();

    let summary = pipeline::run_generation(
        &pool,
        Arc::new(ScriptedGenerator::succeeding()),
        outcome.plan_id,
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.completed, ArtifactKind::ALL.len());
    assert_eq!(summary.failed, 0);

    // Terminal-status closure: nothing is left pending or generating.
    let rows = artifacts::list_artifacts_for_plan(&pool, outcome.plan_id)
        .await
        .unwrap();
    assert!(rows.iter().all(|a| a.status == ArtifactStatus::Complete));
    assert!(rows.iter().all(|a| a.content.is_some()));

    let overview = aggregate::plan_overview(&pool, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(overview.status, PlanStatus::Ready);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn one_failing_artifact_does_not_block_siblings() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;
    let config = fast_config();

    let outcome = pipeline::ensure_artifacts(&pool, user_id, false, &config)
        .await
        .unwrap();

    let summary = pipeline::run_generation(
        &pool,
        Arc::new(ScriptedGenerator::failing_for(&[ArtifactKind::RiskAssessment])),
        outcome.plan_id,
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.completed, ArtifactKind::ALL.len() - 1);
    assert_eq!(summary.failed, 1);

    let rows = artifacts::list_artifacts_for_plan(&pool, outcome.plan_id)
        .await
        .unwrap();
    for row in &rows {
        if row.artifact_key == ArtifactKind::RiskAssessment.key() {
            assert_eq!(row.status, ArtifactStatus::Error);
            assert!(
                row.error_detail
                    .as_deref()
                    .is_some_and(|d| d.contains("scripted failure"))
            );
        } else {
            assert_eq!(row.status, ArtifactStatus::Complete);
        }
    }

    // Partial results still surface as a usable plan.
    let overview = aggregate::plan_overview(&pool, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(overview.status, PlanStatus::Ready);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn all_artifacts_failing_yields_error_plan() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;
    let config = fast_config();

    let outcome = pipeline::ensure_artifacts(&pool, user_id, false, &config)
        .await
        .unwrap();

    let summary = pipeline::run_generation(
        &pool,
        Arc::new(ScriptedGenerator::failing_for(&ArtifactKind::ALL)),
        outcome.plan_id,
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.failed, ArtifactKind::ALL.len());

    let overview = aggregate::plan_overview(&pool, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(overview.status, PlanStatus::Error);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn slow_generator_times_out_to_error() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;

    let config = PipelineConfig {
        max_concurrent: ArtifactKind::ALL.len(),
        generation_timeout: Duration::from_millis(100),
        stuck_after: Duration::from_secs(10),
    };

    let outcome = pipeline::ensure_artifacts(&pool, user_id, false, &config)
        .await
        .unwrap();

    let summary = pipeline::run_generation(
        &pool,
        Arc::new(ScriptedGenerator::slow(Duration::from_secs(5))),
        outcome.plan_id,
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.failed, ArtifactKind::ALL.len());

    let rows = artifacts::list_artifacts_for_plan(&pool, outcome.plan_id)
        .await
        .unwrap();
    for row in &rows {
        assert_eq!(row.status, ArtifactStatus::Error, "{}", row.artifact_key);
        assert!(
            row.error_detail
                .as_deref()
                .is_some_and(|d| d.contains("timed out"))
        );
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn rerun_after_success_has_nothing_to_do() {
    let (pool, db_name) = create_test_db().await;
    let user_id = ready_user(&pool).await;
    let config = fast_config();

    let outcome = pipeline::ensure_artifacts(&pool, user_id, false, &config)
        .await
        .unwrap();

    pipeline::run_generation(
        &pool,
        Arc::new(ScriptedGenerator::succeeding()),
        outcome.plan_id,
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // Terminal states are final: a second run finds no pending work.
    let summary = pipeline::run_generation(
        &pool,
        Arc::new(ScriptedGenerator::succeeding()),
        outcome.plan_id,
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}
