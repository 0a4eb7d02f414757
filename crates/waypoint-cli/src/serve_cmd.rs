//! `waypoint serve`: the HTTP surface for journey resolution and plan
//! generation.
//!
//! Identity provisioning is upstream; the caller arrives with an opaque user
//! id in the `x-user-id` header. All gating goes through the one copy of
//! [`waypoint_core::journey::resolve`], so the HTTP gate cannot drift from
//! the resolver (the tests below check exactly that).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use waypoint_core::aggregate::{self, PlanStatus};
use waypoint_core::generator::ContentGenerator;
use waypoint_core::journey::{self, JourneyStep};
use waypoint_core::pipeline::{self, EnsureError, EnsureOutcome, PipelineConfig};
use waypoint_db::models::{Artifact, ArtifactStatus, CompletionRecord};
use waypoint_db::queries::completions;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub generator: Arc<dyn ContentGenerator>,
    pub pipeline: PipelineConfig,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
    retryable: bool,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
            retryable: false,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
            retryable: false,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            retryable: false,
        }
    }

    /// Prerequisite upstream state is missing; the caller should back off
    /// and retry rather than treat this as permanent failure.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
            retryable: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = if self.retryable {
            serde_json::json!({ "error": self.message, "retryable": true })
        } else {
            serde_json::json!({ "error": self.message })
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// The calling user, taken from the `x-user-id` header set by the upstream
/// identity layer.
pub struct CallerId(pub Uuid);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .ok_or_else(|| AppError::unauthorized("missing x-user-id header"))?;
        let value = header
            .to_str()
            .map_err(|_| AppError::unauthorized("malformed x-user-id header"))?;
        let user_id = Uuid::parse_str(value)
            .map_err(|_| AppError::unauthorized(format!("invalid user id: {value:?}")))?;
        Ok(CallerId(user_id))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyResponse {
    pub step: JourneyStep,
    pub current_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub user_id: Uuid,
    pub interview_complete: bool,
    pub payment_verified: bool,
    pub module1_complete: bool,
    pub module2_complete: bool,
    pub module3_complete: bool,
    pub has_plan: bool,
}

impl From<CompletionRecord> for CompletionResponse {
    fn from(record: CompletionRecord) -> Self {
        Self {
            user_id: record.user_id,
            interview_complete: record.interview_complete,
            payment_verified: record.payment_verified,
            module1_complete: record.module1_complete,
            module2_complete: record.module2_complete,
            module3_complete: record.module3_complete,
            has_plan: record.has_plan,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanResponse {
    pub plan_id: Uuid,
    pub created: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResponse {
    pub id: Uuid,
    pub artifact_key: String,
    pub generation_status: ArtifactStatus,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Artifact> for ArtifactResponse {
    fn from(artifact: Artifact) -> Self {
        Self {
            id: artifact.id,
            artifact_key: artifact.artifact_key,
            generation_status: artifact.status,
            content: artifact.content,
            error: artifact.error_detail,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub id: Uuid,
    pub status: PlanStatus,
    pub artifacts: Vec<ArtifactResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureArtifactsRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub force_regenerate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureArtifactsResponse {
    pub plan_id: Uuid,
    pub created: bool,
    pub artifact_keys: Vec<String>,
}

impl From<EnsureOutcome> for EnsureArtifactsResponse {
    fn from(outcome: EnsureOutcome) -> Self {
        Self {
            plan_id: outcome.plan_id,
            created: outcome.created,
            artifact_keys: outcome.artifact_keys,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepGateResponse {
    pub step: JourneyStep,
    pub path: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/journey", get(get_journey))
        .route("/completion", get(get_completion))
        .route("/serious-plan", post(create_plan))
        .route("/serious-plan/latest", get(get_latest_plan))
        .route("/serious-plan/ensure-artifacts", post(ensure_artifacts))
        .route("/steps/{step}", get(gate_step))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("waypoint serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("waypoint serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_journey(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<JourneyResponse>, AppError> {
    // First interaction creates the all-false record.
    let record = completions::ensure_completion_record(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?;

    let resolution = journey::resolve(&record);
    Ok(Json(JourneyResponse {
        step: resolution.step,
        current_path: resolution.path.to_owned(),
    }))
}

async fn get_completion(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<CompletionResponse>, AppError> {
    let record = completions::ensure_completion_record(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(record.into()))
}

async fn create_plan(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<CreatePlanResponse>, AppError> {
    let outcome = run_ensure(&state, user_id, false).await?;
    Ok(Json(CreatePlanResponse {
        plan_id: outcome.plan_id,
        created: outcome.created,
    }))
}

async fn ensure_artifacts(
    State(state): State<AppState>,
    Json(request): Json<EnsureArtifactsRequest>,
) -> Result<Json<EnsureArtifactsResponse>, AppError> {
    let outcome = run_ensure(&state, request.user_id, request.force_regenerate).await?;
    Ok(Json(outcome.into()))
}

/// Shared ensure path for plan creation and repair: ensure rows exist, then
/// kick generation for whatever is pending in the background.
async fn run_ensure(
    state: &AppState,
    user_id: Uuid,
    force_regenerate: bool,
) -> Result<EnsureOutcome, AppError> {
    let outcome =
        match pipeline::ensure_artifacts(&state.pool, user_id, force_regenerate, &state.pipeline)
            .await
        {
            Ok(outcome) => outcome,
            Err(e @ EnsureError::NotReady(_)) => return Err(AppError::not_ready(e.to_string())),
            Err(EnsureError::Other(e)) => return Err(AppError::internal(e)),
        };

    spawn_generation(state, outcome.plan_id);
    Ok(outcome)
}

/// Run generation for a plan in the background. The request does not wait
/// for it; the client observes progress via `/serious-plan/latest`.
fn spawn_generation(state: &AppState, plan_id: Uuid) {
    let pool = state.pool.clone();
    let generator = Arc::clone(&state.generator);
    let config = state.pipeline.clone();

    tokio::spawn(async move {
        let result =
            pipeline::run_generation(&pool, generator, plan_id, &config, CancellationToken::new())
                .await;
        if let Err(e) = result {
            tracing::error!(plan_id = %plan_id, error = %e, "background generation failed");
        }
    });
}

async fn get_latest_plan(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<PlanResponse>, AppError> {
    let overview = aggregate::plan_overview(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("no plan for user {user_id}")))?;

    Ok(Json(PlanResponse {
        id: overview.plan.id,
        status: overview.status,
        artifacts: overview.artifacts.into_iter().map(Into::into).collect(),
    }))
}

async fn gate_step(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(step): Path<String>,
) -> Result<axum::response::Response, AppError> {
    let requested: JourneyStep = step
        .parse()
        .map_err(|_| AppError::bad_request(format!("unknown journey step: {step:?}")))?;

    let record = completions::ensure_completion_record(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?;
    let resolution = journey::resolve(&record);

    if resolution.step.allows(requested) {
        return Ok(Json(StepGateResponse {
            step: requested,
            path: requested.path().to_owned(),
        })
        .into_response());
    }

    let body = serde_json::json!({
        "error": format!("step {requested} is not reachable yet"),
        "redirectTo": resolution.path,
    });
    Ok((StatusCode::CONFLICT, Json(body)).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
