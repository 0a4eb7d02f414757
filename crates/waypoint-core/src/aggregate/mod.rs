//! Plan aggregation: the read side of the pipeline.
//!
//! [`plan_overview`] returns the plan, its artifacts in catalog order, and an
//! overall status derived from the per-artifact statuses. The read path has
//! no side effects and a deterministic sort, so consecutive reads with no
//! intervening write return identical results.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use waypoint_db::models::{Artifact, ArtifactStatus, Plan};
use waypoint_db::queries::{artifacts, plans};

use crate::generator::ArtifactKind;

/// Overall status of a plan, derived from its artifacts at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Generating,
    Ready,
    Error,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanStatus {
    type Err = PlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generating" => Ok(Self::Generating),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(PlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanStatus`] string.
#[derive(Debug, Clone)]
pub struct PlanStatusParseError(pub String);

impl fmt::Display for PlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan status: {:?}", self.0)
    }
}

impl std::error::Error for PlanStatusParseError {}

/// A plan together with its artifacts and derived status.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOverview {
    pub plan: Plan,
    pub status: PlanStatus,
    pub artifacts: Vec<Artifact>,
}

/// Derive the overall status from per-artifact statuses.
///
/// A plan is usable once it has any complete content, so a fully terminal
/// plan with at least one `complete` artifact reads as `ready` even when
/// siblings errored; only an all-error plan reads as `error`. Partial
/// failures stay visible on the individual artifacts.
pub fn derive_status(artifacts: &[Artifact]) -> PlanStatus {
    if artifacts.is_empty() {
        // Only observable mid-repair; creation writes plan and artifacts in
        // one transaction.
        return PlanStatus::Pending;
    }

    if artifacts.iter().any(|a| !a.status.is_terminal()) {
        return PlanStatus::Generating;
    }

    if artifacts
        .iter()
        .any(|a| a.status == ArtifactStatus::Complete)
    {
        PlanStatus::Ready
    } else {
        PlanStatus::Error
    }
}

/// Fetch the plan for a user with its artifacts and derived status.
///
/// Returns `None` when the user has no plan. Artifacts come back in catalog
/// order (unknown keys sort last, by key), and repeated calls with no
/// intervening mutation return byte-identical content and statuses.
pub async fn plan_overview(pool: &PgPool, user_id: Uuid) -> Result<Option<PlanOverview>> {
    let Some(plan) = plans::get_plan_for_user(pool, user_id).await? else {
        return Ok(None);
    };

    let mut rows = artifacts::list_artifacts_for_plan(pool, plan.id).await?;
    rows.sort_by(|a, b| catalog_rank(a).cmp(&catalog_rank(b)));

    let status = derive_status(&rows);

    Ok(Some(PlanOverview {
        plan,
        status,
        artifacts: rows,
    }))
}

/// Sort key: catalog position first, then artifact key for rows outside the
/// catalog.
fn catalog_rank(artifact: &Artifact) -> (usize, &str) {
    let position = artifact
        .artifact_key
        .parse::<ArtifactKind>()
        .map(|kind| kind.position())
        .unwrap_or(usize::MAX);
    (position, artifact.artifact_key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn artifact(key: &str, status: ArtifactStatus) -> Artifact {
        Artifact {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            artifact_key: key.to_owned(),
            status,
            content: match status {
                ArtifactStatus::Complete => Some("content".to_owned()),
                _ => None,
            },
            error_detail: match status {
                ArtifactStatus::Error => Some("boom".to_owned()),
                _ => None,
            },
            created_at: Utc::now(),
            generation_started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn no_artifacts_is_pending() {
        assert_eq!(derive_status(&[]), PlanStatus::Pending);
    }

    #[test]
    fn any_non_terminal_artifact_means_generating() {
        let rows = vec![
            artifact("action_plan", ArtifactStatus::Complete),
            artifact("risk_assessment", ArtifactStatus::Pending),
        ];
        assert_eq!(derive_status(&rows), PlanStatus::Generating);

        let rows = vec![
            artifact("action_plan", ArtifactStatus::Error),
            artifact("risk_assessment", ArtifactStatus::Generating),
        ];
        assert_eq!(derive_status(&rows), PlanStatus::Generating);
    }

    #[test]
    fn all_complete_is_ready() {
        let rows = vec![
            artifact("action_plan", ArtifactStatus::Complete),
            artifact("risk_assessment", ArtifactStatus::Complete),
        ];
        assert_eq!(derive_status(&rows), PlanStatus::Ready);
    }

    #[test]
    fn mixed_terminal_with_any_complete_is_ready() {
        let rows = vec![
            artifact("action_plan", ArtifactStatus::Complete),
            artifact("risk_assessment", ArtifactStatus::Error),
        ];
        assert_eq!(derive_status(&rows), PlanStatus::Ready);
    }

    #[test]
    fn all_error_is_error() {
        let rows = vec![
            artifact("action_plan", ArtifactStatus::Error),
            artifact("risk_assessment", ArtifactStatus::Error),
        ];
        assert_eq!(derive_status(&rows), PlanStatus::Error);
    }

    #[test]
    fn plan_status_display_roundtrip() {
        let variants = [
            PlanStatus::Pending,
            PlanStatus::Generating,
            PlanStatus::Ready,
            PlanStatus::Error,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: PlanStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn catalog_rank_orders_known_kinds_before_unknown() {
        let mut rows = vec![
            artifact("zz_custom", ArtifactStatus::Pending),
            artifact("milestone_timeline", ArtifactStatus::Pending),
            artifact("decision_snapshot", ArtifactStatus::Pending),
        ];
        rows.sort_by(|a, b| catalog_rank(a).cmp(&catalog_rank(b)));
        let keys: Vec<&str> = rows.iter().map(|a| a.artifact_key.as_str()).collect();
        assert_eq!(keys, ["decision_snapshot", "milestone_timeline", "zz_custom"]);
    }
}
