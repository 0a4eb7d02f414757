use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Generation status of an artifact.
///
/// `Complete` and `Error` are terminal: nothing transitions out of them
/// automatically. A regenerate request resets a terminal artifact to
/// `Pending` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Generating,
    Complete,
    Error,
}

impl ArtifactStatus {
    /// Whether this status is terminal (no automatic transition out).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for ArtifactStatus {
    type Err = ArtifactStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generating" => Ok(Self::Generating),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(ArtifactStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ArtifactStatus`] string.
#[derive(Debug, Clone)]
pub struct ArtifactStatusParseError(pub String);

impl fmt::Display for ArtifactStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid artifact status: {:?}", self.0)
    }
}

impl std::error::Error for ArtifactStatusParseError {}

// ---------------------------------------------------------------------------

/// A stage a user can complete, mapping onto one boolean column of the
/// completion record.
///
/// Completion is monotonic: marking a stage only ever raises its flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStage {
    Interview,
    Payment,
    Module1,
    Module2,
    Module3,
    Plan,
}

impl CompletionStage {
    /// All stages, in journey order.
    pub const ALL: [CompletionStage; 6] = [
        Self::Interview,
        Self::Payment,
        Self::Module1,
        Self::Module2,
        Self::Module3,
        Self::Plan,
    ];

    /// The completion-record column this stage raises.
    pub fn column(self) -> &'static str {
        match self {
            Self::Interview => "interview_complete",
            Self::Payment => "payment_verified",
            Self::Module1 => "module1_complete",
            Self::Module2 => "module2_complete",
            Self::Module3 => "module3_complete",
            Self::Plan => "has_plan",
        }
    }
}

impl fmt::Display for CompletionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Interview => "interview",
            Self::Payment => "payment",
            Self::Module1 => "module_1",
            Self::Module2 => "module_2",
            Self::Module3 => "module_3",
            Self::Plan => "plan",
        };
        f.write_str(s)
    }
}

impl FromStr for CompletionStage {
    type Err = CompletionStageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interview" => Ok(Self::Interview),
            "payment" => Ok(Self::Payment),
            "module_1" => Ok(Self::Module1),
            "module_2" => Ok(Self::Module2),
            "module_3" => Ok(Self::Module3),
            "plan" => Ok(Self::Plan),
            other => Err(CompletionStageParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`CompletionStage`] string.
#[derive(Debug, Clone)]
pub struct CompletionStageParseError(pub String);

impl fmt::Display for CompletionStageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid completion stage: {:?}", self.0)
    }
}

impl std::error::Error for CompletionStageParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A user's completion record -- the ground truth the journey is derived from.
///
/// One row per user. Flags only ever move from false to true.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, FromRow)]
pub struct CompletionRecord {
    pub user_id: Uuid,
    pub interview_complete: bool,
    pub payment_verified: bool,
    pub module1_complete: bool,
    pub module2_complete: bool,
    pub module3_complete: bool,
    pub has_plan: bool,
    #[serde(skip)]
    #[sqlx(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    #[sqlx(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CompletionRecord {
    /// A fresh record for a user with nothing completed.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }
}

/// A plan -- the aggregate deliverable grouping all artifacts for one user.
///
/// No status column: the overall status is derived from artifact statuses at
/// read time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One independently generated unit of content belonging to a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Artifact {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub artifact_key: String,
    pub status: ArtifactStatus,
    pub content: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub generation_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_status_display_roundtrip() {
        let variants = [
            ArtifactStatus::Pending,
            ArtifactStatus::Generating,
            ArtifactStatus::Complete,
            ArtifactStatus::Error,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: ArtifactStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn artifact_status_invalid() {
        let result = "bogus".parse::<ArtifactStatus>();
        assert!(result.is_err());
    }

    #[test]
    fn artifact_status_terminality() {
        assert!(!ArtifactStatus::Pending.is_terminal());
        assert!(!ArtifactStatus::Generating.is_terminal());
        assert!(ArtifactStatus::Complete.is_terminal());
        assert!(ArtifactStatus::Error.is_terminal());
    }

    #[test]
    fn completion_stage_display_roundtrip() {
        for v in &CompletionStage::ALL {
            let s = v.to_string();
            let parsed: CompletionStage = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn completion_stage_invalid() {
        let result = "module_4".parse::<CompletionStage>();
        assert!(result.is_err());
    }

    #[test]
    fn completion_stage_columns_are_distinct() {
        let mut columns: Vec<&str> = CompletionStage::ALL.iter().map(|s| s.column()).collect();
        columns.sort_unstable();
        columns.dedup();
        assert_eq!(columns.len(), CompletionStage::ALL.len());
    }

    #[test]
    fn fresh_completion_record_has_nothing_set() {
        let record = CompletionRecord::new(Uuid::new_v4());
        assert!(!record.interview_complete);
        assert!(!record.payment_verified);
        assert!(!record.module1_complete);
        assert!(!record.module2_complete);
        assert!(!record.module3_complete);
        assert!(!record.has_plan);
    }
}
