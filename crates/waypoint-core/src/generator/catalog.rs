//! The fixed artifact catalog.
//!
//! Every plan is assembled from exactly these kinds, created together at
//! plan-creation time. The catalog is an enum rather than free-form keys so
//! the expected shape of each artifact is spelled out in one place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One kind of plan artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    DecisionSnapshot,
    ActionPlan,
    RiskAssessment,
    ResourceMap,
    MilestoneTimeline,
}

impl ArtifactKind {
    /// All kinds, in the order they appear in the delivered plan.
    pub const ALL: [ArtifactKind; 5] = [
        Self::DecisionSnapshot,
        Self::ActionPlan,
        Self::RiskAssessment,
        Self::ResourceMap,
        Self::MilestoneTimeline,
    ];

    /// The persisted key for this kind (unique within a plan).
    pub fn key(self) -> &'static str {
        match self {
            Self::DecisionSnapshot => "decision_snapshot",
            Self::ActionPlan => "action_plan",
            Self::RiskAssessment => "risk_assessment",
            Self::ResourceMap => "resource_map",
            Self::MilestoneTimeline => "milestone_timeline",
        }
    }

    /// Human-readable title used as the content heading.
    pub fn title(self) -> &'static str {
        match self {
            Self::DecisionSnapshot => "Decision Snapshot",
            Self::ActionPlan => "Action Plan",
            Self::RiskAssessment => "Risk Assessment",
            Self::ResourceMap => "Resource Map",
            Self::MilestoneTimeline => "Milestone Timeline",
        }
    }

    /// The sections a generated body is expected to contain, in order.
    pub fn expected_sections(self) -> &'static [&'static str] {
        match self {
            Self::DecisionSnapshot => &["Where you are", "What you decided", "Why it holds"],
            Self::ActionPlan => &["First 30 days", "Days 31-90", "Habits to keep"],
            Self::RiskAssessment => &["Known risks", "Early warning signs", "Mitigations"],
            Self::ResourceMap => &["People", "Tools", "Further reading"],
            Self::MilestoneTimeline => &["Month 1", "Quarter 1", "Year 1"],
        }
    }

    /// Position of this kind within the delivered plan.
    pub fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|k| *k == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ArtifactKind {
    type Err = ArtifactKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision_snapshot" => Ok(Self::DecisionSnapshot),
            "action_plan" => Ok(Self::ActionPlan),
            "risk_assessment" => Ok(Self::RiskAssessment),
            "resource_map" => Ok(Self::ResourceMap),
            "milestone_timeline" => Ok(Self::MilestoneTimeline),
            other => Err(ArtifactKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ArtifactKind`] string.
#[derive(Debug, Clone)]
pub struct ArtifactKindParseError(pub String);

impl fmt::Display for ArtifactKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid artifact kind: {:?}", self.0)
    }
}

impl std::error::Error for ArtifactKindParseError {}
