//! Journey resolution: deriving the single canonical step a user is allowed
//! to be on from their completion record.
//!
//! [`resolve`] is the only copy of this logic in the system. The HTTP gate,
//! redirects, and the CLI all call it, so server-side and client-facing
//! decisions cannot drift apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use waypoint_db::models::CompletionRecord;

/// A step of the user journey.
///
/// Variants are declared in journey order, so the derived `Ord` is the
/// step ordering used for access control.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStep {
    Interview,
    Paywall,
    #[serde(rename = "module_1")]
    Module1,
    #[serde(rename = "module_2")]
    Module2,
    #[serde(rename = "module_3")]
    Module3,
    Graduation,
    SeriousPlan,
}

impl JourneyStep {
    /// All steps, in journey order.
    pub const ALL: [JourneyStep; 7] = [
        Self::Interview,
        Self::Paywall,
        Self::Module1,
        Self::Module2,
        Self::Module3,
        Self::Graduation,
        Self::SeriousPlan,
    ];

    /// The canonical page path for this step.
    pub fn path(self) -> &'static str {
        match self {
            Self::Interview => "/interview",
            Self::Paywall => "/offer",
            Self::Module1 => "/module/1",
            Self::Module2 => "/module/2",
            Self::Module3 => "/module/3",
            Self::Graduation => "/graduation",
            Self::SeriousPlan => "/serious-plan",
        }
    }

    /// Whether a user currently on `self` may visit `requested`.
    ///
    /// Earlier steps stay reachable (a paid user can revisit the interview);
    /// later steps are not.
    pub fn allows(self, requested: JourneyStep) -> bool {
        requested <= self
    }
}

impl fmt::Display for JourneyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Interview => "interview",
            Self::Paywall => "paywall",
            Self::Module1 => "module_1",
            Self::Module2 => "module_2",
            Self::Module3 => "module_3",
            Self::Graduation => "graduation",
            Self::SeriousPlan => "serious_plan",
        };
        f.write_str(s)
    }
}

impl FromStr for JourneyStep {
    type Err = JourneyStepParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interview" => Ok(Self::Interview),
            "paywall" => Ok(Self::Paywall),
            "module_1" => Ok(Self::Module1),
            "module_2" => Ok(Self::Module2),
            "module_3" => Ok(Self::Module3),
            "graduation" => Ok(Self::Graduation),
            "serious_plan" => Ok(Self::SeriousPlan),
            other => Err(JourneyStepParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`JourneyStep`] string.
#[derive(Debug, Clone)]
pub struct JourneyStepParseError(pub String);

impl fmt::Display for JourneyStepParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid journey step: {:?}", self.0)
    }
}

impl std::error::Error for JourneyStepParseError {}

/// The outcome of resolving a completion record: the current step and the
/// page the user belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub step: JourneyStep,
    pub path: &'static str,
}

/// Derive the current journey step from a completion record.
///
/// Pure and side-effect free: the first unmet condition wins, in fixed
/// order. Every combination of flags resolves to exactly one step.
pub fn resolve(record: &CompletionRecord) -> Resolution {
    let step = if !record.interview_complete {
        JourneyStep::Interview
    } else if !record.payment_verified {
        JourneyStep::Paywall
    } else if !record.module1_complete {
        JourneyStep::Module1
    } else if !record.module2_complete {
        JourneyStep::Module2
    } else if !record.module3_complete {
        JourneyStep::Module3
    } else if !record.has_plan {
        JourneyStep::Graduation
    } else {
        JourneyStep::SeriousPlan
    };

    Resolution {
        step,
        path: step.path(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Build a record from a bitmask over the six flags, in journey order.
    fn record_from_bits(bits: u8) -> CompletionRecord {
        let mut record = CompletionRecord::new(Uuid::new_v4());
        record.interview_complete = bits & 0b000001 != 0;
        record.payment_verified = bits & 0b000010 != 0;
        record.module1_complete = bits & 0b000100 != 0;
        record.module2_complete = bits & 0b001000 != 0;
        record.module3_complete = bits & 0b010000 != 0;
        record.has_plan = bits & 0b100000 != 0;
        record
    }

    #[test]
    fn fresh_user_starts_at_interview() {
        let record = CompletionRecord::new(Uuid::new_v4());
        let resolution = resolve(&record);
        assert_eq!(resolution.step, JourneyStep::Interview);
        assert_eq!(resolution.path, "/interview");
    }

    #[test]
    fn paid_user_with_module_one_done_lands_on_module_two() {
        let mut record = CompletionRecord::new(Uuid::new_v4());
        record.interview_complete = true;
        record.payment_verified = true;
        record.module1_complete = true;

        let resolution = resolve(&record);
        assert_eq!(resolution.step, JourneyStep::Module2);
        assert_eq!(resolution.path, "/module/2");
    }

    #[test]
    fn everything_done_resolves_to_serious_plan() {
        let record = record_from_bits(0b111111);
        let resolution = resolve(&record);
        assert_eq!(resolution.step, JourneyStep::SeriousPlan);
        assert_eq!(resolution.path, "/serious-plan");
    }

    #[test]
    fn all_modules_done_without_plan_is_graduation() {
        let record = record_from_bits(0b011111);
        assert_eq!(resolve(&record).step, JourneyStep::Graduation);
    }

    #[test]
    fn resolution_is_total_over_all_flag_combinations() {
        // Every one of the 64 combinations must resolve, and the result must
        // equal the first journey-ordered flag that is still false.
        for bits in 0u8..64 {
            let record = record_from_bits(bits);
            let resolution = resolve(&record);

            let flags = [
                record.interview_complete,
                record.payment_verified,
                record.module1_complete,
                record.module2_complete,
                record.module3_complete,
                record.has_plan,
            ];
            let expected = match flags.iter().position(|f| !f) {
                Some(i) => JourneyStep::ALL[i],
                None => JourneyStep::SeriousPlan,
            };
            assert_eq!(
                resolution.step, expected,
                "bits {bits:#08b} resolved to {} instead of {}",
                resolution.step, expected
            );
            assert_eq!(resolution.path, resolution.step.path());
        }
    }

    #[test]
    fn access_follows_the_step_order() {
        // A user on module_2 may visit everything up to module_2 and nothing
        // beyond it.
        let current = JourneyStep::Module2;
        for step in JourneyStep::ALL {
            assert_eq!(current.allows(step), step <= current);
        }
    }

    #[test]
    fn every_step_allows_itself() {
        for step in JourneyStep::ALL {
            assert!(step.allows(step));
        }
    }

    #[test]
    fn step_display_roundtrip() {
        for step in JourneyStep::ALL {
            let s = step.to_string();
            let parsed: JourneyStep = s.parse().expect("should parse");
            assert_eq!(step, parsed);
        }
    }

    #[test]
    fn step_invalid() {
        let result = "module_4".parse::<JourneyStep>();
        assert!(result.is_err());
    }

    #[test]
    fn step_serde_names_match_display() {
        for step in JourneyStep::ALL {
            let json = serde_json::to_value(step).unwrap();
            assert_eq!(json, serde_json::Value::String(step.to_string()));
        }
    }
}
