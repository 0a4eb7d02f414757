//! Core logic for waypoint: journey resolution, the artifact generation
//! pipeline, plan aggregation, the stuck-row watchdog, and the client-side
//! poller.
//!
//! Everything here is driven by the completion record and the plan/artifact
//! rows in `waypoint-db`; the content generator itself is an external
//! capability behind the [`generator::ContentGenerator`] trait.

pub mod aggregate;
pub mod generator;
pub mod journey;
pub mod pipeline;
pub mod poller;
pub mod watchdog;
