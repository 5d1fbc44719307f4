//! Planning layer for wavefront: wave partitioning, profile routing,
//! assignment solving, and plan assembly.
//!
//! Everything here is single-threaded and pure given its inputs — the
//! [`plan::PlanBuilder`] takes a validated [`wf_core::IntentGraph`] and
//! [`wf_core::AgentPool`] and emits a serializable [`plan::Plan`] that the
//! execution layer consumes.

pub mod plan;
pub mod router;
pub mod solver;
pub mod waves;

pub use plan::{IntentPlan, Plan, PlanBuilder, PlanError, WavePlan};
pub use solver::{SolveError, SolveReport, SolveStrategy};
pub use waves::WaveStats;
