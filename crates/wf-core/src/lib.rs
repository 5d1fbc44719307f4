//! Core domain model for wavefront: intents, agents, the dependency graph,
//! the agent registry, and the assignment cost model.
//!
//! Everything in this crate is a pure, immutable value or a single-threaded
//! pure function; the concurrency lives in `wf-exec`. Types here are the
//! normalized shapes the planning and execution layers agree on:
//! - Work items ([`types::Intent`]) and workers ([`types::Agent`])
//! - The validated dependency DAG ([`graph::IntentGraph`])
//! - The session-static worker pool ([`registry::AgentPool`])
//! - Per-pair and global assignment costs ([`cost::CostModel`])

pub mod config;
pub mod cost;
pub mod graph;
pub mod registry;
pub mod types;

pub use config::{ConfigError, RoutingConfig};
pub use cost::CostModel;
pub use graph::{GraphError, IntentGraph};
pub use registry::{AgentPool, ProfileMatrix, RegistryError};
pub use types::{
    Agent, Assignment, Complexity, Intent, IntentResult, Profile, ResultStatus,
};
