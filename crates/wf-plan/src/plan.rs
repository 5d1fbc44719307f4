//! Plan building — combine the wave partitioner, the profile router, and
//! the assignment solver into one serializable execution plan.
//!
//! The emitted [`Plan`] is the contract between planning and execution: it
//! carries everything the executor needs (waves, per-intent agent and
//! profile, dependencies) plus the derived metrics operators read (peak
//! parallelism, bottleneck wave, critical path, cost totals). It round-trips
//! losslessly through JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use wf_core::config::{ConfigError, RoutingConfig};
use wf_core::cost::CostModel;
use wf_core::graph::{GraphError, IntentGraph};
use wf_core::registry::AgentPool;
use wf_core::types::{Assignment, Complexity, Profile};

use crate::router;
use crate::solver::{self, SolveError, SolveReport};
use crate::waves;

/// Delivery workflow label attached to every planned intent. The execution
/// backend interprets it; the core only carries it through.
pub const DEFAULT_WORKFLOW: &str = "git-pr";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Solve(#[from] SolveError),
}

// ---------------------------------------------------------------------------
// Plan records
// ---------------------------------------------------------------------------

/// One intent as planned: routed, bound to an agent, and priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentPlan {
    pub id: String,
    pub profile: Profile,
    /// Name of the agent the solver bound this intent to.
    pub model: String,
    pub workflow: String,
    pub complexity: Complexity,
    pub estimated_tokens: u64,
    pub estimated_cost: f64,
    pub depends_on: Vec<String>,
    pub wave: usize,
}

/// One wave of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavePlan {
    pub wave: usize,
    /// Distinct agents bound within this wave.
    pub agents_needed: usize,
    pub estimated_cost: f64,
    pub intents: Vec<IntentPlan>,
}

/// The full execution plan for one planning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub total_intents: usize,
    pub total_waves: usize,
    pub peak_parallelism: usize,
    pub serial_depth: usize,
    pub bottleneck_wave: usize,
    pub critical_path: Vec<String>,
    pub total_estimated_cost: f64,
    pub total_estimated_tokens: u64,
    pub profile_load: BTreeMap<Profile, usize>,
    pub waves: Vec<WavePlan>,
    pub solver: SolveReport,
}

impl Plan {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// All planned intents in wave order.
    pub fn intents(&self) -> impl Iterator<Item = &IntentPlan> {
        self.waves.iter().flat_map(|w| w.intents.iter())
    }

    pub fn intent(&self, id: &str) -> Option<&IntentPlan> {
        self.intents().find(|i| i.id == id)
    }

    /// Reconstruct the intent → agent binding.
    pub fn assignment(&self) -> Assignment {
        let mut assignment = Assignment::new();
        for intent in self.intents() {
            assignment.bind(&intent.id, &intent.model);
        }
        assignment
    }
}

// ---------------------------------------------------------------------------
// PlanBuilder
// ---------------------------------------------------------------------------

/// Orchestrates partitioning, routing, solving, and pricing into a [`Plan`].
pub struct PlanBuilder<'a> {
    graph: &'a IntentGraph,
    pool: &'a AgentPool,
    config: RoutingConfig,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(graph: &'a IntentGraph, pool: &'a AgentPool) -> Self {
        Self {
            graph,
            pool,
            config: RoutingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the plan. Fails fast on invalid configuration, a cyclic or
    /// dangling dependency graph, or an infeasible assignment — nothing is
    /// partially planned.
    pub fn build(&self) -> Result<Plan, PlanError> {
        self.config.validate()?;

        let wave_layout = waves::partition(self.graph)?;
        let (assignment, report) =
            solver::solve(self.graph, self.pool, &wave_layout, &self.config)?;

        // Duration for the critical path: tokens over the bound agent's
        // family throughput.
        let duration = |intent: &wf_core::types::Intent| -> f64 {
            match assignment.agent_for(&intent.id).and_then(|n| self.pool.get(n)) {
                Some(agent) => intent.estimated_tokens as f64 / agent.throughput(),
                None => intent.estimated_tokens as f64,
            }
        };
        let stats = waves::analyze(self.graph, &wave_layout, duration);

        let mut profile_load: BTreeMap<Profile, usize> = BTreeMap::new();
        let mut total_cost = 0.0;
        let mut total_tokens = 0u64;
        let mut wave_plans = Vec::with_capacity(wave_layout.len());

        for (wave_idx, wave) in wave_layout.iter().enumerate() {
            let mut intents = Vec::with_capacity(wave.len());
            let mut wave_cost = 0.0;
            let mut wave_agents: Vec<&str> = Vec::new();

            for id in wave {
                let intent = self.graph.get(id).expect("wave ids come from the graph");
                let agent_name = assignment
                    .agent_for(id)
                    .expect("solver assigns every intent");
                let agent = self
                    .pool
                    .get(agent_name)
                    .expect("assignment uses pool agents");

                let profile = router::route(intent);
                let cost = CostModel::token_cost(intent, agent);

                *profile_load.entry(profile).or_insert(0) += 1;
                total_cost += cost;
                total_tokens += intent.estimated_tokens;
                wave_cost += cost;
                wave_agents.push(agent_name);

                intents.push(IntentPlan {
                    id: id.clone(),
                    profile,
                    model: agent_name.to_owned(),
                    workflow: DEFAULT_WORKFLOW.to_owned(),
                    complexity: intent.complexity,
                    estimated_tokens: intent.estimated_tokens,
                    estimated_cost: cost,
                    depends_on: intent.depends.clone(),
                    wave: wave_idx,
                });
            }

            wave_agents.sort_unstable();
            wave_agents.dedup();
            wave_plans.push(WavePlan {
                wave: wave_idx,
                agents_needed: wave_agents.len(),
                estimated_cost: wave_cost,
                intents,
            });
        }

        info!(
            intents = stats.total_intents,
            waves = stats.total_waves,
            peak = stats.peak_parallelism,
            cost = total_cost,
            "plan built"
        );

        Ok(Plan {
            total_intents: stats.total_intents,
            total_waves: stats.total_waves,
            peak_parallelism: stats.peak_parallelism,
            serial_depth: stats.serial_depth,
            bottleneck_wave: stats.bottleneck_wave,
            critical_path: stats.critical_path,
            total_estimated_cost: total_cost,
            total_estimated_tokens: total_tokens,
            profile_load,
            waves: wave_plans,
            solver: report,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
