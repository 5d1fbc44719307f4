use std::collections::HashMap;

use crate::config::RoutingConfig;
use crate::graph::IntentGraph;
use crate::registry::AgentPool;
use crate::types::{Agent, Assignment, Intent};

/// Wave-index to timestep scale used for deadline accounting: an intent in
/// wave `k` is assumed to complete at timestep `(k + 1) * TIME_PER_WAVE`.
pub const TIME_PER_WAVE: f64 = 1.0;

// ---------------------------------------------------------------------------
// CostModel
// ---------------------------------------------------------------------------

/// Computes per-pair assignment costs and the global objective.
///
/// The per-pair cost is pure: token cost, overkill penalty, and latency.
/// Deadline timing and the context-affinity bonus depend on the whole
/// candidate assignment and the wave layout, so they only appear in
/// [`CostModel::objective`].
#[derive(Debug, Clone)]
pub struct CostModel {
    overkill_weight: f64,
    latency_weight: f64,
    deadline_weight: f64,
    context_bonus: f64,
    budget_cap: Option<f64>,
    floor_override: Option<f64>,
}

impl CostModel {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            overkill_weight: config.overkill_weight,
            latency_weight: config.latency_weight,
            deadline_weight: config.deadline_weight,
            context_bonus: config.context_bonus,
            budget_cap: config.budget_cap,
            floor_override: config.quality_floor_override,
        }
    }

    /// The quality floor enforced for `intent` under this model.
    pub fn effective_floor(&self, intent: &Intent) -> f64 {
        match self.floor_override {
            Some(floor) => intent.quality_floor.max(floor),
            None => intent.quality_floor,
        }
    }

    /// Raw token spend for running `intent` on `agent`. Zero for local
    /// agents.
    pub fn token_cost(intent: &Intent, agent: &Agent) -> f64 {
        intent.estimated_tokens as f64 * agent.token_rate
    }

    /// Pure per-pair cost, or `None` when the pairing violates a hard
    /// constraint (capability or quality floor) — the infeasible sentinel.
    pub fn pair_cost(&self, intent: &Intent, agent: &Agent) -> Option<f64> {
        if !agent.covers(intent.complexity) || agent.quality < self.effective_floor(intent) {
            return None;
        }
        let token_cost = Self::token_cost(intent, agent);
        let surplus = (agent.quality - self.effective_floor(intent)).max(0.0);
        let overkill = surplus * token_cost * self.overkill_weight;
        let latency = agent.latency * self.latency_weight;
        Some(token_cost + overkill + latency)
    }

    /// Deadline overrun penalty for an intent scheduled in `wave_index`.
    /// Zero for intents without a deadline.
    pub fn deadline_penalty(&self, intent: &Intent, wave_index: usize) -> f64 {
        match intent.deadline {
            Some(deadline) => {
                let completion = (wave_index as f64 + 1.0) * TIME_PER_WAVE;
                (completion - deadline as f64).max(0.0) * self.deadline_weight
            }
            None => 0.0,
        }
    }

    /// The global objective for a candidate assignment: per-pair costs,
    /// deadline penalties from the wave layout, context-affinity bonuses
    /// for same-agent dependency edges, and the quadratic budget overrun.
    ///
    /// Returns `f64::INFINITY` when any bound pair is infeasible or any
    /// intent is unassigned, so invalid candidates always lose comparisons.
    pub fn objective(
        &self,
        graph: &IntentGraph,
        pool: &AgentPool,
        assignment: &Assignment,
        wave_of: &HashMap<String, usize>,
    ) -> f64 {
        let mut total = 0.0;
        let mut dollars = 0.0;

        for intent in graph.iter() {
            let agent = match assignment.agent_for(&intent.id).and_then(|n| pool.get(n)) {
                Some(agent) => agent,
                None => return f64::INFINITY,
            };
            let pair = match self.pair_cost(intent, agent) {
                Some(cost) => cost,
                None => return f64::INFINITY,
            };
            total += pair;
            dollars += Self::token_cost(intent, agent);

            if let Some(&wave) = wave_of.get(&intent.id) {
                total += self.deadline_penalty(intent, wave);
            }

            for dep in &intent.depends {
                if assignment.agent_for(dep) == Some(agent.name.as_str()) {
                    total -= self.context_bonus;
                }
            }
        }

        if let Some(cap) = self.budget_cap {
            let overrun = (dollars - cap).max(0.0);
            total += overrun * overrun;
        }

        total
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
