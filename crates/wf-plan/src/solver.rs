//! Assignment solving — bind every intent to one agent, minimizing the
//! token-based objective under capability, quality-floor, and capacity
//! constraints.
//!
//! Three strategies sit behind one entry point, selected from problem size
//! and dependency density:
//! - a greedy pass for small, sparse problems (also the feasibility oracle
//!   and the incumbent seed for the search),
//! - depth-first branch-and-bound in topological order with best-known
//!   pruning for mid-sized problems, bounded by the configured wall clock,
//! - sequential connected-component decomposition at large scale, threading
//!   remaining capacity between sub-solves so the global capacity invariant
//!   still holds.
//!
//! The solver is deterministic: identical inputs produce identical output.
//! Objective ties prefer assignments using fewer distinct agents, then
//! lexicographically smaller agent names.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use wf_core::config::RoutingConfig;
use wf_core::cost::CostModel;
use wf_core::graph::IntentGraph;
use wf_core::registry::AgentPool;
use wf_core::types::{Agent, Assignment};

use crate::waves;

/// Above this intent count (or dependency density) the greedy baseline
/// alone is not acceptable and the search runs.
const GREEDY_MAX_INTENTS: usize = 500;
const GREEDY_MAX_DEP_DENSITY: f64 = 0.01;

/// Above this intent count the problem is split by connected component.
const COMPONENT_SPLIT_THRESHOLD: usize = 5_000;

/// Objective comparisons treat differences below this as ties.
const OBJECTIVE_EPS: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Error / report types
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SolveError {
    /// No feasible assignment exists; lists every intent that could not be
    /// bound (capability/quality gap or exhausted capacity).
    #[error("no feasible assignment for {} intent(s): {}", intents.len(), intents.join(", "))]
    Infeasible { intents: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStrategy {
    Greedy,
    BranchAndBound,
    Decomposed,
}

/// What the solver achieved and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Full objective of the returned assignment (token + overkill +
    /// latency + deadline − affinity + budget overrun).
    pub objective: f64,
    pub wall_time_ms: u64,
    /// True when the search exhausted the space within budget; greedy and
    /// decomposed results are feasible but never proven optimal.
    pub proven_optimal: bool,
    /// True when the wall-clock budget expired mid-search; the returned
    /// assignment is the best found so far.
    pub time_limit_hit: bool,
    pub strategy: SolveStrategy,
    pub distinct_agents: usize,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Solve the assignment problem for a partitioned graph.
///
/// `wave_layout` must come from [`waves::partition`] over the same graph;
/// it supplies deadline timing and the topological search order.
pub fn solve(
    graph: &IntentGraph,
    pool: &AgentPool,
    wave_layout: &[Vec<String>],
    config: &RoutingConfig,
) -> Result<(Assignment, SolveReport), SolveError> {
    let start = Instant::now();
    let model = CostModel::new(config);
    let wave_of = waves::wave_index(wave_layout);

    if graph.is_empty() {
        return Ok((
            Assignment::new(),
            SolveReport {
                objective: 0.0,
                wall_time_ms: 0,
                proven_optimal: true,
                time_limit_hit: false,
                strategy: SolveStrategy::Greedy,
                distinct_agents: 0,
            },
        ));
    }

    let problem = Problem::build(graph, pool, wave_layout, &model, config)?;
    let budget = Duration::from_secs_f64(config.solver_time_limit_secs);

    let n = graph.len();
    let density = graph.edge_count() as f64 / (n as f64 * n as f64);

    let (assignment, strategy, proven_optimal, time_limit_hit) =
        if n > COMPONENT_SPLIT_THRESHOLD {
            debug!(intents = n, "solving by component decomposition");
            let (assignment, timed_out) = problem.solve_by_components(start, budget)?;
            (assignment, SolveStrategy::Decomposed, false, timed_out)
        } else if n <= GREEDY_MAX_INTENTS && density <= GREEDY_MAX_DEP_DENSITY {
            debug!(intents = n, density, "solving with greedy pass");
            match problem.greedy_all() {
                Ok(assignment) => (assignment, SolveStrategy::Greedy, false, false),
                // Greedy can miss feasible layouts when capacity is tight;
                // fall through to the search before declaring infeasibility.
                Err(_) => {
                    let outcome = problem.search_all(start, budget)?;
                    (
                        outcome.assignment,
                        SolveStrategy::BranchAndBound,
                        !outcome.timed_out,
                        outcome.timed_out,
                    )
                }
            }
        } else {
            debug!(intents = n, density, "solving with branch-and-bound");
            let outcome = problem.search_all(start, budget)?;
            (
                outcome.assignment,
                SolveStrategy::BranchAndBound,
                !outcome.timed_out,
                outcome.timed_out,
            )
        };

    if time_limit_hit {
        warn!(
            limit_secs = config.solver_time_limit_secs,
            "solver time budget exhausted; returning best feasible assignment"
        );
    }

    let objective = model.objective(graph, pool, &assignment, &wave_of);
    let report = SolveReport {
        objective,
        wall_time_ms: start.elapsed().as_millis() as u64,
        proven_optimal,
        time_limit_hit,
        strategy,
        distinct_agents: assignment.agents_used().len(),
    };
    info!(
        intents = n,
        agents = report.distinct_agents,
        objective = report.objective,
        strategy = ?report.strategy,
        "assignment solved"
    );
    Ok((assignment, report))
}

// ---------------------------------------------------------------------------
// Problem — precomputed candidate lists in topological order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Candidate {
    agent: usize,
    cost: f64,
}

struct Problem<'a> {
    graph: &'a IntentGraph,
    model: &'a CostModel,
    /// Pool agents in registry order; `Candidate::agent` indexes this.
    agents: Vec<&'a Agent>,
    /// Intent ids flattened from the wave layout: topological, ids sorted
    /// within a wave. Predecessors always precede dependents.
    order: Vec<&'a str>,
    /// Per-position feasible candidates, ascending by (cost, agent name).
    candidates: Vec<Vec<Candidate>>,
    /// Per-position predecessor positions.
    preds: Vec<Vec<usize>>,
    context_bonus: f64,
    budget_cap: Option<f64>,
}

struct SearchOutcome {
    assignment: Assignment,
    timed_out: bool,
}

impl<'a> Problem<'a> {
    fn build(
        graph: &'a IntentGraph,
        pool: &'a AgentPool,
        wave_layout: &'a [Vec<String>],
        model: &'a CostModel,
        config: &RoutingConfig,
    ) -> Result<Self, SolveError> {
        let agents: Vec<&Agent> = pool.iter().collect();
        let agent_index: HashMap<&str, usize> = agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.as_str(), i))
            .collect();

        let order: Vec<&str> = wave_layout
            .iter()
            .flat_map(|wave| wave.iter().map(String::as_str))
            .collect();
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut candidates = Vec::with_capacity(order.len());
        let mut preds = Vec::with_capacity(order.len());
        let mut no_candidates: Vec<String> = Vec::new();

        for &id in &order {
            let intent = graph.get(id).expect("order ids come from the graph");
            let floor = model.effective_floor(intent);
            let mut feasible: Vec<Candidate> = pool
                .capable_of(intent, floor)
                .into_iter()
                .filter_map(|agent| {
                    model.pair_cost(intent, agent).map(|cost| Candidate {
                        agent: agent_index[agent.name.as_str()],
                        cost,
                    })
                })
                .collect();
            // capable_of is name-sorted; a stable sort on cost keeps name
            // order inside equal-cost groups.
            feasible.sort_by(|a, b| {
                a.cost
                    .partial_cmp(&b.cost)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            if feasible.is_empty() {
                no_candidates.push(id.to_owned());
            }
            candidates.push(feasible);
            preds.push(
                intent
                    .depends
                    .iter()
                    .map(|d| position[d.as_str()])
                    .collect(),
            );
        }

        if !no_candidates.is_empty() {
            no_candidates.sort_unstable();
            return Err(SolveError::Infeasible {
                intents: no_candidates,
            });
        }

        Ok(Self {
            graph,
            model,
            agents,
            order,
            candidates,
            preds,
            context_bonus: config.context_bonus,
            budget_cap: config.budget_cap,
        })
    }

    fn greedy_all(&self) -> Result<Assignment, Vec<String>> {
        let subset: Vec<usize> = (0..self.order.len()).collect();
        self.greedy_subset(&subset, &mut vec![0; self.agents.len()])
    }

    fn search_all(&self, start: Instant, budget: Duration) -> Result<SearchOutcome, SolveError> {
        let subset: Vec<usize> = (0..self.order.len()).collect();
        self.branch_and_bound(&subset, &mut vec![0; self.agents.len()], start, budget)
    }

    /// Greedy pass over `subset` (positions): descending complexity, then
    /// id; cheapest candidate with remaining capacity; on equal cost prefer
    /// an agent already in use, then the smaller name.
    fn greedy_subset(
        &self,
        subset: &[usize],
        load: &mut [usize],
    ) -> Result<Assignment, Vec<String>> {
        let mut by_complexity: Vec<usize> = subset.to_vec();
        by_complexity.sort_by(|&a, &b| {
            let ia = self
                .graph
                .get(self.order[a])
                .expect("order ids come from the graph");
            let ib = self
                .graph
                .get(self.order[b])
                .expect("order ids come from the graph");
            ib.complexity
                .cmp(&ia.complexity)
                .then_with(|| ia.id.cmp(&ib.id))
        });

        let mut assignment = Assignment::new();
        let mut used: HashSet<usize> = HashSet::new();
        let mut unassigned: Vec<String> = Vec::new();

        for pos in by_complexity {
            let mut best: Option<&Candidate> = None;
            for candidate in &self.candidates[pos] {
                if load[candidate.agent] >= self.agents[candidate.agent].capacity {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some(current) => {
                        candidate.cost + OBJECTIVE_EPS < current.cost
                            || ((candidate.cost - current.cost).abs() <= OBJECTIVE_EPS
                                && used.contains(&candidate.agent)
                                && !used.contains(&current.agent))
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
            match best {
                Some(candidate) => {
                    load[candidate.agent] += 1;
                    used.insert(candidate.agent);
                    assignment.bind(self.order[pos], &self.agents[candidate.agent].name);
                }
                None => unassigned.push(self.order[pos].to_owned()),
            }
        }

        if unassigned.is_empty() {
            Ok(assignment)
        } else {
            unassigned.sort_unstable();
            Err(unassigned)
        }
    }

    /// Depth-first branch-and-bound over `subset` (positions, already in
    /// topological order). `load` carries capacity consumed by earlier
    /// sub-solves and, on success, is updated with this solve's choices.
    fn branch_and_bound(
        &self,
        subset: &[usize],
        load: &mut [usize],
        start: Instant,
        budget: Duration,
    ) -> Result<SearchOutcome, SolveError> {
        // Admissible suffix bound: each remaining intent costs at least its
        // cheapest candidate minus the largest affinity credit it can earn.
        let mut suffix_bound = vec![0.0; subset.len() + 1];
        for (i, &pos) in subset.iter().enumerate().rev() {
            let min_cost = self.candidates[pos]
                .first()
                .map(|c| c.cost)
                .unwrap_or(f64::INFINITY);
            let max_credit = self.context_bonus * self.preds[pos].len() as f64;
            suffix_bound[i] = suffix_bound[i + 1] + min_cost - max_credit;
        }

        // Seed the incumbent with the greedy solution when one exists.
        let mut incumbent: Option<(f64, Assignment)> = {
            let mut probe = load.to_vec();
            self.greedy_subset(subset, &mut probe)
                .ok()
                .map(|a| (self.subset_objective(subset, &a), a))
        };

        let mut state = Search {
            subset,
            suffix_bound: &suffix_bound,
            assigned: vec![usize::MAX; self.order.len()],
            incumbent,
            start,
            budget,
            timed_out: false,
        };
        self.dfs(&mut state, 0, 0.0, load);
        incumbent = state.incumbent;

        match incumbent {
            Some((_, assignment)) => {
                for &pos in subset {
                    let name = assignment
                        .agent_for(self.order[pos])
                        .expect("complete assignment covers the subset");
                    let idx = self
                        .agents
                        .iter()
                        .position(|a| a.name == name)
                        .expect("assignment uses pool agents");
                    load[idx] += 1;
                }
                Ok(SearchOutcome {
                    assignment,
                    timed_out: state.timed_out,
                })
            }
            None => Err(SolveError::Infeasible {
                intents: subset
                    .iter()
                    .map(|&pos| self.order[pos].to_owned())
                    .collect(),
            }),
        }
    }

    fn dfs(&self, state: &mut Search<'_>, depth: usize, running: f64, load: &mut [usize]) {
        if state.timed_out {
            return;
        }
        if state.start.elapsed() > state.budget {
            state.timed_out = true;
            return;
        }

        if depth == state.subset.len() {
            let assignment = self.materialize(state);
            let objective = self.subset_objective(state.subset, &assignment);
            let better = match &state.incumbent {
                None => true,
                Some((best, best_assignment)) => {
                    objective + OBJECTIVE_EPS < *best
                        || ((objective - *best).abs() <= OBJECTIVE_EPS
                            && prefer_on_tie(&assignment, best_assignment))
                }
            };
            if better {
                state.incumbent = Some((objective, assignment));
            }
            return;
        }

        // Prune only when the bound says this subtree is strictly worse;
        // equal-cost subtrees stay open for the tie-break rules.
        if let Some((best, _)) = &state.incumbent {
            if running + state.suffix_bound[depth] > *best + OBJECTIVE_EPS {
                return;
            }
        }

        let pos = state.subset[depth];
        for c in 0..self.candidates[pos].len() {
            let candidate = self.candidates[pos][c];
            if load[candidate.agent] >= self.agents[candidate.agent].capacity {
                continue;
            }
            let credit = self.preds[pos]
                .iter()
                .filter(|&&p| state.assigned[p] == candidate.agent)
                .count() as f64
                * self.context_bonus;

            load[candidate.agent] += 1;
            state.assigned[pos] = candidate.agent;
            self.dfs(state, depth + 1, running + candidate.cost - credit, load);
            state.assigned[pos] = usize::MAX;
            load[candidate.agent] -= 1;
            if state.timed_out {
                return;
            }
        }
    }

    fn materialize(&self, state: &Search<'_>) -> Assignment {
        let mut assignment = Assignment::new();
        for &pos in state.subset {
            assignment.bind(self.order[pos], &self.agents[state.assigned[pos]].name);
        }
        assignment
    }

    /// Search objective over a subset: pair costs minus affinity credits
    /// plus the budget overrun. Deadline penalties are constant under a
    /// fixed wave layout and are excluded here; they reappear in the
    /// reported objective.
    fn subset_objective(&self, subset: &[usize], assignment: &Assignment) -> f64 {
        let mut total = 0.0;
        let mut dollars = 0.0;
        for &pos in subset {
            let id = self.order[pos];
            let intent = self.graph.get(id).expect("order ids come from the graph");
            let name = assignment.agent_for(id).expect("subset is assigned");
            let agent = self.agents[self
                .agents
                .iter()
                .position(|a| a.name == name)
                .expect("assignment uses pool agents")];
            total += self
                .model
                .pair_cost(intent, agent)
                .expect("assigned pairs are feasible");
            dollars += CostModel::token_cost(intent, agent);
            for dep in &intent.depends {
                if assignment.agent_for(dep) == Some(name) {
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

    /// Solve each connected component independently but sequentially, so
    /// capacity consumed by one component is visible to the next.
    fn solve_by_components(
        &self,
        start: Instant,
        budget: Duration,
    ) -> Result<(Assignment, bool), SolveError> {
        let components = self.graph.connected_components();
        let per_component = budget
            .checked_div(components.len().max(1) as u32)
            .unwrap_or(budget);

        let mut load = vec![0usize; self.agents.len()];
        let mut merged = Assignment::new();
        let mut timed_out = false;

        let member_position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        for component in components {
            let mut subset: Vec<usize> = component
                .iter()
                .map(|id| member_position[id.as_str()])
                .collect();
            subset.sort_unstable();

            let deadline = start.elapsed() + per_component;
            let outcome = self.branch_and_bound(&subset, &mut load, start, deadline)?;
            timed_out |= outcome.timed_out;
            for (id, agent) in outcome.assignment.iter() {
                merged.bind(id, agent);
            }
        }
        Ok((merged, timed_out))
    }
}

struct Search<'a> {
    subset: &'a [usize],
    suffix_bound: &'a [f64],
    /// Agent index chosen per global position; `usize::MAX` = unassigned.
    assigned: Vec<usize>,
    incumbent: Option<(f64, Assignment)>,
    start: Instant,
    budget: Duration,
    timed_out: bool,
}

/// Tie-break between equal-objective assignments: fewer distinct agents,
/// then the lexicographically smaller sorted agent-name list.
fn prefer_on_tie(candidate: &Assignment, best: &Assignment) -> bool {
    let candidate_agents = candidate.agents_used();
    let best_agents = best.agents_used();
    match candidate_agents.len().cmp(&best_agents.len()) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => candidate_agents < best_agents,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
