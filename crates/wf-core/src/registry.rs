use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::{Agent, Intent, Profile};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent pool is empty")]
    EmptyPool,
    #[error("duplicate agent name: `{0}`")]
    DuplicateAgent(String),
    #[error("agent not found: `{0}`")]
    AgentNotFound(String),
}

// ---------------------------------------------------------------------------
// ProfileMatrix — which model families may serve each role
// ---------------------------------------------------------------------------

/// Maps each profile to the model families allowed to serve it.
///
/// Profiles admit families, never concrete agents; the solver and the
/// executor's escalation ladder consult this when narrowing the pool. The
/// default matrix is permissive (any family serves any role) — deployments
/// with a curated pool register their own rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileMatrix {
    families: BTreeMap<Profile, BTreeSet<String>>,
}

impl ProfileMatrix {
    /// A matrix with no restrictions.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Allow `family` to serve `profile`. The first call for a profile
    /// switches that profile from permissive to restricted.
    pub fn allow(mut self, profile: Profile, family: impl Into<String>) -> Self {
        self.families.entry(profile).or_default().insert(family.into());
        self
    }

    /// Whether `family` may serve `profile`. Profiles with no registered
    /// row accept every family.
    pub fn permits(&self, profile: Profile, family: &str) -> bool {
        match self.families.get(&profile) {
            Some(allowed) => allowed.contains(family),
            None => true,
        }
    }

    /// Families registered for `profile`, or `None` when permissive.
    pub fn families_for(&self, profile: Profile) -> Option<&BTreeSet<String>> {
        self.families.get(&profile)
    }
}

// ---------------------------------------------------------------------------
// AgentPool
// ---------------------------------------------------------------------------

/// The static pool of agents for one planning session.
///
/// Built once at session start; immutable afterwards and safe for
/// concurrent reads. Lookup is by unique agent name.
#[derive(Debug, Clone)]
pub struct AgentPool {
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
    matrix: ProfileMatrix,
}

impl AgentPool {
    pub fn new(agents: Vec<Agent>) -> Result<Self, RegistryError> {
        if agents.is_empty() {
            return Err(RegistryError::EmptyPool);
        }
        let mut index = HashMap::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            if index.insert(agent.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateAgent(agent.name.clone()));
            }
        }
        debug!(agents = agents.len(), "agent pool built");
        Ok(Self {
            agents,
            index,
            matrix: ProfileMatrix::permissive(),
        })
    }

    /// Replace the profile/family matrix.
    pub fn with_matrix(mut self, matrix: ProfileMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn matrix(&self) -> &ProfileMatrix {
        &self.matrix
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.index.get(name).map(|&i| &self.agents[i])
    }

    pub fn require(&self, name: &str) -> Result<&Agent, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::AgentNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    /// Agent names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Sum of all agent capacities.
    pub fn total_capacity(&self) -> usize {
        self.agents.iter().map(|a| a.capacity).sum()
    }

    /// Agents able to serve `intent` at or above `floor`, sorted by name
    /// for deterministic downstream iteration.
    pub fn capable_of(&self, intent: &Intent, floor: f64) -> Vec<&Agent> {
        let mut capable: Vec<&Agent> = self
            .agents
            .iter()
            .filter(|a| a.covers(intent.complexity) && a.quality >= floor)
            .collect();
        capable.sort_by(|a, b| a.name.cmp(&b.name));
        capable
    }

    /// Agents whose family may serve `profile`, in descending quality order
    /// (name-ascending within equal quality). This is the escalation ladder:
    /// index 0 is the strongest agent for the role.
    pub fn ladder(&self, profile: Profile) -> Vec<&Agent> {
        let mut serving: Vec<&Agent> = self
            .agents
            .iter()
            .filter(|a| self.matrix.permits(profile, &a.model_family))
            .collect();
        serving.sort_by(|a, b| {
            b.quality
                .partial_cmp(&a.quality)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        serving
    }

    /// The next agent up the ladder from `current` for `profile`: the
    /// weakest agent still strictly stronger than `current`. Returns `None`
    /// when `current` already tops the ladder.
    pub fn next_higher(&self, profile: Profile, current: &str) -> Option<&Agent> {
        let current_quality = self.get(current)?.quality;
        self.ladder(profile)
            .into_iter()
            .rev()
            .find(|a| a.quality > current_quality)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Complexity;

    fn agent(name: &str, family: &str, quality: f64) -> Agent {
        Agent::new(name, family, quality).with_capacity(2)
    }

    fn pool() -> AgentPool {
        AgentPool::new(vec![
            agent("claude-0", "claude", 0.95),
            agent("gemini-0", "gemini", 0.88),
            agent("kimi-0", "kimi", 0.85),
            agent("codellama-7b", "codellama", 0.70),
        ])
        .unwrap()
    }

    #[test]
    fn empty_pool_rejected() {
        assert_eq!(AgentPool::new(vec![]).unwrap_err(), RegistryError::EmptyPool);
    }

    #[test]
    fn duplicate_name_rejected() {
        let err = AgentPool::new(vec![
            agent("dup", "claude", 0.9),
            agent("dup", "gemini", 0.8),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAgent("dup".into()));
    }

    #[test]
    fn lookup_by_name() {
        let pool = pool();
        assert_eq!(pool.get("gemini-0").unwrap().quality, 0.88);
        assert!(pool.get("missing").is_none());
        assert!(matches!(
            pool.require("missing"),
            Err(RegistryError::AgentNotFound(_))
        ));
    }

    #[test]
    fn capable_of_filters_and_sorts() {
        let pool = AgentPool::new(vec![
            agent("small", "phi3", 0.45)
                .with_capabilities([Complexity::Trivial, Complexity::Simple]),
            agent("big", "claude", 0.95),
        ])
        .unwrap();

        let hard = Intent::new("h", Complexity::Complex).with_quality_floor(0.5);
        let capable = pool.capable_of(&hard, hard.quality_floor);
        assert_eq!(capable.len(), 1);
        assert_eq!(capable[0].name, "big");

        let easy = Intent::new("e", Complexity::Trivial).with_quality_floor(0.4);
        let capable = pool.capable_of(&easy, easy.quality_floor);
        let names: Vec<&str> = capable.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["big", "small"]);
    }

    #[test]
    fn ladder_descends_by_quality() {
        let pool = pool();
        let ladder = pool.ladder(Profile::Implementer);
        let names: Vec<&str> = ladder.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["claude-0", "gemini-0", "kimi-0", "codellama-7b"]);
    }

    #[test]
    fn ladder_respects_matrix() {
        let matrix = ProfileMatrix::permissive()
            .allow(Profile::Reviewer, "claude")
            .allow(Profile::Reviewer, "gemini");
        let pool = pool().with_matrix(matrix);

        let names: Vec<&str> = pool
            .ladder(Profile::Reviewer)
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["claude-0", "gemini-0"]);

        // Unregistered profiles stay permissive.
        assert_eq!(pool.ladder(Profile::Implementer).len(), 4);
    }

    #[test]
    fn next_higher_climbs_one_rung() {
        let pool = pool();
        let next = pool.next_higher(Profile::Implementer, "codellama-7b").unwrap();
        assert_eq!(next.name, "kimi-0");
        let next = pool.next_higher(Profile::Implementer, "kimi-0").unwrap();
        assert_eq!(next.name, "gemini-0");
        assert!(pool.next_higher(Profile::Implementer, "claude-0").is_none());
    }

    #[test]
    fn total_capacity_sums() {
        assert_eq!(pool().total_capacity(), 8);
    }

    #[test]
    fn matrix_permits_by_default() {
        let matrix = ProfileMatrix::permissive();
        assert!(matrix.permits(Profile::Planner, "anything"));
        let matrix = matrix.allow(Profile::Planner, "claude");
        assert!(matrix.permits(Profile::Planner, "claude"));
        assert!(!matrix.permits(Profile::Planner, "anything"));
    }
}
