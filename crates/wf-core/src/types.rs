use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

/// Ordered complexity tiers for a unit of work.
///
/// The ordering matters: escalation and solver heuristics treat later tiers
/// as strictly harder than earlier ones.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Complexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
    VeryComplex,
    Epic,
}

impl Complexity {
    /// All tiers in ascending order.
    pub const ALL: [Complexity; 6] = [
        Complexity::Trivial,
        Complexity::Simple,
        Complexity::Moderate,
        Complexity::Complex,
        Complexity::VeryComplex,
        Complexity::Epic,
    ];

    /// Default token estimate for an intent of this tier, used when the
    /// ingestion boundary supplies no explicit estimate.
    pub fn default_tokens(self) -> u64 {
        match self {
            Complexity::Trivial => 500,
            Complexity::Simple => 1_500,
            Complexity::Moderate => 5_000,
            Complexity::Complex => 12_000,
            Complexity::VeryComplex => 25_000,
            Complexity::Epic => 60_000,
        }
    }

    /// Fibonacci story points for this tier (reporting only — the cost
    /// objective stays token-based).
    pub fn story_points(self) -> u32 {
        match self {
            Complexity::Trivial => 1,
            Complexity::Simple => 2,
            Complexity::Moderate => 3,
            Complexity::Complex => 5,
            Complexity::VeryComplex => 8,
            Complexity::Epic => 13,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Trivial => "trivial",
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::VeryComplex => "very-complex",
            Complexity::Epic => "epic",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// The closed set of agent roles an intent can be routed to.
///
/// Profiles classify the *kind* of work; they never name a concrete agent.
/// The solver binds a profile-tagged intent to one agent from the pool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    Implementer,
    UnitTester,
    TestEngineer,
    DocWriter,
    Reviewer,
    BugInvestigator,
    Planner,
}

impl Profile {
    pub const ALL: [Profile; 7] = [
        Profile::Implementer,
        Profile::UnitTester,
        Profile::TestEngineer,
        Profile::DocWriter,
        Profile::Reviewer,
        Profile::BugInvestigator,
        Profile::Planner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Implementer => "implementer",
            Profile::UnitTester => "unit-tester",
            Profile::TestEngineer => "test-engineer",
            Profile::DocWriter => "doc-writer",
            Profile::Reviewer => "reviewer",
            Profile::BugInvestigator => "bug-investigator",
            Profile::Planner => "planner",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// One atomic unit of work, immutable once handed to the planner.
///
/// Intents arrive from an upstream decomposer or ticket adapter already
/// normalized to this shape; ids are unique within a planning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub complexity: Complexity,
    /// Minimum acceptable agent quality, in `[0, 1]`.
    pub quality_floor: f64,
    pub estimated_tokens: u64,
    /// Deadline as a wave-timestep index. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u32>,
    /// Ids of intents that must complete before this one starts.
    #[serde(default)]
    pub depends: Vec<String>,
    /// Free-form tags consumed by the profile router.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional pipeline-stage label from the ingestion boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl Intent {
    /// Create an intent with tier-default token estimate and a 0.5 floor.
    pub fn new(id: impl Into<String>, complexity: Complexity) -> Self {
        Self {
            id: id.into(),
            complexity,
            quality_floor: 0.5,
            estimated_tokens: complexity.default_tokens(),
            deadline: None,
            depends: Vec::new(),
            tags: Vec::new(),
            stage: None,
        }
    }

    pub fn with_quality_floor(mut self, floor: f64) -> Self {
        self.quality_floor = floor;
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    pub fn with_deadline(mut self, deadline: u32) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_depends(mut self, depends: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Story points derived from the complexity tier.
    pub fn story_points(&self) -> u32 {
        self.complexity.story_points()
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// One worker in the pool, immutable for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    /// Model family tag, e.g. `"claude"` or `"llama3.1-8b"`. Profiles admit
    /// agents by family, never by name.
    pub model_family: String,
    /// Quality score in `[0, 1]`.
    pub quality: f64,
    /// Cost per token. Zero marks a local/free agent.
    pub token_rate: f64,
    /// Complexity tiers this agent may serve.
    pub capabilities: Vec<Complexity>,
    /// Maximum number of intents this agent may be bound to.
    pub capacity: usize,
    /// Relative dispatch latency; only meaningful as a tie-breaker.
    pub latency: f64,
    pub is_local: bool,
}

impl Agent {
    pub fn new(name: impl Into<String>, model_family: impl Into<String>, quality: f64) -> Self {
        Self {
            name: name.into(),
            model_family: model_family.into(),
            quality,
            token_rate: 0.0,
            capabilities: Complexity::ALL.to_vec(),
            capacity: 1,
            latency: 0.0,
            is_local: true,
        }
    }

    pub fn with_token_rate(mut self, rate: f64) -> Self {
        self.token_rate = rate;
        self.is_local = rate == 0.0;
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Complexity>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    /// Whether this agent covers the intent's complexity tier.
    pub fn covers(&self, complexity: Complexity) -> bool {
        self.capabilities.contains(&complexity)
    }

    /// Hard feasibility check: capability covers the tier and quality meets
    /// the floor. The cost model returns no cost for pairs failing this.
    pub fn can_serve(&self, intent: &Intent) -> bool {
        self.covers(intent.complexity) && self.quality >= intent.quality_floor
    }

    /// Estimated tokens processed per timestep for this agent's family.
    ///
    /// A fixed per-family constant; used only for critical-path duration
    /// estimates, so precision matters less than stability.
    pub fn throughput(&self) -> f64 {
        let family = self.model_family.to_ascii_lowercase();
        if self.is_local {
            400.0
        } else if family.starts_with("claude") {
            1_500.0
        } else if family.starts_with("gemini") {
            2_000.0
        } else {
            1_000.0
        }
    }
}

// ---------------------------------------------------------------------------
// ResultStatus / IntentResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Failed,
    InProgress,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResultStatus::Completed => "completed",
            ResultStatus::Failed => "failed",
            ResultStatus::InProgress => "in_progress",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of one attempt to execute an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent_id: String,
    pub profile: Profile,
    /// Name of the concrete agent that ran the attempt.
    pub agent: String,
    pub status: ResultStatus,
    /// Quality score in `[0, 1]`.
    pub quality_score: f64,
    pub tests_passed: bool,
    /// Change in coverage; zero for non-test intents.
    pub coverage_delta: f64,
    /// Opaque artifact references: PR URLs, branch names, file paths.
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentResult {
    /// A failed result carrying only an error description. Backend dispatch
    /// errors are normalized through this before entering the retry path.
    pub fn failure(
        intent_id: impl Into<String>,
        profile: Profile,
        agent: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            intent_id: intent_id.into(),
            profile,
            agent: agent.into(),
            status: ResultStatus::Failed,
            quality_score: 0.0,
            tests_passed: false,
            coverage_delta: 0.0,
            artifacts: Vec::new(),
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// A binding of intent ids to agent names.
///
/// Backed by a `BTreeMap` so iteration order (and therefore serialization
/// and reporting) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment(std::collections::BTreeMap<String, String>);

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, intent_id: impl Into<String>, agent: impl Into<String>) {
        self.0.insert(intent_id.into(), agent.into());
    }

    pub fn agent_for(&self, intent_id: &str) -> Option<&str> {
        self.0.get(intent_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(i, a)| (i.as_str(), a.as_str()))
    }

    /// Distinct agent names used, sorted.
    pub fn agents_used(&self) -> Vec<&str> {
        let mut agents: Vec<&str> = self.0.values().map(String::as_str).collect();
        agents.sort_unstable();
        agents.dedup();
        agents
    }

    /// Number of intents bound to `agent`.
    pub fn load_on(&self, agent: &str) -> usize {
        self.0.values().filter(|a| a.as_str() == agent).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_ordering() {
        assert!(Complexity::Trivial < Complexity::Simple);
        assert!(Complexity::VeryComplex < Complexity::Epic);
        let mut tiers = vec![Complexity::Epic, Complexity::Trivial, Complexity::Moderate];
        tiers.sort();
        assert_eq!(
            tiers,
            vec![Complexity::Trivial, Complexity::Moderate, Complexity::Epic]
        );
    }

    #[test]
    fn complexity_serde_kebab_case() {
        let json = serde_json::to_string(&Complexity::VeryComplex).unwrap();
        assert_eq!(json, "\"very-complex\"");
        let back: Complexity = serde_json::from_str("\"very-complex\"").unwrap();
        assert_eq!(back, Complexity::VeryComplex);
    }

    #[test]
    fn story_points_are_fibonacci() {
        let points: Vec<u32> = Complexity::ALL.iter().map(|c| c.story_points()).collect();
        assert_eq!(points, vec![1, 2, 3, 5, 8, 13]);
    }

    #[test]
    fn default_tokens_increase_with_tier() {
        let tokens: Vec<u64> = Complexity::ALL.iter().map(|c| c.default_tokens()).collect();
        for pair in tokens.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn intent_builder() {
        let intent = Intent::new("auth-3-session-store", Complexity::Moderate)
            .with_quality_floor(0.7)
            .with_depends(["auth-1-requirements"])
            .with_tags(["backend", "session"])
            .with_deadline(2);
        assert_eq!(intent.estimated_tokens, 5_000);
        assert_eq!(intent.story_points(), 3);
        assert_eq!(intent.deadline, Some(2));
        assert_eq!(intent.depends, vec!["auth-1-requirements"]);
    }

    #[test]
    fn agent_can_serve_checks_capability_and_quality() {
        let agent = Agent::new("phi3-mini", "phi3", 0.45)
            .with_capabilities([Complexity::Trivial, Complexity::Simple]);
        let easy = Intent::new("t1", Complexity::Trivial).with_quality_floor(0.4);
        let hard = Intent::new("t2", Complexity::Complex).with_quality_floor(0.4);
        let picky = Intent::new("t3", Complexity::Trivial).with_quality_floor(0.9);

        assert!(agent.can_serve(&easy));
        assert!(!agent.can_serve(&hard));
        assert!(!agent.can_serve(&picky));
    }

    #[test]
    fn agent_token_rate_marks_locality() {
        let cloud = Agent::new("claude-0", "claude", 0.95).with_token_rate(0.00002);
        let local = Agent::new("codellama-7b", "codellama", 0.7).with_token_rate(0.0);
        assert!(!cloud.is_local);
        assert!(local.is_local);
    }

    #[test]
    fn profile_serde_kebab_case() {
        let json = serde_json::to_string(&Profile::BugInvestigator).unwrap();
        assert_eq!(json, "\"bug-investigator\"");
        assert_eq!(Profile::ALL.len(), 7);
    }

    #[test]
    fn intent_result_failure_shape() {
        let result = IntentResult::failure("t1", Profile::Implementer, "gemini-0", "boom");
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.quality_score, 0.0);
        assert!(!result.tests_passed);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn assignment_load_and_agents_used() {
        let mut assignment = Assignment::new();
        assignment.bind("a", "cheap");
        assignment.bind("b", "cheap");
        assignment.bind("c", "pricey");
        assert_eq!(assignment.load_on("cheap"), 2);
        assert_eq!(assignment.agents_used(), vec!["cheap", "pricey"]);
        assert_eq!(assignment.agent_for("b"), Some("cheap"));
        assert_eq!(assignment.agent_for("zzz"), None);
    }

    #[test]
    fn intent_round_trips_through_json() {
        let intent = Intent::new("parse-7-at-rules", Complexity::Moderate)
            .with_tags(["parsing"])
            .with_stage("parsing");
        let json = serde_json::to_string(&intent).unwrap();
        let back: Intent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, intent);
    }
}
