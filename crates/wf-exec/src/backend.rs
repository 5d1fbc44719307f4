//! The execution backend boundary.
//!
//! The executor needs exactly one operation from the outside world: run an
//! intent to completion (or terminal failure) and report what happened.
//! [`SimulatedBackend`] is the deterministic stand-in used by demos and
//! tests; real deployments implement [`ExecutionBackend`] over whatever
//! actually performs the work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::cancel::CancelSignal;
use wf_core::types::{IntentResult, Profile, ResultStatus};
use wf_plan::plan::IntentPlan;

// ---------------------------------------------------------------------------
// Contract types
// ---------------------------------------------------------------------------

/// A terminal dispatch failure. The executor converts these into failed
/// [`IntentResult`]s — they flow through the retry path, never escape it.
#[derive(Debug, Error)]
#[error("backend dispatch failed: {0}")]
pub struct BackendError(pub String);

/// Everything a backend needs to execute one attempt.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub wave: usize,
    /// Concrete agent chosen for this attempt (may differ from the plan
    /// after escalation).
    pub agent: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Artifact references collected from the intent's predecessors.
    pub predecessor_artifacts: Vec<String>,
    /// Cooperative cancellation handle; backends should poll or await it
    /// for long-running work.
    pub cancel: CancelSignal,
}

/// The single operation the core requires from the outside world.
///
/// `execute` blocks until the intent is complete or has failed terminally;
/// it is invoked concurrently from multiple tasks.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(
        &self,
        spec: &IntentPlan,
        ctx: &DispatchContext,
    ) -> Result<IntentResult, BackendError>;
}

// ---------------------------------------------------------------------------
// SimulatedBackend
// ---------------------------------------------------------------------------

/// Controllable, seed-deterministic simulation of an execution backend.
///
/// Failures follow a base rate that decays with the attempt number, which
/// mirrors how retries behave against real flaky infrastructure. Quality
/// scores are normally distributed around `quality_mean`.
pub struct SimulatedBackend {
    failure_rate: f64,
    quality_mean: f64,
    quality_std: f64,
    rng: Mutex<StdRng>,
    pr_counter: AtomicU64,
}

impl SimulatedBackend {
    pub fn new(seed: u64) -> Self {
        Self {
            failure_rate: 0.15,
            quality_mean: 0.85,
            quality_std: 0.08,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            pr_counter: AtomicU64::new(100),
        }
    }

    /// Build from the session configuration, seeded with its
    /// `random_seed`.
    pub fn from_config(config: &wf_core::config::RoutingConfig) -> Self {
        Self::new(config.random_seed)
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    pub fn with_quality(mut self, mean: f64, std: f64) -> Self {
        self.quality_mean = mean;
        self.quality_std = std;
        self
    }

    /// Standard normal draw via Box–Muller.
    fn gauss(rng: &mut StdRng) -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    fn artifacts_for(profile: Profile, id: &str, pr: u64) -> Vec<String> {
        match profile {
            Profile::BugInvestigator => vec![
                format!("PR #{pr}"),
                format!("fix/{id}"),
                format!("tests/regression/{id}_test.rs"),
            ],
            Profile::Implementer => vec![
                format!("PR #{pr}"),
                format!("feature/{id}"),
                format!("src/{id}.rs"),
            ],
            Profile::TestEngineer => vec![
                format!("PR #{pr}"),
                format!("tests/{id}_test.rs"),
                "coverage-report.html".to_owned(),
            ],
            Profile::UnitTester => {
                vec![format!("PR #{pr}"), format!("tests/unit/{id}_test.rs")]
            }
            Profile::DocWriter => vec![
                format!("docs/{id}.md"),
                format!("PR #{pr}"),
                format!("docs/api/{id}-reference.md"),
            ],
            Profile::Planner => vec![
                format!("docs/design/{id}-plan.md"),
                format!("PR #{pr}"),
            ],
            Profile::Reviewer => vec![
                format!("PR #{pr} review"),
                format!("review-comments/{id}.md"),
            ],
        }
    }

    fn error_for(profile: Profile, rng: &mut StdRng) -> String {
        let pool: &[&str] = match profile {
            Profile::BugInvestigator => &[
                "could not reproduce the bug in the test environment",
                "regression test timed out after 30s",
            ],
            Profile::Implementer => &[
                "build failed: type mismatch at the interface boundary",
                "integration test failure in a dependent module",
            ],
            Profile::TestEngineer => &[
                "flaky test detected: non-deterministic ordering",
                "coverage tooling crashed on a large file",
            ],
            Profile::UnitTester => &[
                "mock setup error: unexpected call sequence",
                "assertion failure in an edge-case test",
            ],
            Profile::DocWriter => &[
                "markdown lint errors in generated docs",
                "broken internal links in the API reference",
            ],
            Profile::Planner => &[
                "plan validation failed: circular dependency in the proposal",
                "missing requirements traceability",
            ],
            Profile::Reviewer => &[
                "review blocked: merge conflicts on the PR",
                "static analysis found critical issues",
            ],
        };
        pool[rng.gen_range(0..pool.len())].to_owned()
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedBackend {
    async fn execute(
        &self,
        spec: &IntentPlan,
        ctx: &DispatchContext,
    ) -> Result<IntentResult, BackendError> {
        let mut rng = self.rng.lock().expect("simulated backend rng poisoned");

        // Retries succeed more often than first attempts.
        let effective_failure_rate = self.failure_rate / ctx.attempt.max(1) as f64;
        if rng.gen_range(0.0..1.0) < effective_failure_rate {
            return Ok(IntentResult {
                intent_id: spec.id.clone(),
                profile: spec.profile,
                agent: ctx.agent.clone(),
                status: ResultStatus::Failed,
                quality_score: 0.0,
                tests_passed: false,
                coverage_delta: 0.0,
                artifacts: Vec::new(),
                error: Some(Self::error_for(spec.profile, &mut rng)),
            });
        }

        let quality =
            (self.quality_mean + self.quality_std * Self::gauss(&mut rng)).clamp(0.0, 1.0);
        let coverage_delta = match spec.profile {
            Profile::TestEngineer => (0.05 + 0.02 * Self::gauss(&mut rng)).max(0.01),
            Profile::UnitTester => (0.05 + 0.02 * Self::gauss(&mut rng)).max(0.01),
            Profile::BugInvestigator => (0.02 + 0.01 * Self::gauss(&mut rng)).max(0.0),
            _ => 0.0,
        };
        drop(rng);

        let pr = self.pr_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IntentResult {
            intent_id: spec.id.clone(),
            profile: spec.profile,
            agent: ctx.agent.clone(),
            status: ResultStatus::Completed,
            quality_score: quality,
            tests_passed: true,
            coverage_delta,
            artifacts: Self::artifacts_for(spec.profile, &spec.id, pr),
            error: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::types::Complexity;

    fn spec(profile: Profile) -> IntentPlan {
        IntentPlan {
            id: "t1".into(),
            profile,
            model: "agent-0".into(),
            workflow: "git-pr".into(),
            complexity: Complexity::Simple,
            estimated_tokens: 1_500,
            estimated_cost: 0.0,
            depends_on: vec![],
            wave: 0,
        }
    }

    fn ctx(attempt: u32) -> DispatchContext {
        DispatchContext {
            wave: 0,
            agent: "agent-0".into(),
            attempt,
            predecessor_artifacts: vec![],
            cancel: CancelSignal::new(),
        }
    }

    #[tokio::test]
    async fn same_seed_same_results() {
        let a = SimulatedBackend::new(42);
        let b = SimulatedBackend::from_config(&wf_core::config::RoutingConfig::default());
        let ra = a.execute(&spec(Profile::Implementer), &ctx(1)).await.unwrap();
        let rb = b.execute(&spec(Profile::Implementer), &ctx(1)).await.unwrap();
        assert_eq!(ra.status, rb.status);
        assert_eq!(ra.quality_score, rb.quality_score);
    }

    #[tokio::test]
    async fn zero_failure_rate_always_completes() {
        let backend = SimulatedBackend::new(99).with_failure_rate(0.0);
        for _ in 0..20 {
            let result = backend
                .execute(&spec(Profile::Implementer), &ctx(1))
                .await
                .unwrap();
            assert_eq!(result.status, ResultStatus::Completed);
            assert!(result.tests_passed);
            assert!(!result.artifacts.is_empty());
        }
    }

    #[tokio::test]
    async fn full_failure_rate_always_fails_first_attempts() {
        let backend = SimulatedBackend::new(7).with_failure_rate(1.0);
        let result = backend
            .execute(&spec(Profile::BugInvestigator), &ctx(1))
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
        assert!(result.error.is_some());
        assert!(result.artifacts.is_empty());
    }

    #[tokio::test]
    async fn quality_stays_in_unit_range() {
        let backend = SimulatedBackend::new(3)
            .with_failure_rate(0.0)
            .with_quality(0.9, 0.5);
        for _ in 0..50 {
            let result = backend
                .execute(&spec(Profile::Implementer), &ctx(1))
                .await
                .unwrap();
            assert!((0.0..=1.0).contains(&result.quality_score));
        }
    }

    #[tokio::test]
    async fn doc_writer_produces_documentation_artifacts() {
        let backend = SimulatedBackend::new(11).with_failure_rate(0.0);
        let result = backend
            .execute(&spec(Profile::DocWriter), &ctx(1))
            .await
            .unwrap();
        assert!(result.artifacts.iter().any(|a| a.ends_with(".md")));
    }

    #[tokio::test]
    async fn testers_report_coverage_gains() {
        let backend = SimulatedBackend::new(13).with_failure_rate(0.0);
        let result = backend
            .execute(&spec(Profile::UnitTester), &ctx(1))
            .await
            .unwrap();
        assert!(result.coverage_delta > 0.0);
    }
}
