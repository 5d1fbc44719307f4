//! Quality gates — three-level validation of agent-produced results.
//!
//! Gate 1 checks a single result against its profile's success criteria.
//! Gate 2 checks a completed wave before the executor advances. Gate 3 is
//! the final holistic review over every result. The retry recommender maps
//! attempt numbers to recovery actions.
//!
//! All gate functions are pure; the executor calls them and acts on the
//! verdicts.

use serde::{Deserialize, Serialize};

use wf_core::types::{IntentResult, Profile, ResultStatus};

/// Artifact suffixes that count as documentation files.
const DOC_SUFFIXES: &[&str] = &[".md", ".rst", ".txt", ".adoc", ".html", ".pdf"];

/// Artifact fragments that mark a plan/design deliverable.
const PLAN_KEYWORDS: &[&str] = &["plan", "design", "architecture", "roadmap", "proposal"];

// ---------------------------------------------------------------------------
// Verdict types
// ---------------------------------------------------------------------------

/// Outcome of a Gate 1 or Gate 2 evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub passed: bool,
    /// Score on a 0–100 scale.
    pub score: f64,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl GateVerdict {
    fn pass(score: f64) -> Self {
        Self {
            passed: true,
            score,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// Final review label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalVerdict {
    Ship,
    Revise,
    Rethink,
}

/// Outcome of the Gate 3 final review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub verdict: FinalVerdict,
    /// Weighted aggregate on a 0–100 scale.
    pub score: f64,
    pub production_fitness: f64,
    pub architecture_coherence: f64,
    pub documentation_coverage: f64,
    pub risk_items: Vec<String>,
    pub feedback: Vec<String>,
    /// True when fewer results arrived than the plan expected; the review
    /// covers what is available.
    pub partial: bool,
}

/// Recovery action for a failed or below-threshold intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    RetrySameAgent,
    Escalate,
    FlagForHuman,
}

/// The escalation ladder: retry once, escalate once, then hand to a human.
pub fn recommend(attempt: u32) -> RetryAction {
    match attempt {
        0 | 1 => RetryAction::RetrySameAgent,
        2 => RetryAction::Escalate,
        _ => RetryAction::FlagForHuman,
    }
}

// ---------------------------------------------------------------------------
// Artifact classification
// ---------------------------------------------------------------------------

fn has_doc_artifact(artifacts: &[String]) -> bool {
    artifacts.iter().any(|a| {
        let lower = a.to_ascii_lowercase();
        DOC_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
    })
}

fn has_plan_artifact(artifacts: &[String]) -> bool {
    artifacts.iter().any(|a| {
        let lower = a.to_ascii_lowercase();
        PLAN_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
    })
}

// ---------------------------------------------------------------------------
// Gate 1 — per-intent validation
// ---------------------------------------------------------------------------

/// Gate 1: validate a single result against its profile's criteria.
///
/// A result that is not `completed` scores zero with a populated issue
/// list, regardless of profile.
pub fn gate_intent(result: &IntentResult) -> GateVerdict {
    match result.status {
        ResultStatus::InProgress => {
            return GateVerdict {
                passed: false,
                score: 0.0,
                issues: vec![format!(
                    "intent `{}` is still in progress",
                    result.intent_id
                )],
                recommendations: vec!["wait for execution to finish".into()],
            };
        }
        ResultStatus::Failed => {
            return GateVerdict {
                passed: false,
                score: 0.0,
                issues: vec![format!(
                    "intent `{}` failed: {}",
                    result.intent_id,
                    result.error.as_deref().unwrap_or("no error recorded")
                )],
                recommendations: vec!["retry with the same agent or escalate".into()],
            };
        }
        ResultStatus::Completed => {}
    }

    let mut verdict = match result.profile {
        Profile::BugInvestigator => gate_bug_investigator(result),
        Profile::Implementer => gate_implementer(result),
        Profile::TestEngineer => gate_test_engineer(result),
        Profile::UnitTester => gate_unit_tester(result),
        Profile::DocWriter => gate_doc_writer(result),
        Profile::Planner => gate_planner(result),
        Profile::Reviewer => gate_reviewer(result),
    };
    verdict.score = verdict.score.clamp(0.0, 100.0);
    verdict.passed = verdict.issues.is_empty();
    if !verdict.passed {
        attach_recommendations(&mut verdict);
    }
    verdict
}

fn gate_bug_investigator(result: &IntentResult) -> GateVerdict {
    let mut v = GateVerdict::pass(10.0); // completed
    if result.quality_score > 0.0 {
        v.score += 40.0;
    } else {
        v.issues
            .push("bug appears to still reproduce (quality score is 0)".into());
    }
    if result.tests_passed {
        v.score += 40.0;
    } else {
        v.issues
            .push("regression tests did not pass or were not created".into());
    }
    if result.artifacts.is_empty() {
        v.issues
            .push("no artifacts produced (expected a PR link or branch)".into());
    } else {
        v.score += 10.0;
    }
    v
}

fn gate_implementer(result: &IntentResult) -> GateVerdict {
    let mut v = GateVerdict::pass(15.0); // completed
    if result.tests_passed {
        v.score += 35.0;
    } else {
        v.issues.push("tests did not pass".into());
    }
    let floor = 0.70;
    if result.quality_score >= floor {
        // 25 at the floor, up to 35 as quality approaches 1.0.
        let above = ((result.quality_score - floor) / (1.0 - floor)).min(1.0);
        v.score += 25.0 + 10.0 * above;
    } else {
        v.issues.push(format!(
            "quality score {:.2} below the {:.2} floor",
            result.quality_score, floor
        ));
    }
    if result.artifacts.is_empty() {
        v.issues
            .push("no artifacts produced (expected a PR link or branch)".into());
    } else {
        v.score += 15.0;
    }
    v
}

fn gate_test_engineer(result: &IntentResult) -> GateVerdict {
    let mut v = GateVerdict::pass(10.0); // completed
    if result.tests_passed {
        v.score += 40.0;
    } else {
        v.issues.push("not all tests passed".into());
    }
    if result.coverage_delta >= 0.0 {
        v.score += 30.0 + (result.coverage_delta * 100.0).min(10.0);
    } else {
        v.issues.push(format!(
            "coverage decreased by {:.2}%",
            result.coverage_delta.abs() * 100.0
        ));
    }
    if result.quality_score >= 0.70 {
        v.score += 10.0;
    } else {
        v.issues.push(format!(
            "quality score {:.2} below the 0.70 floor",
            result.quality_score
        ));
    }
    v
}

fn gate_unit_tester(result: &IntentResult) -> GateVerdict {
    let mut v = GateVerdict::pass(10.0); // completed
    if result.coverage_delta > 0.0 {
        v.score += 40.0 + (result.coverage_delta * 200.0).min(10.0);
    } else {
        v.issues.push(format!(
            "coverage did not increase (delta {:+.2}%)",
            result.coverage_delta * 100.0
        ));
    }
    if result.tests_passed {
        v.score += 30.0;
    } else {
        v.issues.push("tests did not pass".into());
    }
    if !result.artifacts.is_empty() {
        v.score += 10.0;
    }
    v
}

fn gate_doc_writer(result: &IntentResult) -> GateVerdict {
    let mut v = GateVerdict::pass(15.0); // completed
    if has_doc_artifact(&result.artifacts) {
        v.score += 40.0;
    } else {
        v.issues.push(
            "no documentation artifact found (expected .md, .rst, .txt, .adoc, .html, or .pdf)"
                .into(),
        );
    }
    if result.quality_score >= 0.60 {
        v.score += (result.quality_score * 25.0).min(25.0);
    } else {
        v.issues.push(format!(
            "quality score {:.2} below the 0.60 floor",
            result.quality_score
        ));
    }
    if !result.artifacts.is_empty() {
        v.score += 10.0;
    }
    if result.tests_passed {
        v.score += 10.0;
    }
    v
}

fn gate_planner(result: &IntentResult) -> GateVerdict {
    let mut v = GateVerdict::pass(15.0); // completed
    if has_plan_artifact(&result.artifacts) {
        v.score += 40.0;
    } else {
        v.issues.push(
            "no plan artifact found (expected a reference naming plan, design, \
             architecture, roadmap, or proposal)"
                .into(),
        );
    }
    if result.quality_score >= 0.70 {
        v.score += (result.quality_score * 25.0).min(25.0);
    } else {
        v.issues.push(format!(
            "quality score {:.2} below the 0.70 floor",
            result.quality_score
        ));
    }
    if !result.artifacts.is_empty() {
        v.score += 10.0;
    }
    if result.tests_passed {
        v.score += 10.0;
    }
    v
}

fn gate_reviewer(result: &IntentResult) -> GateVerdict {
    let mut v = GateVerdict::pass(20.0); // completed
    if result.quality_score >= 0.80 {
        v.score += 50.0;
    } else if result.quality_score >= 0.60 {
        // Partial pass: reduced score, no blocking issue.
        v.score += 30.0;
        v.recommendations.push(format!(
            "review quality {:.2} is acceptable but could be more thorough",
            result.quality_score
        ));
    } else {
        v.issues.push(format!(
            "review quality {:.2} is insufficient (below 0.60)",
            result.quality_score
        ));
    }
    if !result.artifacts.is_empty() {
        v.score += 20.0;
    }
    if result.tests_passed {
        v.score += 10.0;
    }
    v
}

fn attach_recommendations(verdict: &mut GateVerdict) {
    for issue in &verdict.issues {
        let lower = issue.to_ascii_lowercase();
        let rec = if lower.contains("test") {
            "fix failing tests before marking the intent completed"
        } else if lower.contains("coverage") {
            "add tests to improve the coverage delta"
        } else if lower.contains("quality") {
            "improve the implementation or request review feedback"
        } else if lower.contains("artifact") || lower.contains("doc") || lower.contains("plan") {
            "produce the required deliverables and list them as artifacts"
        } else {
            continue;
        };
        if !verdict.recommendations.iter().any(|r| r == rec) {
            verdict.recommendations.push(rec.to_owned());
        }
    }
}

// ---------------------------------------------------------------------------
// Gate 2 — per-wave validation
// ---------------------------------------------------------------------------

/// Gate 2: validate a completed wave before advancing.
///
/// Pass requires every result completed, every quality score at or above
/// `min_quality`, and every tests flag true. The score is the mean of the
/// wave's Gate 1 scores. An empty wave passes with a full score.
pub fn gate_wave(results: &[IntentResult], min_quality: f64) -> GateVerdict {
    if results.is_empty() {
        return GateVerdict::pass(100.0);
    }

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    let mut scores = Vec::with_capacity(results.len());

    for result in results {
        if result.status != ResultStatus::Completed {
            issues.push(format!(
                "[{}] status is `{}`, expected `completed`",
                result.intent_id, result.status
            ));
            recommendations.push(format!(
                "[{}] retry with the same agent or escalate",
                result.intent_id
            ));
        }
        if result.quality_score < min_quality {
            issues.push(format!(
                "[{}] quality score {:.2} below the wave minimum {:.2}",
                result.intent_id, result.quality_score, min_quality
            ));
        }
        if !result.tests_passed {
            issues.push(format!("[{}] tests did not pass", result.intent_id));
        }
        scores.push(gate_intent(result).score);
    }

    let score = scores.iter().sum::<f64>() / scores.len() as f64;
    GateVerdict {
        passed: issues.is_empty(),
        score,
        issues,
        recommendations,
    }
}

// ---------------------------------------------------------------------------
// Gate 3 — final review
// ---------------------------------------------------------------------------

/// Gate 3: holistic review of the whole execution.
///
/// Three weighted sub-scores: production fitness (0.50), architectural
/// coherence (0.30), documentation coverage (0.20). `expected_total` is the
/// planned intent count; receiving fewer results marks the review partial.
/// An empty execution ships — there is nothing to hold back.
pub fn final_review(results: &[IntentResult], expected_total: usize) -> ReviewVerdict {
    if results.is_empty() {
        return ReviewVerdict {
            verdict: FinalVerdict::Ship,
            score: 100.0,
            production_fitness: 100.0,
            architecture_coherence: 100.0,
            documentation_coverage: 100.0,
            risk_items: Vec::new(),
            feedback: Vec::new(),
            partial: expected_total > 0,
        };
    }

    let mut risk_items = Vec::new();
    let mut feedback = Vec::new();

    // Production fitness: quality average with a ×0.5 penalty on any result
    // whose tests failed; non-completed results contribute zero.
    let mut effective: Vec<f64> = Vec::with_capacity(results.len());
    for r in results {
        if r.status == ResultStatus::Completed {
            let penalty = if r.tests_passed { 1.0 } else { 0.5 };
            effective.push(r.quality_score * penalty);
        } else {
            effective.push(0.0);
            risk_items.push(format!(
                "intent `{}` finished with status `{}`{}",
                r.intent_id,
                r.status,
                r.error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            ));
        }
    }
    let failed_tests = results
        .iter()
        .filter(|r| r.status == ResultStatus::Completed && !r.tests_passed)
        .count();
    if failed_tests > 0 {
        risk_items.push(format!(
            "{failed_tests} completed intent(s) have failing tests"
        ));
        feedback.push("fix all failing tests before shipping".into());
    }
    let production_fitness =
        (effective.iter().sum::<f64>() / effective.len() as f64 * 100.0).clamp(0.0, 100.0);

    // Architectural coherence: low variance in quality means the work is
    // uniform; 100 × (1 − σ), clamped.
    let qualities: Vec<f64> = results.iter().map(|r| r.quality_score).collect();
    let sigma = std_dev(&qualities);
    let architecture_coherence = (100.0 * (1.0 - sigma)).clamp(0.0, 100.0);
    for r in results {
        if r.status == ResultStatus::Completed && r.quality_score < 0.5 {
            risk_items.push(format!(
                "intent `{}` has a low quality score ({:.2})",
                r.intent_id, r.quality_score
            ));
        }
    }

    // Documentation coverage: 60% doc-artifact fraction, 40% mean quality
    // of doc-writer results (neutral 0.5 when no doc-writers ran).
    let doc_fraction =
        results.iter().filter(|r| has_doc_artifact(&r.artifacts)).count() as f64
            / results.len() as f64;
    let doc_results: Vec<&IntentResult> = results
        .iter()
        .filter(|r| r.profile == Profile::DocWriter)
        .collect();
    let doc_quality = if doc_results.is_empty() {
        0.5
    } else {
        doc_results.iter().map(|r| r.quality_score).sum::<f64>() / doc_results.len() as f64
    };
    let documentation_coverage = (doc_fraction * 60.0 + doc_quality * 40.0).clamp(0.0, 100.0);
    if doc_fraction < 0.1 {
        feedback.push("add documentation for key intents".into());
    }

    let score = production_fitness * 0.50
        + architecture_coherence * 0.30
        + documentation_coverage * 0.20;
    let verdict = if score >= 85.0 {
        FinalVerdict::Ship
    } else if score >= 60.0 {
        FinalVerdict::Revise
    } else {
        FinalVerdict::Rethink
    };
    if verdict == FinalVerdict::Rethink {
        feedback.push("consider revising the decomposition before re-executing".into());
    }

    ReviewVerdict {
        verdict,
        score,
        production_fitness,
        architecture_coherence,
        documentation_coverage,
        risk_items,
        feedback,
        partial: results.len() < expected_total,
    }
}

/// Population standard deviation; zero for fewer than two samples.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
