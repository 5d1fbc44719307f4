//! WaveExecutor — run a plan wave-by-wave with gates, retries, and
//! escalation.
//!
//! Waves are strictly serialized; intents within a wave run concurrently,
//! bounded by a semaphore of `max_workers` permits. Every attempt passes
//! through Gate 1; failures consult the retry recommender, climbing the
//! agent-quality ladder on escalation and landing in human-review state
//! when the attempt budget runs out. Gate 2 closes each wave, Gate 3 closes
//! the session.
//!
//! Backend failures never abort the session — they become failed results
//! inside the normal retry path. Only cancellation, session timeout, and a
//! strict-mode Gate 2 failure end a session early, and even then the
//! returned [`ExecutionResult`] fully describes what happened.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{DispatchContext, ExecutionBackend};
use crate::cancel::CancelSignal;
use crate::events::{EventBus, GateStatus, ProgressEvent};
use crate::gates::{self, GateVerdict, RetryAction, ReviewVerdict};
use crate::state::{IntentEvent, IntentState, IntentStateMachine};
use wf_core::config::RoutingConfig;
use wf_core::registry::AgentPool;
use wf_core::types::{IntentResult, Profile, ResultStatus};
use wf_plan::plan::{IntentPlan, Plan};

// ---------------------------------------------------------------------------
// ArtifactCollector
// ---------------------------------------------------------------------------

/// Append-only, thread-safe map from intent id to produced artifacts.
/// Dispatches in later waves read their predecessors' entries.
#[derive(Debug, Default)]
pub struct ArtifactCollector {
    inner: Mutex<HashMap<String, Vec<String>>>,
}

impl ArtifactCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, intent_id: &str, artifacts: &[String]) {
        let mut map = self.inner.lock().expect("artifact collector lock poisoned");
        map.entry(intent_id.to_owned())
            .or_default()
            .extend(artifacts.iter().cloned());
    }

    pub fn for_intent(&self, intent_id: &str) -> Vec<String> {
        let map = self.inner.lock().expect("artifact collector lock poisoned");
        map.get(intent_id).cloned().unwrap_or_default()
    }

    /// Artifacts of every listed dependency, in dependency order.
    pub fn for_dependencies(&self, dep_ids: &[String]) -> Vec<String> {
        let map = self.inner.lock().expect("artifact collector lock poisoned");
        dep_ids
            .iter()
            .flat_map(|id| map.get(id).cloned().unwrap_or_default())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// One intent's journey through the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRecord {
    pub intent_id: String,
    pub profile: Profile,
    /// Agent used on the final attempt (differs from the plan after
    /// escalation).
    pub agent: String,
    pub attempts: Vec<IntentResult>,
    /// Gate 1 verdict of the final attempt.
    pub verdict: Option<GateVerdict>,
    pub state: IntentState,
}

impl IntentRecord {
    pub fn final_result(&self) -> Option<&IntentResult> {
        self.attempts.last()
    }
}

/// One executed wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveRecord {
    pub wave: usize,
    pub records: BTreeMap<String, IntentRecord>,
    pub verdict: GateVerdict,
    pub duration_ms: u64,
}

/// Everything that happened in one execution session. Always complete:
/// aborted and cancelled sessions still report every wave that ran, the
/// tallies, and an error description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub waves: Vec<WaveRecord>,
    pub final_verdict: Option<ReviewVerdict>,
    /// Final results with status `completed`.
    pub passed: usize,
    /// Final results with any other status.
    pub failed: usize,
    /// Intents parked in human-review state.
    pub human_review: usize,
    /// Token spend across final attempts, priced at each agent's rate.
    pub total_cost: f64,
    pub wall_time_ms: u64,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Final results across all waves, in wave then id order.
    pub fn all_results(&self) -> Vec<&IntentResult> {
        self.waves
            .iter()
            .flat_map(|w| w.records.values())
            .filter_map(|r| r.final_result())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// WaveExecutor
// ---------------------------------------------------------------------------

pub struct WaveExecutor {
    backend: Arc<dyn ExecutionBackend>,
    pool: Arc<AgentPool>,
    config: RoutingConfig,
    bus: EventBus,
    cancel: CancelSignal,
}

impl WaveExecutor {
    pub fn new(backend: Arc<dyn ExecutionBackend>, pool: Arc<AgentPool>) -> Self {
        Self {
            backend,
            pool,
            config: RoutingConfig::default(),
            bus: EventBus::new(),
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to the progress event stream.
    pub fn subscribe(&self) -> flume::Receiver<ProgressEvent> {
        self.bus.subscribe()
    }

    /// Handle for cancelling this executor's session from outside.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Execute a plan to completion (or early termination).
    pub async fn execute(&self, plan: &Plan) -> ExecutionResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let session_id = Uuid::new_v4();
        info!(%session_id, waves = plan.total_waves, intents = plan.total_intents, "execution started");

        // Session timeout trips the shared cancel signal.
        let watchdog = self.config.session_timeout_secs.map(|secs| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                warn!(timeout_secs = secs, "session timeout expired; cancelling");
                cancel.cancel();
            })
        });

        let artifacts = Arc::new(ArtifactCollector::new());
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));

        let mut waves: Vec<WaveRecord> = Vec::with_capacity(plan.waves.len());
        let mut error: Option<String> = None;

        for wave_plan in &plan.waves {
            if self.cancel.is_cancelled() {
                break;
            }

            self.bus.publish(ProgressEvent::WaveStarted {
                wave: wave_plan.wave,
                intent_count: wave_plan.intents.len(),
            });
            let wave_clock = Instant::now();

            let mut join: JoinSet<IntentRecord> = JoinSet::new();
            for spec in &wave_plan.intents {
                join.spawn(run_intent(IntentTask {
                    backend: Arc::clone(&self.backend),
                    pool: Arc::clone(&self.pool),
                    bus: self.bus.clone(),
                    cancel: self.cancel.clone(),
                    artifacts: Arc::clone(&artifacts),
                    semaphore: Arc::clone(&semaphore),
                    spec: spec.clone(),
                    max_retries: self.config.max_retries,
                }));
            }

            let mut records: BTreeMap<String, IntentRecord> = BTreeMap::new();
            while let Some(joined) = join.join_next().await {
                let record = joined.expect("intent task panicked");
                records.insert(record.intent_id.clone(), record);
            }

            let wave_results: Vec<IntentResult> = records
                .values()
                .filter_map(|r| r.final_result().cloned())
                .collect();
            let verdict = gates::gate_wave(&wave_results, self.config.min_wave_quality);
            let duration_ms = wave_clock.elapsed().as_millis() as u64;

            self.bus.publish(ProgressEvent::WaveCompleted {
                wave: wave_plan.wave,
                status: if verdict.passed {
                    GateStatus::Passed
                } else {
                    GateStatus::Failed
                },
                score: verdict.score,
                duration_ms,
            });

            let wave_failed = !verdict.passed;
            waves.push(WaveRecord {
                wave: wave_plan.wave,
                records,
                verdict,
                duration_ms,
            });

            if wave_failed && self.config.strict_wave_gate {
                error = Some(format!(
                    "wave {} failed its quality gate; aborting under strict policy",
                    wave_plan.wave
                ));
                warn!(wave = wave_plan.wave, "strict wave gate abort");
                break;
            }
        }

        if let Some(handle) = watchdog {
            handle.abort();
        }

        let cancelled = self.cancel.is_cancelled();

        // Tallies and cost over final attempts.
        let mut passed = 0usize;
        let mut failed = 0usize;
        let mut human_review = 0usize;
        let mut total_cost = 0.0;
        let mut all_results: Vec<IntentResult> = Vec::new();
        for record in waves.iter().flat_map(|w| w.records.values()) {
            if record.state == IntentState::HumanReview {
                human_review += 1;
            }
            if let Some(result) = record.final_result() {
                if result.status == ResultStatus::Completed {
                    passed += 1;
                } else {
                    failed += 1;
                }
                if let Some(agent) = self.pool.get(&result.agent) {
                    if let Some(spec) = plan.intent(&result.intent_id) {
                        total_cost += spec.estimated_tokens as f64 * agent.token_rate;
                    }
                }
                all_results.push(result.clone());
            }
        }

        // Gate 3 is best-effort: computed over whatever results exist.
        let final_verdict = gates::final_review(&all_results, plan.total_intents);
        self.bus.publish(ProgressEvent::ExecutionCompleted {
            verdict: final_verdict.verdict,
            passed,
            failed,
            human_review,
        });

        let wall_time_ms = clock.elapsed().as_millis() as u64;
        info!(
            %session_id,
            passed,
            failed,
            human_review,
            cancelled,
            verdict = ?final_verdict.verdict,
            "execution finished"
        );

        ExecutionResult {
            session_id,
            started_at,
            finished_at: Utc::now(),
            waves,
            final_verdict: Some(final_verdict),
            passed,
            failed,
            human_review,
            total_cost,
            wall_time_ms,
            cancelled,
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-intent retry ladder
// ---------------------------------------------------------------------------

struct IntentTask {
    backend: Arc<dyn ExecutionBackend>,
    pool: Arc<AgentPool>,
    bus: EventBus,
    cancel: CancelSignal,
    artifacts: Arc<ArtifactCollector>,
    semaphore: Arc<Semaphore>,
    spec: IntentPlan,
    max_retries: u32,
}

async fn run_intent(task: IntentTask) -> IntentRecord {
    let IntentTask {
        backend,
        pool,
        bus,
        cancel,
        artifacts,
        semaphore,
        spec,
        max_retries,
    } = task;

    let mut machine = IntentStateMachine::new();
    let mut agent = spec.model.clone();
    let mut attempts: Vec<IntentResult> = Vec::new();
    let mut verdict: Option<GateVerdict> = None;

    bus.publish(ProgressEvent::IntentStarted {
        intent_id: spec.id.clone(),
        profile: spec.profile,
        model: agent.clone(),
        wave: spec.wave,
    });

    for attempt in 1..=max_retries {
        if cancel.is_cancelled() {
            break;
        }

        machine
            .transition(IntentEvent::Dispatch)
            .expect("dispatch is valid from pending and failing");

        let ctx = DispatchContext {
            wave: spec.wave,
            agent: agent.clone(),
            attempt,
            predecessor_artifacts: artifacts.for_dependencies(&spec.depends_on),
            cancel: cancel.clone(),
        };

        // The permit bounds in-flight dispatches, not gate evaluation.
        let result = {
            let _permit = semaphore
                .acquire()
                .await
                .expect("executor semaphore never closes");
            backend
                .execute(&spec, &ctx)
                .await
                .unwrap_or_else(|e| {
                    IntentResult::failure(&spec.id, spec.profile, &agent, e.to_string())
                })
        };
        attempts.push(result.clone());

        let gate = gates::gate_intent(&result);
        bus.publish(ProgressEvent::IntentCompleted {
            intent_id: spec.id.clone(),
            status: if gate.passed {
                GateStatus::Passed
            } else {
                GateStatus::Failed
            },
            score: gate.score,
            attempt,
        });

        if gate.passed {
            machine
                .transition(IntentEvent::Pass)
                .expect("pass is valid from in-flight");
            artifacts.record(&spec.id, &result.artifacts);
            return IntentRecord {
                intent_id: spec.id,
                profile: result.profile,
                agent,
                attempts,
                verdict: Some(gate),
                state: machine.state(),
            };
        }

        machine
            .transition(IntentEvent::Fail)
            .expect("fail is valid from in-flight");
        let reason = gate
            .issues
            .first()
            .cloned()
            .unwrap_or_else(|| "validation failed".to_owned());
        verdict = Some(gate);

        if attempt >= max_retries {
            break;
        }

        match gates::recommend(attempt) {
            RetryAction::RetrySameAgent => {
                bus.publish(ProgressEvent::IntentRetried {
                    intent_id: spec.id.clone(),
                    attempt: attempt + 1,
                    model: agent.clone(),
                    reason,
                });
            }
            RetryAction::Escalate => match pool.next_higher(spec.profile, &agent) {
                Some(higher) => {
                    bus.publish(ProgressEvent::IntentEscalated {
                        intent_id: spec.id.clone(),
                        from_model: agent.clone(),
                        to_model: higher.name.clone(),
                        attempt: attempt + 1,
                    });
                    agent = higher.name.clone();
                }
                None => {
                    // Already at the top of the ladder: retry there.
                    bus.publish(ProgressEvent::IntentRetried {
                        intent_id: spec.id.clone(),
                        attempt: attempt + 1,
                        model: agent.clone(),
                        reason,
                    });
                }
            },
            RetryAction::FlagForHuman => break,
        }
    }

    // Attempt budget exhausted, recommender flagged, or cancelled before
    // the first dispatch.
    if attempts.is_empty() {
        return IntentRecord {
            intent_id: spec.id,
            profile: spec.profile,
            agent,
            attempts,
            verdict: None,
            state: machine.state(),
        };
    }

    machine
        .transition(IntentEvent::Flag)
        .expect("flag is valid from failing");
    if let Some(result) = attempts.last() {
        // Partial work is still context for whoever picks this up.
        artifacts.record(&spec.id, &result.artifacts);
    }
    bus.publish(ProgressEvent::IntentHumanReview {
        intent_id: spec.id.clone(),
        attempts: attempts.len() as u32,
        last_error: attempts.last().and_then(|r| r.error.clone()),
    });

    IntentRecord {
        intent_id: spec.id,
        profile: spec.profile,
        agent,
        attempts,
        verdict,
        state: machine.state(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_collector_accumulates() {
        let collector = ArtifactCollector::new();
        collector.record("a", &["PR #1".into()]);
        collector.record("a", &["branch/a".into()]);
        collector.record("b", &["PR #2".into()]);

        assert_eq!(collector.for_intent("a"), vec!["PR #1", "branch/a"]);
        assert_eq!(
            collector.for_dependencies(&["a".into(), "b".into()]),
            vec!["PR #1", "branch/a", "PR #2"]
        );
        assert!(collector.for_intent("missing").is_empty());
    }
}
