//! Execution layer for wavefront: quality gates, the progress event
//! stream, and the wave-by-wave executor.
//!
//! The [`executor::WaveExecutor`] is the only concurrency center in the
//! system — it consumes a [`wf_plan::Plan`], dispatches intents to an
//! [`backend::ExecutionBackend`] under a worker bound, applies the three
//! [`gates`], retries and escalates failures up the agent-quality ladder,
//! and emits [`events::ProgressEvent`]s to every subscriber.

pub mod backend;
pub mod cancel;
pub mod events;
pub mod executor;
pub mod gates;
pub mod state;

pub use backend::{BackendError, DispatchContext, ExecutionBackend, SimulatedBackend};
pub use cancel::CancelSignal;
pub use events::{EventBus, GateStatus, ProgressEvent};
pub use executor::{ArtifactCollector, ExecutionResult, IntentRecord, WaveExecutor, WaveRecord};
pub use gates::{FinalVerdict, GateVerdict, RetryAction, ReviewVerdict};
pub use state::{IntentEvent, IntentState, IntentStateMachine, StateError};
