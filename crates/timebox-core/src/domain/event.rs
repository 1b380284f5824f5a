//! Lifecycle events published on the [`EventBus`](crate::bus::EventBus).

use crate::domain::errors::InvokeError;

/// Events emitted while an invocation runs.
///
/// Delivery is synchronous: subscribers present at publish time see the
/// event before the lifecycle continues. Payloads are owned clones so
/// subscribers cannot reach back into invocation state.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Initialize callbacks completed, business logic is about to run.
    Called { input: serde_json::Value },

    /// Persist callbacks completed.
    Persisted { output: serde_json::Value },

    /// Flush callbacks completed; the invocation will return this output.
    Succeeded { output: serde_json::Value },

    /// The deadline guard fired before the business logic settled.
    TimedOut,

    /// The invocation is on the failure path (also emitted for terminal
    /// responses, which still run the error phase).
    Error { error: InvokeError },

    /// Terminal event of every invocation, success or failure.
    Finished,
}

impl LifecycleEvent {
    /// Short name used for logging and test assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Called { .. } => "called",
            LifecycleEvent::Persisted { .. } => "persisted",
            LifecycleEvent::Succeeded { .. } => "succeeded",
            LifecycleEvent::TimedOut => "timedOut",
            LifecycleEvent::Error { .. } => "error",
            LifecycleEvent::Finished => "finished",
        }
    }
}
