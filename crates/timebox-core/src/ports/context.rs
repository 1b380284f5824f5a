//! ExecutionContext port - what the invocation platform tells us.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The platform-supplied context of one invocation.
///
/// Immutable for the lifetime of the invocation. A platform that cannot
/// report remaining time returns `None`, which degrades every deadline
/// feature to "no enforcement" rather than an error.
pub trait ExecutionContext: Send + Sync {
    /// Time left before the platform hard-kills this invocation.
    fn remaining_time(&self) -> Option<Duration>;

    /// Name of the invoked function (used for self re-invocation).
    fn function_name(&self) -> &str;

    /// Platform request id of this invocation.
    fn request_id(&self) -> &str;
}

/// Shared handle to the context of the current invocation.
pub type Ctx = Arc<dyn ExecutionContext>;

/// Context with a fixed deadline, for tests and local runs.
///
/// `remaining_time` counts down in real time from the configured budget.
#[derive(Debug, Clone)]
pub struct StaticContext {
    function_name: String,
    request_id: String,
    deadline: Option<Instant>,
}

impl StaticContext {
    /// A context with `budget` of remaining time from now.
    pub fn with_budget(function_name: impl Into<String>, budget: Duration) -> Self {
        Self {
            function_name: function_name.into(),
            request_id: ulid::Ulid::new().to_string(),
            deadline: Some(Instant::now() + budget),
        }
    }

    /// A context that cannot report remaining time.
    pub fn without_deadline(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            request_id: ulid::Ulid::new().to_string(),
            deadline: None,
        }
    }
}

impl ExecutionContext for StaticContext {
    fn remaining_time(&self) -> Option<Duration> {
        // saturating: a past deadline reports zero, not None
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    fn function_name(&self) -> &str {
        &self.function_name
    }

    fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_down_to_zero() {
        let ctx = StaticContext::with_budget("fn", Duration::from_secs(60));
        let remaining = ctx.remaining_time().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));

        let expired = StaticContext::with_budget("fn", Duration::ZERO);
        assert_eq!(expired.remaining_time(), Some(Duration::ZERO));
    }

    #[test]
    fn missing_deadline_reports_none() {
        let ctx = StaticContext::without_deadline("fn");
        assert_eq!(ctx.remaining_time(), None);
        assert_eq!(ctx.function_name(), "fn");
    }
}
