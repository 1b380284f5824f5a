//! RecurrentCaller implementations for local runs and tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::domain::QueueError;
use crate::ports::{ExecutionContext, RecurrentCaller};

/// Records continuation requests instead of scheduling anything.
#[derive(Default)]
pub struct RecordingRecurrentCaller {
    calls: AtomicU32,
    last_function: Mutex<Option<String>>,
}

impl RecordingRecurrentCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_function_name(&self) -> Option<String> {
        self.last_function
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl RecurrentCaller for RecordingRecurrentCaller {
    async fn call(&self, ctx: &dyn ExecutionContext) -> Result<(), QueueError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_function
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ctx.function_name().to_string());
        tracing::debug!(function = ctx.function_name(), "recorded follow-up invocation request");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::StaticContext;

    #[tokio::test]
    async fn records_the_function_it_was_asked_to_reinvoke() {
        let caller = RecordingRecurrentCaller::new();
        let ctx = StaticContext::without_deadline("drain-orders");

        caller.call(&ctx).await.unwrap();
        caller.call(&ctx).await.unwrap();

        assert_eq!(caller.calls(), 2);
        assert_eq!(caller.last_function_name(), Some("drain-orders".to_string()));
    }
}
