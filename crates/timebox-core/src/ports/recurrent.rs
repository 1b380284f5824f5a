//! RecurrentCaller port - "trigger a follow-up invocation".

use async_trait::async_trait;

use crate::domain::QueueError;
use crate::ports::context::ExecutionContext;

/// Fire-and-forget self re-invocation.
///
/// Implementations invoke the function named by the context asynchronously,
/// carrying a `{"retryMessagesGet": true}` payload so the next invocation
/// tolerates transport delivery latency on its first receive.
///
/// A scheduling failure must be reported: an undelivered continuation
/// silently stalls the drain.
#[async_trait]
pub trait RecurrentCaller: Send + Sync {
    async fn call(&self, ctx: &dyn ExecutionContext) -> Result<(), QueueError>;
}
