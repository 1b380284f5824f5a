//! Invocation error taxonomy.

use thiserror::Error;

use crate::domain::message::DeleteFailure;

/// Everything an invocation can fail with.
///
/// `Terminal` is not a failure in the usual sense: it carries a pre-built
/// response and the lifecycle resolves it to a normal return after running
/// the error phase. Checking for it is an explicit match on this enum, not
/// an identity test on a thrown value.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The business function or message processor reported a failure.
    #[error("{0}")]
    Business(String),

    /// Return this response instead of propagating an error.
    #[error("terminal response")]
    Terminal(serde_json::Value),

    /// The deadline guard fired before the business logic settled.
    #[error("timeout reached")]
    TimeoutReached,

    /// The transport acknowledged the delete call but kept some messages.
    #[error("batch delete failed for {} message(s)", .0.len())]
    DeleteBatchFailed(Vec<DeleteFailure>),

    /// The receive/delete/re-invoke call itself failed.
    #[error("queue transport error: {0}")]
    Transport(String),

    /// A message body did not decode into the processor's type.
    #[error("message body decode failed: {0}")]
    Decode(String),
}

impl InvokeError {
    pub fn business(msg: impl Into<String>) -> Self {
        InvokeError::Business(msg.into())
    }

    /// A terminal response: ends the invocation successfully with `response`.
    pub fn terminal(response: serde_json::Value) -> Self {
        InvokeError::Terminal(response)
    }
}

/// Errors raised by a queue transport implementation.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("receive failed: {0}")]
    Receive(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("invoke failed: {0}")]
    Invoke(String),
}

impl From<QueueError> for InvokeError {
    fn from(err: QueueError) -> Self {
        InvokeError::Transport(err.to_string())
    }
}
