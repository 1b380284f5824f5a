//! Bounded batch consumer: drain a queue within one invocation's budget.
//!
//! The consumer runs inside a lifecycle-managed invocation. Each pass loads
//! a bounded batch, hands messages one at a time to the caller's processor
//! through [`MessagePull`], deletes the messages that were confirmed
//! processed, and either keeps looping, stops (source drained), or hands
//! continuation to a fresh invocation via the recurrent caller.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::deadline::DeadlineGuard;
use crate::domain::{InvokeError, Message, MessageHandle};
use crate::lifecycle::{BoxFuture, Handler, Lifecycle};
use crate::ports::context::Ctx;
use crate::ports::{MessageQueue, RecurrentCaller};

/// Margin reserved for flushing and handing off before the platform limit.
/// Larger than the lifecycle race margin on purpose: the drain loop must
/// stop and flush while the lifecycle still considers the invocation alive,
/// so an in-flight message always gets to finish.
pub const DEFAULT_CONSUMER_MARGIN: Duration = Duration::from_millis(10_000);

/// Default cap for one `receive` call.
pub const DEFAULT_MAX_BATCH: usize = 10;

/// Transport limit for one batch-delete call; larger flushes are chunked.
pub const DELETE_BATCH_LIMIT: usize = 10;

/// Delay before the single retry receive when the caller asked to tolerate
/// delivery latency (`retryMessagesGet`).
pub const DEFAULT_EMPTY_RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(500);

pub type PassCallback = Arc<dyn Fn() -> BoxFuture<Result<(), InvokeError>> + Send + Sync>;

/// Consumer-level hooks, separate from the lifecycle phases.
///
/// `pass_start`/`pass_end` run around each processing pass (fire all, await
/// all, first failure fails the invocation). `consuming_message` and
/// `message_error` are synchronous observers.
#[derive(Clone, Default)]
pub struct ConsumerCallbacks {
    pub pass_start: Vec<PassCallback>,
    pub pass_end: Vec<PassCallback>,
    pub consuming_message: Vec<Arc<dyn Fn(&Value) + Send + Sync>>,
    pub message_error: Vec<Arc<dyn Fn(&InvokeError, &Value) + Send + Sync>>,
}

impl ConsumerCallbacks {
    pub fn on_pass_start<F, Fut>(&mut self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), InvokeError>> + Send + 'static,
    {
        self.pass_start.push(Arc::new(move || Box::pin(callback())));
    }

    pub fn on_pass_end<F, Fut>(&mut self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), InvokeError>> + Send + 'static,
    {
        self.pass_end.push(Arc::new(move || Box::pin(callback())));
    }

    pub fn on_consuming_message<F>(&mut self, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.consuming_message.push(Arc::new(callback));
    }

    /// Observes the failing message body alongside the error.
    pub fn on_message_error<F>(&mut self, callback: F)
    where
        F: Fn(&InvokeError, &Value) + Send + Sync + 'static,
    {
        self.message_error.push(Arc::new(callback));
    }
}

/// The input event a consumer invocation accepts.
#[derive(Debug, Default, Deserialize)]
struct ConsumerEvent {
    /// Set by the recurrent caller: tolerate delivery latency with one
    /// delayed retry receive before concluding the source is empty.
    #[serde(default, rename = "retryMessagesGet")]
    retry_messages_get: bool,
}

/// Bookkeeping for one invocation's drain.
struct PassState {
    batch: VecDeque<Message>,
    current: Option<Message>,
    processed: Vec<Message>,
    source_clean: bool,
    retry_on_empty: bool,
}

impl PassState {
    fn new(retry_on_empty: bool) -> Self {
        Self {
            batch: VecDeque::new(),
            current: None,
            processed: Vec::new(),
            source_clean: false,
            retry_on_empty,
        }
    }

    /// No more work and no more expected.
    fn all_processed(&self) -> bool {
        self.source_clean && self.batch.is_empty()
    }

    /// The current message is confirmed processed. A message only gets here
    /// once the NEXT pull happens or the processor returned cleanly; it is
    /// never "processed" while still current.
    fn commit_current(&mut self) {
        if let Some(message) = self.current.take() {
            self.processed.push(message);
        }
    }

    /// Exclude the current message (left to the queue's redelivery).
    fn drop_current(&mut self) -> Option<Message> {
        self.current.take()
    }

    fn take_processed(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.processed)
    }
}

struct PullShared {
    queue: Arc<dyn MessageQueue>,
    guard: DeadlineGuard,
    state: Mutex<PassState>,
    max_batch: usize,
    retry_delay: Duration,
    callbacks: ConsumerCallbacks,
}

/// The pull iterator handed to the caller's processor.
///
/// `next` returns message bodies one at a time; `Ok(None)` means no more
/// work in this invocation (source drained or deadline reached) and keeps
/// returning `None` on every further call.
#[derive(Clone)]
pub struct MessagePull {
    shared: Arc<PullShared>,
}

impl MessagePull {
    /// Next message body, decoded into `M`.
    pub async fn next<M: DeserializeOwned>(&self) -> Result<Option<M>, InvokeError> {
        match self.next_raw().await? {
            None => Ok(None),
            Some(body) => serde_json::from_value(body)
                .map(Some)
                .map_err(|err| InvokeError::Decode(err.to_string())),
        }
    }

    /// Next message body as raw JSON.
    pub async fn next_raw(&self) -> Result<Option<Value>, InvokeError> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;

        // The previously pulled message survived its processing.
        state.commit_current();

        // No new message once time is up; the one already taken was allowed
        // to finish above.
        if shared.guard.expired() {
            return Ok(None);
        }

        if state.batch.is_empty() && !state.source_clean {
            self.load_batch(&mut state).await?;
        }
        let Some(message) = state.batch.pop_front() else {
            return Ok(None);
        };

        let body = message.body.clone();
        for callback in &shared.callbacks.consuming_message {
            callback(&body);
        }
        state.current = Some(message);
        Ok(Some(body))
    }

    async fn load_batch(&self, state: &mut PassState) -> Result<(), InvokeError> {
        let shared = &self.shared;
        let mut messages = shared.queue.receive(shared.max_batch).await?;
        if messages.is_empty() && state.retry_on_empty {
            // exactly one delayed retry per invocation
            state.retry_on_empty = false;
            tokio::time::sleep(shared.retry_delay).await;
            messages = shared.queue.receive(shared.max_batch).await?;
        }
        if messages.is_empty() {
            state.source_clean = true;
        } else {
            tracing::debug!(count = messages.len(), "loaded message batch");
            state.batch.extend(messages);
        }
        Ok(())
    }
}

type ProcessorFn = Arc<dyn Fn(MessagePull, Ctx) -> BoxFuture<Result<(), InvokeError>> + Send + Sync>;

/// Builds lifecycle-wrapped handlers that drain a [`MessageQueue`].
///
/// e.g.
///
/// ```ignore
/// let consumer = BatchConsumer::new(Lifecycle::new(), queue)
///     .with_recurrent_caller(lambda_caller);
/// let handler = consumer.build(|pull, _ctx| async move {
///     while let Some(order) = pull.next::<Order>().await? {
///         // per-message domain logic
///     }
///     Ok(())
/// });
/// ```
pub struct BatchConsumer {
    lifecycle: Lifecycle,
    queue: Arc<dyn MessageQueue>,
    recurrent: Option<Arc<dyn RecurrentCaller>>,
    pub max_batch_size: usize,
    pub timeout_margin: Duration,
    pub empty_receive_retry_delay: Duration,
    pub callbacks: ConsumerCallbacks,
}

impl BatchConsumer {
    pub fn new(lifecycle: Lifecycle, queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            lifecycle,
            queue,
            recurrent: None,
            max_batch_size: DEFAULT_MAX_BATCH,
            timeout_margin: DEFAULT_CONSUMER_MARGIN,
            empty_receive_retry_delay: DEFAULT_EMPTY_RECEIVE_RETRY_DELAY,
            callbacks: ConsumerCallbacks::default(),
        }
    }

    /// Enable continuation in a fresh invocation when the budget runs out
    /// with work remaining.
    pub fn with_recurrent_caller(mut self, recurrent: Arc<dyn RecurrentCaller>) -> Self {
        self.recurrent = Some(recurrent);
        self
    }

    /// Wrap `processor` into the lifecycle-managed handler.
    ///
    /// The processor drives consumption by awaiting `pull.next()` until it
    /// returns `None`; a processor that takes a single message per call is
    /// fine too, the drain loop re-invokes it until the source is clean.
    pub fn build<F, Fut>(self, processor: F) -> Handler
    where
        F: Fn(MessagePull, Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), InvokeError>> + Send + 'static,
    {
        let processor: ProcessorFn = Arc::new(move |pull, ctx| Box::pin(processor(pull, ctx)));
        let queue = self.queue;
        let recurrent = self.recurrent;
        let callbacks = self.callbacks;
        let max_batch = self.max_batch_size;
        let margin = self.timeout_margin;
        let retry_delay = self.empty_receive_retry_delay;

        self.lifecycle.build(move |input, ctx| {
            drive(
                input,
                ctx,
                Arc::clone(&queue),
                recurrent.clone(),
                callbacks.clone(),
                Arc::clone(&processor),
                max_batch,
                margin,
                retry_delay,
            )
        })
    }
}

/// One invocation of the consumer: the business function the lifecycle runs.
#[allow(clippy::too_many_arguments)]
async fn drive(
    input: Value,
    ctx: Ctx,
    queue: Arc<dyn MessageQueue>,
    recurrent: Option<Arc<dyn RecurrentCaller>>,
    callbacks: ConsumerCallbacks,
    processor: ProcessorFn,
    max_batch: usize,
    margin: Duration,
    retry_delay: Duration,
) -> Result<Value, InvokeError> {
    let event: ConsumerEvent = serde_json::from_value(input).unwrap_or_default();
    let shared = Arc::new(PullShared {
        queue,
        guard: DeadlineGuard::new(ctx.as_ref(), margin),
        state: Mutex::new(PassState::new(event.retry_messages_get)),
        max_batch,
        retry_delay,
        callbacks: callbacks.clone(),
    });

    let mut processed_total = 0usize;
    loop {
        {
            let state = shared.state.lock().await;
            if shared.guard.expired() || state.all_processed() {
                break;
            }
        }

        run_pass_callbacks(&callbacks.pass_start).await?;
        let pull = MessagePull {
            shared: Arc::clone(&shared),
        };
        match processor(pull, Arc::clone(&ctx)).await {
            Ok(()) => {
                let flushable = {
                    let mut state = shared.state.lock().await;
                    state.commit_current();
                    state.take_processed()
                };
                processed_total += flushable.len();
                run_pass_callbacks(&callbacks.pass_end).await?;
                flush(shared.queue.as_ref(), flushable).await?;
            }
            Err(err) => {
                let (failing, flushable) = {
                    let mut state = shared.state.lock().await;
                    let failing = state.drop_current();
                    (failing, state.take_processed())
                };
                if let Some(message) = &failing {
                    for callback in &callbacks.message_error {
                        callback(&err, &message.body);
                    }
                }
                tracing::warn!(
                    error = %err,
                    failing_message = failing.as_ref().map(|m| m.handle.id.as_str()),
                    "message processing failed, flushing messages processed so far"
                );
                // best-effort cleanup: a flush failure must not mask the
                // processing error
                if let Err(flush_err) = flush(shared.queue.as_ref(), flushable).await {
                    tracing::warn!(error = %flush_err, "flush after processing failure also failed");
                }
                return Err(err);
            }
        }
    }

    let work_remaining = {
        let state = shared.state.lock().await;
        !state.all_processed()
    };
    if work_remaining
        && processed_total > 0
        && let Some(recurrent) = &recurrent
    {
        tracing::debug!("budget spent with work remaining, scheduling follow-up invocation");
        recurrent.call(ctx.as_ref()).await?;
    }

    Ok(serde_json::json!({
        "processed": processed_total,
        "sourceDrained": !work_remaining,
    }))
}

/// Delete confirmed-processed messages, chunked to the transport limit.
async fn flush(queue: &dyn MessageQueue, messages: Vec<Message>) -> Result<(), InvokeError> {
    if messages.is_empty() {
        return Ok(());
    }
    let handles: Vec<MessageHandle> = messages.into_iter().map(|m| m.handle).collect();
    for chunk in handles.chunks(DELETE_BATCH_LIMIT) {
        let failed = queue.delete_batch(chunk).await?;
        if !failed.is_empty() {
            return Err(InvokeError::DeleteBatchFailed(failed));
        }
    }
    tracing::debug!(count = handles.len(), "deleted processed messages");
    Ok(())
}

async fn run_pass_callbacks(callbacks: &[PassCallback]) -> Result<(), InvokeError> {
    let futures: Vec<_> = callbacks.iter().map(|callback| callback()).collect();
    futures::future::join_all(futures).await.into_iter().collect()
}
