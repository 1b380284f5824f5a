//! Invocation lifecycle: ordered phases around a business function.
//!
//! The life cycle is:
//! - `initialize` callbacks (all at once)
//! - business function, raced against the deadline guard
//! - `persist` callbacks, then `flush` callbacks (success path)
//! - `handle_error` callbacks (failure path)
//!
//! Events published on the bus, in order: `called`, then either
//! `persisted` / `succeeded` / `finished`, or (`timedOut`,) `error` /
//! `finished`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;

use crate::bus::EventBus;
use crate::deadline::DeadlineGuard;
use crate::domain::{InvokeError, LifecycleEvent};
use crate::ports::context::Ctx;

/// Margin reserved before the platform's hard limit for the lifecycle race.
pub const DEFAULT_TIMEOUT_MARGIN: Duration = Duration::from_millis(500);

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub type CallbackResult = Result<(), InvokeError>;

/// A callback of the `initialize`, `persist` or `flush` phase. Receives the
/// invocation input (initialize) or the business output (persist/flush).
pub type PhaseCallback = Arc<dyn Fn(Value, Ctx) -> BoxFuture<CallbackResult> + Send + Sync>;

/// A callback of the `handle_error` phase.
pub type ErrorCallback = Arc<dyn Fn(InvokeError, Ctx) -> BoxFuture<CallbackResult> + Send + Sync>;

/// The unit of business logic a handler wraps.
pub type BusinessFn = Arc<dyn Fn(Value, Ctx) -> BoxFuture<Result<Value, InvokeError>> + Send + Sync>;

/// Insertion-ordered callback lists, one per phase.
///
/// All callbacks of a phase are fired at once and awaited together; the
/// first failure surfaces, but siblings still run to completion.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub initialize: Vec<PhaseCallback>,
    pub persist: Vec<PhaseCallback>,
    pub flush: Vec<PhaseCallback>,
    pub handle_error: Vec<ErrorCallback>,
}

impl Callbacks {
    pub fn on_initialize<F, Fut>(&mut self, callback: F)
    where
        F: Fn(Value, Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        self.initialize.push(phase_callback(callback));
    }

    pub fn on_persist<F, Fut>(&mut self, callback: F)
    where
        F: Fn(Value, Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        self.persist.push(phase_callback(callback));
    }

    pub fn on_flush<F, Fut>(&mut self, callback: F)
    where
        F: Fn(Value, Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        self.flush.push(phase_callback(callback));
    }

    pub fn on_error<F, Fut>(&mut self, callback: F)
    where
        F: Fn(InvokeError, Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        self.handle_error
            .push(Arc::new(move |err, ctx| Box::pin(callback(err, ctx))));
    }
}

fn phase_callback<F, Fut>(callback: F) -> PhaseCallback
where
    F: Fn(Value, Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallbackResult> + Send + 'static,
{
    Arc::new(move |payload, ctx| Box::pin(callback(payload, ctx)))
}

/// The lifecycle configuration a handler is built from.
///
/// e.g.
///
/// ```ignore
/// let mut lifecycle = Lifecycle::new();
/// lifecycle.callbacks.on_flush(|output, _ctx| async move {
///     // infrastructure work, e.g. persist domain state
///     Ok(())
/// });
/// let handler = lifecycle.build(|input, _ctx| async move {
///     // domain logic
///     Ok(input)
/// });
/// let response = handler.handle(event, ctx).await?;
/// ```
pub struct Lifecycle {
    pub callbacks: Callbacks,
    pub bus: Arc<EventBus>,
    pub timeout_margin: Duration,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::with_bus(Arc::new(EventBus::new()))
    }

    /// Build on an existing bus (e.g. shared with a consumer's observers).
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            callbacks: Callbacks::default(),
            bus,
            timeout_margin: DEFAULT_TIMEOUT_MARGIN,
        }
    }

    /// Wrap `business` into the platform entry point.
    pub fn build<F, Fut>(self, business: F) -> Handler
    where
        F: Fn(Value, Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, InvokeError>> + Send + 'static,
    {
        self.build_boxed(Arc::new(move |input, ctx| Box::pin(business(input, ctx))))
    }

    /// Like [`build`](Self::build), for an already-boxed business function.
    pub fn build_boxed(self, business: BusinessFn) -> Handler {
        Handler {
            lifecycle: Arc::new(self),
            business,
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// The platform entry point produced by [`Lifecycle::build`].
pub struct Handler {
    lifecycle: Arc<Lifecycle>,
    business: BusinessFn,
}

impl Handler {
    /// The bus this handler publishes lifecycle events on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.lifecycle.bus
    }

    /// Run one invocation.
    ///
    /// Returns the business output, or the terminal response if the failure
    /// carried one; every other error propagates after the error phase ran.
    pub async fn handle(&self, input: Value, ctx: Ctx) -> Result<Value, InvokeError> {
        tracing::debug!(request_id = ctx.request_id(), "invocation started");
        let guard = DeadlineGuard::new(ctx.as_ref(), self.lifecycle.timeout_margin);
        let result = self.run(&input, &ctx, &guard).await;
        // cleared on both exits, regardless of path
        guard.clear();
        match result {
            Ok(output) => Ok(output),
            Err(err) => self.recover(err, &ctx).await,
        }
    }

    async fn run(
        &self,
        input: &Value,
        ctx: &Ctx,
        guard: &DeadlineGuard,
    ) -> Result<Value, InvokeError> {
        let lc = &self.lifecycle;
        run_phase(&lc.callbacks.initialize, input, ctx).await?;
        lc.bus.publish(&LifecycleEvent::Called {
            input: input.clone(),
        });

        let output = tokio::select! {
            out = (self.business)(input.clone(), Arc::clone(ctx)) => out?,
            _ = guard.timed_out() => {
                lc.bus.publish(&LifecycleEvent::TimedOut);
                return Err(InvokeError::TimeoutReached);
            }
        };

        run_phase(&lc.callbacks.persist, &output, ctx).await?;
        lc.bus.publish(&LifecycleEvent::Persisted {
            output: output.clone(),
        });
        run_phase(&lc.callbacks.flush, &output, ctx).await?;
        lc.bus.publish(&LifecycleEvent::Succeeded {
            output: output.clone(),
        });
        lc.bus.publish(&LifecycleEvent::Finished);
        Ok(output)
    }

    /// Failure path: error phase, `error` + `finished` events, then either
    /// resolve a terminal response or propagate.
    async fn recover(&self, err: InvokeError, ctx: &Ctx) -> Result<Value, InvokeError> {
        let lc = &self.lifecycle;
        tracing::warn!(
            request_id = ctx.request_id(),
            error = %err,
            "invocation entered failure path"
        );
        let futures: Vec<_> = lc
            .callbacks
            .handle_error
            .iter()
            .map(|callback| callback(err.clone(), Arc::clone(ctx)))
            .collect();
        first_failure(join_all(futures).await)?;
        lc.bus.publish(&LifecycleEvent::Error { error: err.clone() });
        lc.bus.publish(&LifecycleEvent::Finished);
        match err {
            InvokeError::Terminal(response) => Ok(response),
            other => Err(other),
        }
    }
}

/// Fire all callbacks of one phase, await all of them, surface the first
/// failure. Siblings of a failing callback are not cancelled.
async fn run_phase(callbacks: &[PhaseCallback], payload: &Value, ctx: &Ctx) -> CallbackResult {
    let futures: Vec<_> = callbacks
        .iter()
        .map(|callback| callback(payload.clone(), Arc::clone(ctx)))
        .collect();
    first_failure(join_all(futures).await)
}

fn first_failure(results: Vec<CallbackResult>) -> CallbackResult {
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::ports::StaticContext;

    fn test_ctx() -> Ctx {
        Arc::new(StaticContext::without_deadline("test-fn"))
    }

    fn record_kinds(lifecycle: &Lifecycle) -> Arc<StdMutex<Vec<&'static str>>> {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        lifecycle
            .bus
            .subscribe(move |event| sink.lock().unwrap().push(event.kind()));
        log
    }

    #[tokio::test]
    async fn success_path_emits_events_in_order() {
        let lifecycle = Lifecycle::new();
        let events = record_kinds(&lifecycle);
        let handler = lifecycle.build(|input, _ctx| async move { Ok(input) });

        let output = handler
            .handle(serde_json::json!({"n": 7}), test_ctx())
            .await
            .unwrap();

        assert_eq!(output, serde_json::json!({"n": 7}));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["called", "persisted", "succeeded", "finished"]
        );
    }

    #[tokio::test]
    async fn phases_run_in_order_around_business() {
        let trace = Arc::new(StdMutex::new(Vec::new()));
        let mut lifecycle = Lifecycle::new();

        let push = |name: &'static str| {
            let sink = Arc::clone(&trace);
            move |_payload: Value, _ctx: Ctx| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(name);
                    Ok(())
                }
            }
        };
        lifecycle.callbacks.on_initialize(push("init"));
        lifecycle.callbacks.on_persist(push("persist"));
        lifecycle.callbacks.on_flush(push("flush"));

        let sink = Arc::clone(&trace);
        let handler = lifecycle.build(move |input, _ctx| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push("business");
                Ok(input)
            }
        });

        handler
            .handle(serde_json::json!(null), test_ctx())
            .await
            .unwrap();
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["init", "business", "persist", "flush"]
        );
    }

    #[tokio::test]
    async fn failure_runs_error_phase_and_propagates_original() {
        let mut lifecycle = Lifecycle::new();
        let events = record_kinds(&lifecycle);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        lifecycle.callbacks.on_error(move |err, _ctx| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(err.to_string());
                Ok(())
            }
        });

        let handler = lifecycle
            .build(|_input, _ctx| async move { Err::<Value, _>(InvokeError::business("boom")) });

        let err = handler
            .handle(serde_json::json!(null), test_ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, InvokeError::Business(msg) if msg == "boom"));
        assert_eq!(*seen.lock().unwrap(), vec!["boom".to_string()]);
        assert_eq!(*events.lock().unwrap(), vec!["called", "error", "finished"]);
    }

    #[tokio::test]
    async fn terminal_error_resolves_to_its_response() {
        let lifecycle = Lifecycle::new();
        let events = record_kinds(&lifecycle);
        let handler = lifecycle.build(|_input, _ctx| async move {
            Err::<Value, _>(InvokeError::terminal(serde_json::json!({"statusCode": 404})))
        });

        let output = handler
            .handle(serde_json::json!(null), test_ctx())
            .await
            .unwrap();

        assert_eq!(output, serde_json::json!({"statusCode": 404}));
        assert_eq!(*events.lock().unwrap(), vec!["called", "error", "finished"]);
    }

    #[tokio::test]
    async fn deadline_beats_slow_business() {
        let ctx: Ctx = Arc::new(StaticContext::with_budget(
            "test-fn",
            Duration::from_millis(60),
        ));
        let mut lifecycle = Lifecycle::new();
        lifecycle.timeout_margin = Duration::from_millis(20);
        let events = record_kinds(&lifecycle);

        let handler = lifecycle.build(|input, _ctx| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(input)
        });

        let err = handler.handle(serde_json::json!(null), ctx).await.unwrap_err();
        assert!(matches!(err, InvokeError::TimeoutReached));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["called", "timedOut", "error", "finished"]
        );
    }

    #[tokio::test]
    async fn persist_failure_takes_the_error_path() {
        let mut lifecycle = Lifecycle::new();
        let events = record_kinds(&lifecycle);
        lifecycle
            .callbacks
            .on_persist(|_output, _ctx| async move { Err(InvokeError::business("store down")) });

        let handler = lifecycle.build(|input, _ctx| async move { Ok(input) });
        let err = handler
            .handle(serde_json::json!(null), test_ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, InvokeError::Business(msg) if msg == "store down"));
        // no persisted/succeeded events once persist failed
        assert_eq!(*events.lock().unwrap(), vec!["called", "error", "finished"]);
    }

    #[tokio::test]
    async fn sibling_callbacks_run_even_when_one_fails() {
        let ran = Arc::new(AtomicU32::new(0));
        let mut lifecycle = Lifecycle::new();

        lifecycle
            .callbacks
            .on_initialize(|_input, _ctx| async move { Err(InvokeError::business("first")) });
        let counter = Arc::clone(&ran);
        lifecycle.callbacks.on_initialize(move |_input, _ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let handler = lifecycle.build(|input, _ctx| async move { Ok(input) });
        let err = handler
            .handle(serde_json::json!(null), test_ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, InvokeError::Business(msg) if msg == "first"));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
