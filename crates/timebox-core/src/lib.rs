//! timebox-core
//!
//! Deadline-aware invocation lifecycle and bounded queue draining.
//!
//! # Module map
//! - **domain**: value types (messages, lifecycle events, error taxonomy)
//! - **ports**: seams to the outside (MessageQueue, ExecutionContext,
//!   RecurrentCaller)
//! - **bus**: per-lifecycle synchronous event channel
//! - **deadline**: margin-subtracted deadline guard
//! - **lifecycle**: the invocation phase machine and handler builder
//! - **consumer**: bounded batch consumer built on the lifecycle
//! - **impls**: dev/test implementations of the ports

pub mod bus;
pub mod consumer;
pub mod deadline;
pub mod domain;
pub mod impls;
pub mod lifecycle;
pub mod ports;

pub use bus::EventBus;
pub use consumer::{BatchConsumer, ConsumerCallbacks, MessagePull};
pub use deadline::DeadlineGuard;
pub use domain::{InvokeError, LifecycleEvent, Message, MessageHandle, QueueError};
pub use lifecycle::{Callbacks, Handler, Lifecycle};
pub use ports::{Ctx, ExecutionContext, MessageQueue, RecurrentCaller, StaticContext};
