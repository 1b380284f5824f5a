//! Domain model (messages, lifecycle events, errors).

pub mod errors;
pub mod event;
pub mod message;

pub use self::errors::{InvokeError, QueueError};
pub use self::event::LifecycleEvent;
pub use self::message::{DeleteFailure, Message, MessageHandle};
