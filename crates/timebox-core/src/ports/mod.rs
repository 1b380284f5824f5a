//! Ports - the seams to the platform and the queue transport.
//!
//! Each trait hides one external collaborator:
//! - [`MessageQueue`]: the queue transport (receive / batch delete).
//! - [`ExecutionContext`]: the invocation platform's context object.
//! - [`RecurrentCaller`]: the "trigger a follow-up invocation" capability.
//!
//! Dev/test implementations live in [`crate::impls`].

pub mod context;
pub mod queue;
pub mod recurrent;

pub use self::context::{Ctx, ExecutionContext, StaticContext};
pub use self::queue::MessageQueue;
pub use self::recurrent::RecurrentCaller;
