//! Dev/test implementations of the ports.

pub mod inmem_queue;
pub mod recurrent;

pub use self::inmem_queue::InMemoryMessageQueue;
pub use self::recurrent::RecordingRecurrentCaller;
