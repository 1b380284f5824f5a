//! MessageQueue port - the queue transport seam.

use async_trait::async_trait;

use crate::domain::{DeleteFailure, Message, MessageHandle, QueueError};

/// The queue transport the consumer drains.
///
/// Contract:
/// - `receive` returns at most `max_messages` messages in delivery order;
///   an empty vec means "no data available right now".
/// - `delete_batch` acknowledges processed messages. Entries the transport
///   could not delete come back in the failed list; the caller treats a
///   non-empty list as fatal for the pass.
///
/// Ordering, redelivery, and visibility timeouts are the transport's
/// responsibility, not this trait's.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn receive(&self, max_messages: usize) -> Result<Vec<Message>, QueueError>;

    async fn delete_batch(
        &self,
        handles: &[MessageHandle],
    ) -> Result<Vec<DeleteFailure>, QueueError>;
}
