//! EventBus: process-local, synchronous publish/subscribe.

use std::sync::Mutex;

use crate::domain::LifecycleEvent;

type Subscriber = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// A per-lifecycle event channel.
///
/// Design:
/// - One bus per lifecycle (or per consumer), passed by `Arc`. There is no
///   process-global emitter, so nothing leaks across invocations.
/// - `publish` delivers synchronously, in subscription order, before it
///   returns. Subscribers are plain `Fn`s; a subscriber that panics takes
///   the publish call down with it, which is the integrator's hazard to
///   guard, not this type's.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for all subsequent events.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(subscriber));
    }

    /// Deliver `event` to every current subscriber.
    pub fn publish(&self, event: &LifecycleEvent) {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for subscriber in subscribers.iter() {
            subscriber(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use super::*;

    fn kinds_log() -> (Arc<StdMutex<Vec<&'static str>>>, impl Fn(&LifecycleEvent)) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |e: &LifecycleEvent| {
            sink.lock().unwrap().push(e.kind())
        })
    }

    #[test]
    fn publish_reaches_subscribers_in_order() {
        let bus = EventBus::new();
        let (log, sub) = kinds_log();
        bus.subscribe(sub);

        bus.publish(&LifecycleEvent::Called {
            input: serde_json::json!(1),
        });
        bus.publish(&LifecycleEvent::Finished);

        assert_eq!(*log.lock().unwrap(), vec!["called", "finished"]);
    }

    #[test]
    fn late_subscriber_only_sees_later_events() {
        let bus = EventBus::new();
        bus.publish(&LifecycleEvent::Finished);

        let (log, sub) = kinds_log();
        bus.subscribe(sub);
        bus.publish(&LifecycleEvent::TimedOut);

        assert_eq!(*log.lock().unwrap(), vec!["timedOut"]);
    }
}
