//! DeadlineGuard: safety-margined deadline for one invocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::ports::context::ExecutionContext;

/// Watches the invocation deadline, minus a safety margin.
///
/// Construction reads `remaining_time()` once:
/// - unknown remaining time: fully disarmed, [`timed_out`](Self::timed_out)
///   never resolves and [`expired`](Self::expired) is always false;
/// - `remaining > margin`: a one-shot timer is armed for the difference;
/// - `remaining <= margin`: no timer is armed (there is nothing useful to
///   wake for), but the deadline is recorded as already past so `expired()`
///   reports it synchronously. Callers that must not start new work on a
///   spent budget poll `expired()` before each unit of work.
///
/// Cancellation is cooperative: the guard never interrupts in-flight work,
/// it only answers "has the deadline passed" at the points callers ask.
pub struct DeadlineGuard {
    deadline: Option<Instant>,
    timer_armed: bool,
    cleared: AtomicBool,
}

impl DeadlineGuard {
    pub fn new(ctx: &dyn ExecutionContext, margin: Duration) -> Self {
        let (deadline, timer_armed) = match ctx.remaining_time() {
            None => (None, false),
            Some(remaining) if remaining > margin => {
                (Some(Instant::now() + (remaining - margin)), true)
            }
            Some(_) => (Some(Instant::now()), false),
        };
        Self {
            deadline,
            timer_armed,
            cleared: AtomicBool::new(false),
        }
    }

    /// A guard that never fires (for contexts outside any platform).
    pub fn disarmed() -> Self {
        Self {
            deadline: None,
            timer_armed: false,
            cleared: AtomicBool::new(false),
        }
    }

    /// Resolves when the armed timer elapses; pends forever otherwise.
    ///
    /// Intended to be raced (`tokio::select!`) against the business future.
    pub async fn timed_out(&self) {
        let deadline = match self.deadline {
            Some(d) if self.timer_armed && !self.is_cleared() => d,
            _ => return std::future::pending().await,
        };
        tokio::time::sleep_until(deadline.into()).await;
        if self.is_cleared() {
            std::future::pending::<()>().await;
        }
    }

    /// Has the margined deadline passed?
    pub fn expired(&self) -> bool {
        if self.is_cleared() {
            return false;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Disarm the guard. Idempotent; safe to call on a disarmed guard.
    pub fn clear(&self) {
        self.cleared.store(true, Ordering::SeqCst);
    }

    fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }
}
