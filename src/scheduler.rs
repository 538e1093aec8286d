use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

pub type Callback = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler {
    type Handle: TimerHandle;

    fn schedule(&self, delay: Duration, callback: Callback) -> Self::Handle;
}

pub trait TimerHandle {
    // Must be a no-op once the callback has run or started.
    fn cancel(self);
}

#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        TokioScheduler { runtime }
    }

    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        TokioScheduler::new(Handle::current())
    }
}

#[derive(Debug)]
pub struct TokioTimer {
    task: JoinHandle<()>,
}

impl Scheduler for TokioScheduler {
    type Handle = TokioTimer;

    fn schedule(&self, delay: Duration, callback: Callback) -> TokioTimer {
        // Deadline is fixed here, on the target runtime's clock, rather than
        // when the task is first polled.
        let _runtime = self.runtime.enter();
        let deadline = Instant::now()
            .checked_add(delay)
            .unwrap_or_else(far_future);
        let task = self.runtime.spawn(async move {
            sleep_until(deadline).await;
            callback();
        });
        TokioTimer { task }
    }
}

fn far_future() -> Instant {
    // Roughly 30 years, the same horizon tokio uses for unbounded sleeps.
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

impl TimerHandle for TokioTimer {
    fn cancel(self) {
        self.task.abort();
    }
}

type TimerKey = (Duration, u64);

#[derive(Default)]
struct Clock {
    now: Duration,
    next_seq: u64,
    timers: BTreeMap<TimerKey, Callback>,
}

// Clones share one clock; time only moves through `advance`.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<Clock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending(&self) -> usize {
        self.lock().timers.len()
    }

    /// Runs due callbacks earliest first and returns how many ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now.saturating_add(by);
        let mut fired = 0;
        loop {
            let callback = {
                let mut clock = self.lock();
                let next = clock.timers.keys().next().map(|&(deadline, _)| deadline);
                match next {
                    Some(deadline) if deadline <= target => {
                        clock.now = deadline;
                        clock.timers.pop_first().map(|(_, callback)| callback)
                    }
                    _ => break,
                }
            };
            // Run outside the lock so callbacks may schedule or cancel.
            if let Some(callback) = callback {
                callback();
                fired += 1;
            }
        }
        self.lock().now = target;
        trace!(now = ?target, fired, "manual clock advanced");
        fired
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct ManualTimer {
    key: TimerKey,
    clock: Weak<Mutex<Clock>>,
}

impl Scheduler for ManualScheduler {
    type Handle = ManualTimer;

    fn schedule(&self, delay: Duration, callback: Callback) -> ManualTimer {
        let mut clock = self.lock();
        let key = (clock.now.saturating_add(delay), clock.next_seq);
        clock.next_seq += 1;
        clock.timers.insert(key, callback);
        ManualTimer {
            key,
            clock: Arc::downgrade(&self.clock),
        }
    }
}

impl TimerHandle for ManualTimer {
    fn cancel(self) {
        if let Some(clock) = self.clock.upgrade() {
            clock
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .timers
                .remove(&self.key);
        }
    }
}
