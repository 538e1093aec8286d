use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use crate::config::Ttl;
use crate::error::Result;
use crate::scheduler::{Scheduler, TimerHandle, TokioScheduler};

struct Slot<T, H> {
    value: Option<T>,
    pending: Option<H>,
    // Bumped on every set/clear; an expiry only applies to the write that armed it.
    generation: u64,
}

pub struct TimedValueHolder<T, S: Scheduler = TokioScheduler> {
    ttl: Ttl,
    scheduler: S,
    slot: Arc<Mutex<Slot<T, S::Handle>>>,
}

impl<T> TimedValueHolder<T, TokioScheduler>
where
    T: Send + 'static,
{
    /// # Panics
    ///
    /// Panics if the TTL is valid and there is no Tokio runtime to schedule on.
    pub fn new(ttl_millis: f64, starting_value: Option<T>) -> Result<Self> {
        let ttl = Ttl::from_millis(ttl_millis)?;
        Ok(Self::with_scheduler(
            ttl,
            TokioScheduler::current(),
            starting_value,
        ))
    }
}

impl<T, S> TimedValueHolder<T, S>
where
    T: Send + 'static,
    S: Scheduler,
    S::Handle: Send + 'static,
{
    pub fn with_scheduler(ttl: Ttl, scheduler: S, starting_value: Option<T>) -> Self {
        let mut holder = TimedValueHolder {
            ttl,
            scheduler,
            slot: Arc::new(Mutex::new(Slot {
                value: None,
                pending: None,
                generation: 0,
            })),
        };
        if let Some(value) = starting_value {
            holder.set(value);
        }
        holder
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// A snapshot: an expiry can land between two reads, so do not read twice
    /// and expect the same answer.
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        lock(&self.slot).value.clone()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.slot).value.is_none()
    }

    pub fn has_pending_expiry(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }

    pub fn set(&mut self, value: T) {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        if let Some(previous) = slot.pending.take() {
            previous.cancel();
            trace!(generation, "previous expiry timer cancelled");
        }
        slot.value = Some(value);

        let weak = Arc::downgrade(&self.slot);
        let timer = self.scheduler.schedule(
            self.ttl.as_duration(),
            Box::new(move || expire(&weak, generation)),
        );
        slot.pending = Some(timer);
        debug!(ttl = %self.ttl, generation, "value stored, expiry armed");
    }

    pub fn clear(&mut self) {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(timer) = slot.pending.take() {
            timer.cancel();
            debug!(generation = slot.generation, "value cleared");
        }
        slot.value = None;
    }
}

fn expire<T, H>(slot: &Weak<Mutex<Slot<T, H>>>, generation: u64) {
    let Some(shared) = slot.upgrade() else {
        return;
    };
    let mut slot = lock(&shared);
    if slot.generation != generation {
        trace!(
            generation,
            current = slot.generation,
            "stale expiry ignored"
        );
        return;
    }
    slot.value = None;
    slot.pending = None;
    debug!(generation, "value expired");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, S: Scheduler> Drop for TimedValueHolder<T, S> {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.slot).pending.take() {
            timer.cancel();
        }
    }
}

impl<T, S: Scheduler> fmt::Debug for TimedValueHolder<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = lock(&self.slot);
        f.debug_struct("TimedValueHolder")
            .field("ttl", &self.ttl)
            .field("holding", &slot.value.is_some())
            .field("pending_expiry", &slot.pending.is_some())
            .finish()
    }
}
