use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use timed_value::scheduler::{Callback, TokioTimer};
use timed_value::{HolderError, Scheduler, TimedValueHolder, TokioScheduler, Ttl};
use tokio::time::sleep;

// Tokio scheduler that counts callbacks which ran and pins `alive` inside each
// scheduled closure until its task finishes or is aborted.
struct Tracked {
    inner: TokioScheduler,
    alive: Arc<()>,
    fired: Arc<AtomicUsize>,
}

impl Scheduler for Tracked {
    type Handle = TokioTimer;

    fn schedule(&self, delay: Duration, callback: Callback) -> TokioTimer {
        let alive = Arc::clone(&self.alive);
        let fired = Arc::clone(&self.fired);
        self.inner.schedule(
            delay,
            Box::new(move || {
                let _alive = alive;
                fired.fetch_add(1, Ordering::SeqCst);
                callback();
            }),
        )
    }
}

#[tokio::test(start_paused = true)]
async fn value_is_prolonged_when_overwritten() -> anyhow::Result<()> {
    let mut cache = TimedValueHolder::new(50.0, Some("mock"))?;
    assert_eq!(cache.get(), Some("mock"));

    sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.get(), Some("mock"));

    cache.set("updated");
    assert_eq!(cache.get(), Some("updated"));

    // 60ms in: the first write's timer would have fired by now.
    sleep(Duration::from_millis(40)).await;
    assert_eq!(cache.get(), Some("updated"));

    sleep(Duration::from_millis(25)).await;
    assert_eq!(cache.get(), None);
    assert!(!cache.has_pending_expiry());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn value_is_gone_after_the_duration() -> anyhow::Result<()> {
    let cache = TimedValueHolder::new(1.0, Some("mock"))?;
    assert_eq!(cache.get(), Some("mock"));

    sleep(Duration::from_millis(10)).await;
    assert_eq!(cache.get(), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn clear_does_not_wait_for_the_timer() -> anyhow::Result<()> {
    let mut cache = TimedValueHolder::new(15.0, Some("mock"))?;
    cache.clear();
    assert_eq!(cache.get(), None);

    sleep(Duration::from_millis(30)).await;
    assert_eq!(cache.get(), None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expires_on_a_multi_threaded_runtime() -> anyhow::Result<()> {
    let ttl: Ttl = "20".parse()?;
    let cache = TimedValueHolder::with_scheduler(ttl, TokioScheduler::current(), Some(7u64));
    assert_eq!(cache.get(), Some(7));

    let mut waited = Duration::ZERO;
    while !cache.is_empty() && waited < Duration::from_secs(5) {
        sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert!(cache.is_empty());
    assert!(!cache.has_pending_expiry());
    Ok(())
}

#[test]
fn invalid_durations_are_rejected_without_a_runtime() {
    for ttl in [0.0, -5.0, f64::NAN, f64::INFINITY] {
        let result = TimedValueHolder::<&str>::new(ttl, None);
        assert!(matches!(
            result,
            Err(HolderError::InvalidConfiguration { .. })
        ));
    }
    assert!("t".parse::<Ttl>().is_err());
}

#[test]
fn holder_can_live_on_an_explicit_runtime() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let ttl = Ttl::try_from(Duration::from_millis(5)).unwrap();
    let mut cache =
        TimedValueHolder::with_scheduler(ttl, TokioScheduler::new(runtime.handle().clone()), None);
    cache.set(String::from("token"));
    assert_eq!(cache.get().as_deref(), Some("token"));

    runtime.block_on(async { sleep(Duration::from_millis(50)).await });
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_holder_aborts_the_tokio_timer() {
    let alive = Arc::new(());
    let fired = Arc::new(AtomicUsize::new(0));
    let value = Arc::new(String::from("token"));
    let scheduler = Tracked {
        inner: TokioScheduler::current(),
        alive: Arc::clone(&alive),
        fired: Arc::clone(&fired),
    };
    let ttl = Ttl::from_millis(20.0).unwrap();
    let cache = TimedValueHolder::with_scheduler(ttl, scheduler, Some(Arc::clone(&value)));
    assert_eq!(Arc::strong_count(&value), 2);
    // One clone held by the scheduler, one by the armed callback.
    assert_eq!(Arc::strong_count(&alive), 3);

    drop(cache);
    sleep(Duration::from_millis(50)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(Arc::strong_count(&alive), 1);
    assert_eq!(Arc::strong_count(&value), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_timer_releases_its_task() {
    let alive = Arc::new(());
    let fired = Arc::new(AtomicUsize::new(0));
    let scheduler = Tracked {
        inner: TokioScheduler::current(),
        alive: Arc::clone(&alive),
        fired: Arc::clone(&fired),
    };
    let ttl = Ttl::from_millis(20.0).unwrap();
    let cache = TimedValueHolder::with_scheduler(ttl, scheduler, Some(1u8));

    sleep(Duration::from_millis(30)).await;
    assert!(cache.is_empty());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(Arc::strong_count(&alive), 2);
}
