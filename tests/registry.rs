use lapse::clock::ManualClock;
use lapse::{CacheBuilder, CacheRegistry, FixedTtl, ObjectCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn ttl_cache(ttl_ms: i64, clock: &ManualClock) -> ObjectCache<u32, u32> {
    CacheBuilder::new()
        .policy(FixedTtl::from_millis(ttl_ms))
        .clock(clock.clone())
        .build()
}

// ---------------------------------------------------------------------------
// sweep_all
// ---------------------------------------------------------------------------

#[test]
fn sweep_all_removes_expired_entries_everywhere() {
    let clock = ManualClock::new(0);
    let registry = CacheRegistry::new();
    let short = registry.track(ttl_cache(10, &clock));
    let long = registry.track(ttl_cache(1_000, &clock));

    for i in 0..5 {
        short.put(i, i);
        long.put(i, i);
    }
    clock.advance(Duration::from_millis(10));

    assert_eq!(registry.sweep_all(), 5);
    assert!(short.is_empty());
    assert_eq!(long.len(), 5, "live entries are untouched");
}

#[test]
fn sweep_all_skips_disabled_caches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = CacheRegistry::new();
    let counted = Arc::clone(&calls);
    let enabled: ObjectCache<u32, u32> = registry.predicate_cache(move |_, _| {
        counted.fetch_add(1, Ordering::SeqCst);
        false
    });
    let disabled: ObjectCache<u32, u32> = registry.track(
        CacheBuilder::new()
            .policy(lapse::Predicate::disabled())
            .build(),
    );

    enabled.put(1, 1);
    assert_eq!(registry.sweep_all(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!disabled.is_enabled());
}

#[test]
fn unregistered_caches_are_not_swept() {
    let clock = ManualClock::new(0);
    let registry = CacheRegistry::new();
    let cache = registry.track(ttl_cache(10, &clock));
    cache.put(1, 1);
    clock.advance(Duration::from_millis(10));

    registry.unregister(&cache);
    assert_eq!(registry.sweep_all(), 0);
    assert_eq!(cache.len(), 1, "expired entry still stored until a get or sweep");
    assert!(cache.get(&1).is_err());
    assert!(cache.is_empty());
}

#[test]
fn registration_from_many_threads() {
    let registry = CacheRegistry::new();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let r = registry.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..50 {
                let c: ObjectCache<u32, u32> = r.fixed_ttl_cache(Duration::from_secs(1));
                c.put(1, 1);
                r.sweep_all();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(registry.len(), 400);
}

// ---------------------------------------------------------------------------
// Periodic sweep
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn periodic_sweep_removes_expired_entries() {
    init_logging();
    let registry = CacheRegistry::new();
    let cache: ObjectCache<u32, u32> = registry.fixed_ttl_cache(Duration::from_millis(20));
    cache.put(1, 1);

    let sweeper = registry
        .start_periodic_sweep(Duration::from_millis(10), Duration::from_millis(10))
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || cache.is_empty()),
        "background sweep should remove the expired entry"
    );
    sweeper.stop();
}

#[test]
fn stopped_sweeper_no_longer_sweeps() {
    init_logging();
    let registry = CacheRegistry::new();
    let sweeps = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&sweeps);
    let cache: ObjectCache<u32, u32> = registry.predicate_cache(move |_, _| {
        counted.fetch_add(1, Ordering::SeqCst);
        false
    });
    cache.put(1, 1);

    let sweeper = registry
        .start_periodic_sweep(Duration::ZERO, Duration::from_millis(5))
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || sweeps.load(Ordering::SeqCst) >= 2));
    drop(sweeper);

    let after_stop = sweeps.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(sweeps.load(Ordering::SeqCst), after_stop);
}

#[test]
fn detached_sweeper_keeps_running() {
    let registry = CacheRegistry::new();
    let cache: ObjectCache<u32, u32> = registry.predicate_cache(|v: &u32, _| *v == 0);

    registry
        .start_periodic_sweep(Duration::from_millis(5), Duration::from_millis(5))
        .unwrap()
        .detach();

    cache.put(1, 0);
    assert!(wait_until(Duration::from_secs(5), || cache.is_empty()));
    // Leave the detached sweeper with nothing to do.
    registry.unregister(&cache);
}
