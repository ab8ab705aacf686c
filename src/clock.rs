//! Shared frame-clock driver.
//!
//! A [`FrameClock`] broadcasts per-frame ticks to registered observers,
//! synchronously on the ticking thread, in registration order. The process
//! owns one shared instance ([`FrameClock::global`]); the host drives it once
//! per display refresh from its render loop.
//!
//! Ownership is explicit: [`add`](FrameClock::add) hands back a
//! [`ClockLink`] that owns the callback, and the clock keeps only a weak
//! back-reference. Dropping the link ends delivery at the next tick boundary;
//! a tick already in flight may still deliver once, since live observers are
//! snapshotted before any callback runs.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::util::lock;

type TickFn = Box<dyn FnMut() + Send>;

/// Owning handle for a frame-clock subscription.
///
/// While retained, per-frame callback delivery is guaranteed. Dropping the
/// handle deregisters: no callback fires beginning with the next tick
/// boundary.
pub struct ClockLink {
    _callback: Arc<Mutex<TickFn>>,
}

struct Subscriber {
    callback: Weak<Mutex<TickFn>>,
}

#[derive(Default)]
struct ClockInner {
    subscribers: Vec<Subscriber>,
}

/// Per-display-refresh callback broadcaster.
#[derive(Default)]
pub struct FrameClock {
    inner: Mutex<ClockInner>,
}

impl FrameClock {
    /// A new, empty clock. Hosts that drive multiple displays (or tests) can
    /// own private clocks; most callers want [`FrameClock::global`].
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide shared clock.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<FrameClock>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(FrameClock::new))
    }

    /// Register a per-tick callback. Delivery continues for as long as the
    /// returned link is retained.
    #[must_use = "dropping the link immediately deregisters the callback"]
    pub fn add(&self, callback: impl FnMut() + Send + 'static) -> ClockLink {
        let callback: Arc<Mutex<TickFn>> =
            Arc::new(Mutex::new(Box::new(callback)));
        lock(&self.inner).subscribers.push(Subscriber {
            callback: Arc::downgrade(&callback),
        });
        ClockLink {
            _callback: callback,
        }
    }

    /// Deliver one tick to every live observer, in registration order.
    ///
    /// Live observers are snapshotted up front, so callbacks may freely
    /// register or deregister (including dropping their own link) without
    /// affecting this tick's delivery.
    pub fn tick(&self) {
        let snapshot: Vec<Arc<Mutex<TickFn>>> = {
            let mut inner = lock(&self.inner);
            inner
                .subscribers
                .retain(|s| s.callback.strong_count() > 0);
            inner
                .subscribers
                .iter()
                .filter_map(|s| s.callback.upgrade())
                .collect()
        };
        for callback in snapshot {
            (lock(&callback))();
        }
    }

    /// Number of live observers. Dead registrations are pruned first.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        let mut inner = lock(&self.inner);
        inner
            .subscribers
            .retain(|s| s.callback.strong_count() > 0);
        inner.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_delivers_in_registration_order() {
        let clock = FrameClock::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = Arc::clone(&order);
            clock.add(move || lock(&order).push(1))
        };
        let second = {
            let order = Arc::clone(&order);
            clock.add(move || lock(&order).push(2))
        };

        clock.tick();
        clock.tick();
        assert_eq!(*lock(&order), vec![1, 2, 1, 2]);
        drop((first, second));
    }

    #[test]
    fn test_dropped_link_stops_delivery_at_next_tick() {
        let clock = FrameClock::new();
        let count = Arc::new(Mutex::new(0));

        let link = {
            let count = Arc::clone(&count);
            clock.add(move || *lock(&count) += 1)
        };
        clock.tick();
        assert_eq!(*lock(&count), 1);
        assert_eq!(clock.observer_count(), 1);

        drop(link);
        clock.tick();
        assert_eq!(*lock(&count), 1);
        assert_eq!(clock.observer_count(), 0);
    }

    #[test]
    fn test_link_dropped_mid_tick_still_fires_within_that_tick() {
        let clock = FrameClock::new();
        let fired = Arc::new(Mutex::new(0));
        let victim: Arc<Mutex<Option<ClockLink>>> =
            Arc::new(Mutex::new(None));

        // First observer drops the second's link during the tick.
        let dropper = {
            let victim = Arc::clone(&victim);
            clock.add(move || {
                let _ = lock(&victim).take();
            })
        };
        let link = {
            let fired = Arc::clone(&fired);
            clock.add(move || *lock(&fired) += 1)
        };
        *lock(&victim) = Some(link);

        // Snapshot semantics: still delivered this tick, gone the next.
        clock.tick();
        assert_eq!(*lock(&fired), 1);
        clock.tick();
        assert_eq!(*lock(&fired), 1);
        drop(dropper);
    }

    #[test]
    fn test_registration_during_tick_takes_effect_next_tick() {
        let clock = FrameClock::new();
        let count = Arc::new(Mutex::new(0));
        let late: Arc<Mutex<Option<ClockLink>>> = Arc::new(Mutex::new(None));

        let registrar = {
            let count = Arc::clone(&count);
            let late = Arc::clone(&late);
            let clock_in_tick = Arc::clone(&clock);
            clock.add(move || {
                let mut slot = lock(&late);
                if slot.is_none() {
                    let count = Arc::clone(&count);
                    *slot =
                        Some(clock_in_tick.add(move || *lock(&count) += 1));
                }
            })
        };

        clock.tick();
        assert_eq!(*lock(&count), 0);
        clock.tick();
        assert_eq!(*lock(&count), 1);
        drop(registrar);
    }

    #[test]
    fn test_global_returns_the_same_instance() {
        let a = FrameClock::global();
        let b = FrameClock::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
