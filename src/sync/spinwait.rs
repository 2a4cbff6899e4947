/*!
 * Adaptive Spin-Wait with Exponential Backoff
 *
 * Used where a thread must observe a state transition that another thread is
 * guaranteed to make shortly, e.g. a dropped handle waiting for the
 * signaling side to finish publishing an outcome it already claimed.
 *
 * Three phases:
 *
 * 1. **Tight spin** (first few iterations): `spin_loop()` hint
 * 2. **Yield** (up to the spin limit): `yield_now()` every iteration
 * 3. **Sleep**: exponentially increasing sleep, capped
 */

use crate::core::limits::{MAX_BACKOFF_NANOS, TIGHT_SPIN_ITERATIONS};
use std::thread;
use std::time::Duration;

/// Adaptive spin-wait with exponential backoff
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpinWait {
    spin_limit: u32,
}

impl SpinWait {
    pub(crate) fn new(spin_limit: u32) -> Self {
        Self { spin_limit }
    }

    /// Spin until `probe` yields a value
    ///
    /// The caller must know that the awaited transition is already underway;
    /// there is no timeout.
    pub(crate) fn until<R>(&self, mut probe: impl FnMut() -> Option<R>) -> R {
        let mut spin_count = 0u32;
        let mut backoff_ns = 1u64;

        loop {
            if let Some(value) = probe() {
                return value;
            }

            if spin_count < TIGHT_SPIN_ITERATIONS {
                std::hint::spin_loop();
            } else if spin_count < self.spin_limit.max(TIGHT_SPIN_ITERATIONS) {
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_nanos(backoff_ns));
                backoff_ns = (backoff_ns * 2).min(MAX_BACKOFF_NANOS);
            }

            spin_count = spin_count.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_until_returns_immediately_when_ready() {
        let sw = SpinWait::new(4);
        assert_eq!(sw.until(|| Some(7)), 7);
    }

    #[test]
    fn test_until_observes_other_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag_clone.store(true, Ordering::Release);
        });

        let sw = SpinWait::new(16);
        let spins = std::cell::Cell::new(0u32);
        sw.until(|| {
            spins.set(spins.get() + 1);
            flag.load(Ordering::Acquire).then_some(())
        });
        assert!(spins.get() > 1);

        handle.join().unwrap();
    }
}
