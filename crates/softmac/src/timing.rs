//! Clock helpers for slot-accurate waits
//!
//! Slot boundaries need microsecond precision, which OS sleep cannot
//! deliver on a general-purpose kernel: short waits spin on the monotonic
//! clock, long waits sleep in chunks so a stopping block never leaves a
//! thread stranded mid-wait.

use std::time::{Duration, Instant};

/// Below this window a wait spins instead of sleeping.
const SPIN_LIMIT_US: u64 = 1_000;
/// Longest single OS sleep; bounds shutdown latency.
const SLEEP_CHUNK_US: u64 = 5_000;

/// Microseconds elapsed since `t0`.
pub fn elapsed_us(t0: Instant) -> u64 {
    t0.elapsed().as_micros() as u64
}

/// Sleep roughly `us` microseconds, polling `abort` between chunks.
pub fn sleep_us(us: u64, abort: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_micros(us);
    loop {
        if abort() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let left = (deadline - now).as_micros() as u64;
        std::thread::sleep(Duration::from_micros(left.min(SLEEP_CHUNK_US)));
    }
}

/// Busy-wait until `target_us` after `t0`, or until `abort` returns true.
///
/// Returns the elapsed microseconds at exit, so callers can check whether
/// they are still inside their window.
pub fn wait_until(t0: Instant, target_us: u64, abort: impl Fn() -> bool) -> u64 {
    loop {
        let elapsed = elapsed_us(t0);
        if elapsed >= target_us || abort() {
            return elapsed;
        }
        std::hint::spin_loop();
    }
}

/// Wait `us` microseconds from now, spinning for sub-millisecond windows
/// and sleeping otherwise. Aborts early when `abort` returns true.
pub fn pause_us(us: u64, abort: impl Fn() -> bool) {
    if us < SPIN_LIMIT_US {
        wait_until(Instant::now(), us, abort);
    } else {
        sleep_us(us, abort);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_until_reaches_target() {
        let t0 = Instant::now();
        let elapsed = wait_until(t0, 200, || false);
        assert!(elapsed >= 200);
    }

    #[test]
    fn wait_until_aborts_early() {
        let t0 = Instant::now();
        let elapsed = wait_until(t0, 60_000_000, || true);
        assert!(elapsed < 60_000_000);
    }

    #[test]
    fn sleep_us_honors_abort() {
        let t0 = Instant::now();
        sleep_us(60_000_000, || true);
        assert!(elapsed_us(t0) < 1_000_000);
    }

    #[test]
    fn pause_us_sleeps_at_least_the_window() {
        let t0 = Instant::now();
        pause_us(2_000, || false);
        assert!(elapsed_us(t0) >= 2_000);
    }
}
