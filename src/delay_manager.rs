use std::time::{Duration, Instant};
use std::thread;
use log::info;

const SLICE: Duration = Duration::from_millis(250);

/// Fixed politeness pause between two sources of the same run.
///
/// Sleeps in short slices so a cancellation request is noticed without
/// waiting out the whole delay. Returns `false` if `cancelled` fired.
pub fn inter_source_delay<F>(delay: Duration, cancelled: F) -> bool
where
    F: Fn() -> bool,
{
    if delay.is_zero() {
        return !cancelled();
    }
    info!("Waiting for {:.1} seconds before the next source...", delay.as_secs_f32());

    let deadline = Instant::now() + delay;
    loop {
        if cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delay_returns_immediately() {
        let start = Instant::now();
        assert!(inter_source_delay(Duration::ZERO, || false));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn cancellation_cuts_the_wait_short() {
        let start = Instant::now();
        assert!(!inter_source_delay(Duration::from_secs(10), || true));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn waits_out_short_delay() {
        let start = Instant::now();
        assert!(inter_source_delay(Duration::from_millis(30), || false));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
