//! Frame Clock.
use std::{
    thread,
    time::{Duration, Instant},
};

use crate::vm::Hz;

/// Timer to synchronize a drive loop with the frame rate of the virtual machine.
///
/// It is designed to work with the yielding cooperative pattern
/// of the interpreter loop. When the VM yields control back to the
/// caller, time elapses until it is resumed. Once the interpreter
/// is resumed, the elapsed time is taken into account when determining
/// the next frame.
pub struct Clock {
    start: Instant,
    interval: Duration,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    pub fn new(frequency: Hz) -> Self {
        Self {
            start: Instant::now(),
            interval: frequency.into(),
        }
    }

    /// Time between two frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.start = Instant::now()
    }

    /// Block the current thread until the next frame.
    pub fn wait(&mut self) {
        loop {
            if self.start.elapsed() < self.interval {
                // Sleep does not have enough resolution, and causes
                // the clock to run at 30 FPS.
                //
                // Spinning a loop causes high CPU usage and fan madness.
                //
                // Yielding in a loop is the best alternative.
                thread::yield_now();
            } else {
                // Reset back to zero, rather than trying to catch up.
                //
                // If the host stalled for a large amount of time, the VM
                // should simply continue at the next frame running
                // at its usual speed.
                self.reset();
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unthrottled_clock() {
        let mut clock = Clock::new(Hz(0));
        assert_eq!(clock.interval(), Duration::ZERO);
        clock.wait();
    }

    #[test]
    fn test_wait_blocks_for_interval() {
        let start = Instant::now();
        let mut clock = Clock::new(Hz(200));
        clock.wait();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
