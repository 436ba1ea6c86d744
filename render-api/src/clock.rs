use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Source of the host's game time in seconds.
pub trait GameClock: Send + Sync {
    fn game_time(&self) -> f32;
}

#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl GameClock for MonotonicClock {
    fn game_time(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }
}

/// Manually driven clock.
#[derive(Debug, Default)]
pub struct FixedClock {
    bits: AtomicU32,
}

impl FixedClock {
    pub fn new(seconds: f32) -> Self {
        Self { bits: AtomicU32::new(seconds.to_bits()) }
    }

    pub fn set(&self, seconds: f32) {
        self.bits.store(seconds.to_bits(), Ordering::Relaxed);
    }
}

impl GameClock for FixedClock {
    fn game_time(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
