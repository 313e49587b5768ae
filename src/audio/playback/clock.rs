use std::time::Instant;

/// Monotonic time reference of the audio runtime, in seconds.
///
/// Only differences between readings are meaningful.
///
/// This is host time, not the output device's sample clock. A position
/// derived from it runs ahead of what is audible by the stream's startup
/// and buffer latency, and the two can drift apart over a long run. Every
/// seek or resume re-anchors, so the error never outlives one play run.
pub trait EngineClock {
    fn now(&self) -> f64;
}

/// Engine clock backed by `Instant`, zeroed at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}
