use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Source of the current simulation time, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

impl<F> Clock for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn now(&self) -> f64 {
        self()
    }
}

/// Seconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Time derived from a frame counter advanced by the game loop.
#[derive(Debug)]
pub struct FrameClock {
    frames: AtomicU64,
    step: f64,
}

impl FrameClock {
    /// Creates a clock where each frame lasts `step` seconds.
    pub fn new(step: f64) -> Self {
        Self {
            frames: AtomicU64::new(0),
            step,
        }
    }

    pub fn from_fps(fps: f64) -> Self {
        Self::new(1.0 / fps)
    }

    /// Moves the clock forward by one frame and returns the new frame index.
    pub fn advance(&self) -> u64 {
        self.frames.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn frame(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn step(&self) -> f64 {
        self.step
    }
}

impl Clock for FrameClock {
    fn now(&self) -> f64 {
        self.frame() as f64 * self.step
    }
}

/// Clock that only moves when told to. Handy for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    time: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            time: Mutex::new(start),
        }
    }

    pub fn set(&self, time: f64) {
        *self.time.lock() = time;
    }

    pub fn advance(&self, seconds: f64) -> f64 {
        let mut time = self.time.lock();
        *time += seconds;
        *time
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.time.lock()
    }
}

/// Clock whose underlying source can be swapped at runtime.
///
/// Switching sources never makes the reported time jump backwards: when the new
/// source is behind the time last reported, an offset is carried so readings
/// continue from where the previous source left off.
pub struct SwitchableClock {
    inner: Mutex<Switch>,
}

struct Switch {
    source: Arc<dyn Clock>,
    offset: f64,
    last: f64,
}

impl SwitchableClock {
    pub fn new(source: Arc<dyn Clock>) -> Self {
        let last = source.now();
        Self {
            inner: Mutex::new(Switch {
                source,
                offset: 0.0,
                last,
            }),
        }
    }

    pub fn set_source(&self, source: Arc<dyn Clock>) {
        let mut inner = self.inner.lock();
        let current = (inner.source.now() + inner.offset).max(inner.last);
        let fresh = source.now();
        inner.offset = (current - fresh).max(0.0);
        inner.last = current;
        inner.source = source;
        log::debug!("clock source switched at {current:.3}s");
    }
}

impl Clock for SwitchableClock {
    fn now(&self) -> f64 {
        let mut inner = self.inner.lock();
        let time = inner.source.now() + inner.offset;
        inner.last = time;
        time
    }
}
