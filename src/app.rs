use std::sync::Arc;

use log::debug;

use crate::clock::FrameClock;
use crate::input::{Input, InputReader, Snapshot};
use crate::scheduler::{Scheduler, Spawner};

/// Drives one frame at a time: input sampling, then the scheduler tick, then
/// whatever rendering the host does with the frame's snapshot.
pub struct GameLoop {
    input: Input,
    scheduler: Scheduler,
    frame_clock: Option<Arc<FrameClock>>,
    frames: u64,
}

impl GameLoop {
    pub fn new(input: Input, scheduler: Scheduler) -> Self {
        Self {
            input,
            scheduler,
            frame_clock: None,
            frames: 0,
        }
    }

    /// Advances `clock` by one frame at the start of every frame.
    pub fn with_frame_clock(mut self, clock: Arc<FrameClock>) -> Self {
        self.frame_clock = Some(clock);
        self
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut Input {
        &mut self.input
    }

    pub fn reader(&self) -> InputReader {
        self.input.reader()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn spawner(&self) -> Spawner {
        self.scheduler.spawner()
    }

    /// Frames run so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs a single frame and hands its snapshot to `render`.
    pub fn frame<F>(&mut self, render: F)
    where
        F: FnOnce(&Snapshot),
    {
        if let Some(clock) = &self.frame_clock {
            clock.advance();
        }
        let snapshot = self.input.update();
        self.scheduler.tick();
        render(&snapshot);
        self.frames += 1;
    }

    pub fn step(&mut self) {
        self.frame(|_| {});
    }

    /// Runs frames until the scheduler has no tasks left or `max_frames`
    /// frames have run. Returns the number of frames run by this call.
    pub fn run_until_idle(&mut self, max_frames: u64) -> u64 {
        let start = self.frames;
        while !self.scheduler.is_empty() && self.frames - start < max_frames {
            self.step();
        }
        let ran = self.frames - start;
        debug!(
            "game loop stopped after {ran} frame(s) with {} task(s) left",
            self.scheduler.len()
        );
        ran
    }
}
