//! Cooperative task scheduling for frame-driven rhythm games.
//!
//! The crate provides the run-time that sits between a game's frame loop and
//! its gameplay code: resumable tasks, a scheduler that resumes them once per
//! tick, combinators for waiting on time, events and other tasks, and a
//! frame-synchronous input sampler. Rendering, audio and asset loading are
//! left to the host so the core stays testable in headless tools.

pub mod app;
pub mod clock;
pub mod combinators;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod input;
pub mod level;
pub mod playback;
pub mod scheduler;
pub mod task;

pub use app::GameLoop;
pub use clock::{Clock, FrameClock, ManualClock, SwitchableClock, WallClock};
pub use combinators::{
    wait, wait_all, wait_event, wait_event_with, wait_first, wait_until, First,
};
pub use config::RuntimeConfig;
pub use diagnostics::DiagnosticLog;
pub use error::{Error, Result};
pub use event::{EventSource, EventTarget, Listener, Subscription};
pub use input::{Input, InputBuilder, InputReader, InputSource, Snapshot};
pub use level::{parse_level, LevelEvent};
pub use playback::{Playback, PlaybackClock, PlaybackHandle, PlaybackTracker};
pub use scheduler::{Scheduler, Spawner, TaskHandle};
pub use task::{forever, poll_fn, ready, yield_now, BoxTask, Resume, Task, TaskContext, TaskExt};
