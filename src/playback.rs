use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Something that plays back over time, typically an audio source.
pub trait Playback: Send {
    fn is_playing(&self) -> bool;

    /// Current playhead position in seconds.
    fn position(&self) -> f64;
}

/// Playback status written by the host (audio callbacks, tests) and read by
/// the runtime. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct PlaybackHandle {
    status: Arc<Mutex<PlaybackStatus>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub playing: bool,
    pub position: f64,
}

impl PlaybackHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, playing: bool, position: f64) {
        *self.status.lock() = PlaybackStatus { playing, position };
    }

    pub fn set_position(&self, position: f64) {
        self.status.lock().position = position;
    }

    pub fn play(&self) {
        self.status.lock().playing = true;
    }

    pub fn pause(&self) {
        self.status.lock().playing = false;
    }

    pub fn status(&self) -> PlaybackStatus {
        *self.status.lock()
    }
}

impl Playback for PlaybackHandle {
    fn is_playing(&self) -> bool {
        self.status.lock().playing
    }

    fn position(&self) -> f64 {
        self.status.lock().position
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlaybackState {
    NotStarted,
    Running { started_at: f64 },
    /// Stopped with the playhead at `at`.
    Paused { at: f64 },
}

/// Turns raw playhead observations into elapsed playing time.
///
/// Time spent paused is not counted, and elapsed time carried across a pause
/// is neither lost nor counted twice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTracker {
    state: PlaybackState,
    accumulated: f64,
}

impl Default for PlaybackTracker {
    fn default() -> Self {
        Self {
            state: PlaybackState::NotStarted,
            accumulated: 0.0,
        }
    }
}

impl PlaybackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Records one observation and returns the elapsed playing time.
    ///
    /// Playhead movement between the pause and the first observation after
    /// resuming counts as played. A playhead behind the paused position on
    /// resume means the buffer restarted from zero. Movement while still
    /// paused is a seek and does not count.
    pub fn observe(&mut self, playing: bool, position: f64) -> f64 {
        match (self.state, playing) {
            (PlaybackState::NotStarted, true) => {
                self.state = PlaybackState::Running {
                    started_at: position,
                };
                self.accumulated
            }
            (PlaybackState::Paused { at }, true) => {
                self.accumulated += if position >= at { position - at } else { position };
                self.state = PlaybackState::Running {
                    started_at: position,
                };
                self.accumulated
            }
            (PlaybackState::Running { started_at }, true) => {
                self.accumulated + (position - started_at).max(0.0)
            }
            (PlaybackState::Running { started_at }, false) => {
                self.accumulated += (position - started_at).max(0.0);
                self.state = PlaybackState::Paused { at: position };
                self.accumulated
            }
            (PlaybackState::Paused { .. }, false) => {
                self.state = PlaybackState::Paused { at: position };
                self.accumulated
            }
            (PlaybackState::NotStarted, false) => self.accumulated,
        }
    }

    pub fn sample<P: Playback + ?Sized>(&mut self, playback: &P) -> f64 {
        self.observe(playback.is_playing(), playback.position())
    }
}

/// Clock that reports elapsed playing time of a [`Playback`].
pub struct PlaybackClock<P> {
    inner: Mutex<(P, PlaybackTracker)>,
}

impl<P: Playback> PlaybackClock<P> {
    pub fn new(playback: P) -> Self {
        Self {
            inner: Mutex::new((playback, PlaybackTracker::new())),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().1.state()
    }
}

impl<P: Playback> Clock for PlaybackClock<P> {
    fn now(&self) -> f64 {
        let mut inner = self.inner.lock();
        let (playback, tracker) = &mut *inner;
        tracker.sample(playback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_elapses_before_playback_starts() {
        let mut tracker = PlaybackTracker::new();
        assert_eq!(tracker.observe(false, 3.0), 0.0);
        assert_eq!(tracker.state(), PlaybackState::NotStarted);
        assert_eq!(tracker.observe(true, 3.0), 0.0);
        assert_eq!(
            tracker.state(),
            PlaybackState::Running { started_at: 3.0 }
        );
        assert_eq!(tracker.observe(true, 4.5), 1.5);
    }

    #[test]
    fn pause_and_resume_carry_elapsed_time() {
        let mut tracker = PlaybackTracker::new();
        tracker.observe(true, 0.0);
        assert_eq!(tracker.observe(true, 2.0), 2.0);
        assert_eq!(tracker.observe(false, 2.5), 2.5);
        assert_eq!(tracker.state(), PlaybackState::Paused { at: 2.5 });
        assert_eq!(tracker.observe(false, 2.5), 2.5);

        // the playhead restarts from zero when the buffer is replayed
        assert_eq!(tracker.observe(true, 0.0), 2.5);
        assert_eq!(tracker.observe(true, 1.0), 3.5);
    }

    #[test]
    fn resume_counts_playhead_movement_before_the_first_observation() {
        let mut tracker = PlaybackTracker::new();
        tracker.observe(true, 0.0);
        tracker.observe(true, 2.0);
        assert_eq!(tracker.observe(false, 2.5), 2.5);

        let resumed = tracker.observe(true, 2.6);
        assert!((resumed - 2.6).abs() < 1e-9, "{resumed}");
        let later = tracker.observe(true, 2.7);
        assert!((later - 2.7).abs() < 1e-9, "{later}");
    }

    #[test]
    fn seeking_while_paused_is_not_playing_time() {
        let mut tracker = PlaybackTracker::new();
        tracker.observe(true, 0.0);
        assert_eq!(tracker.observe(false, 1.0), 1.0);
        assert_eq!(tracker.observe(false, 5.0), 1.0);
        assert_eq!(tracker.state(), PlaybackState::Paused { at: 5.0 });
        assert_eq!(tracker.observe(true, 5.0), 1.0);
        assert_eq!(tracker.observe(true, 5.5), 1.5);
    }

    #[test]
    fn playback_clock_follows_the_handle() {
        let handle = PlaybackHandle::new();
        let clock = PlaybackClock::new(handle.clone());
        assert_eq!(clock.now(), 0.0);
        handle.set(true, 10.0);
        assert_eq!(clock.now(), 0.0);
        handle.set_position(10.75);
        assert_eq!(clock.now(), 0.75);
        handle.pause();
        assert_eq!(clock.now(), 0.75);
        assert_eq!(clock.state(), PlaybackState::Paused { at: 10.75 });
    }
}
