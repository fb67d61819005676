use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::playback::{Playback, PlaybackTracker};

use super::{InputSource, Snapshot};

/// Clock reading for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSample {
    /// Current time in seconds.
    pub now: f64,
    /// Seconds since the previous sample, zero on the first one.
    pub delta: f64,
    /// Number of samples taken before this one.
    pub frame: u64,
}

/// Reads a clock each frame. Deltas come from this source's own value in the
/// previous snapshot, so the source must be registered under `name`.
pub struct TimeSource {
    name: String,
    clock: Arc<dyn Clock>,
}

impl TimeSource {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            clock,
        }
    }
}

impl InputSource for TimeSource {
    type Value = TimeSample;

    fn sample(&mut self, _now: &Snapshot, previous: Option<&Snapshot>) -> TimeSample {
        let now = self.clock.now();
        match previous.and_then(|prev| prev.get::<TimeSample>(&self.name)) {
            Some(last) => TimeSample {
                now,
                delta: now - last.now,
                frame: last.frame + 1,
            },
            None => TimeSample {
                now,
                delta: 0.0,
                frame: 0,
            },
        }
    }
}

/// Elapsed playing time of a playback source for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSample {
    pub now: f64,
    pub delta: f64,
    pub playing: bool,
}

/// Input source tracking elapsed time of a [`Playback`] across pauses.
///
/// The pause state machine lives in the source; the delta is taken against
/// the value registered under `name` in the previous snapshot.
pub struct PlaybackTime<P> {
    name: String,
    playback: P,
    tracker: PlaybackTracker,
}

impl<P: Playback> PlaybackTime<P> {
    pub fn new(name: impl Into<String>, playback: P) -> Self {
        Self {
            name: name.into(),
            playback,
            tracker: PlaybackTracker::new(),
        }
    }
}

impl<P: Playback> InputSource for PlaybackTime<P> {
    type Value = PlaybackSample;

    fn sample(&mut self, _now: &Snapshot, previous: Option<&Snapshot>) -> PlaybackSample {
        let playing = self.playback.is_playing();
        let now = self.tracker.observe(playing, self.playback.position());
        let delta = previous
            .and_then(|prev| prev.get::<PlaybackSample>(&self.name))
            .map_or(0.0, |last| now - last.now);
        PlaybackSample {
            now,
            delta,
            playing,
        }
    }
}

/// Smallest signed difference between two angles in radians.
pub fn angle_difference(x: f32, y: f32) -> f32 {
    let d = x - y;
    d.sin().atan2(d.cos())
}

/// Orientation for one frame plus its change since the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerSample {
    pub now: Vec3,
    pub delta: Vec3,
}

/// Samples an Euler orientation (radians) from the host, e.g. the camera.
pub struct EulerSource<F> {
    name: String,
    read: F,
}

impl<F> EulerSource<F>
where
    F: FnMut() -> Vec3 + Send,
{
    pub fn new(name: impl Into<String>, read: F) -> Self {
        Self {
            name: name.into(),
            read,
        }
    }
}

impl<F> InputSource for EulerSource<F>
where
    F: FnMut() -> Vec3 + Send,
{
    type Value = EulerSample;

    fn sample(&mut self, _now: &Snapshot, previous: Option<&Snapshot>) -> EulerSample {
        let now = (self.read)();
        let delta = match previous.and_then(|prev| prev.get::<EulerSample>(&self.name)) {
            Some(last) => Vec3::new(
                angle_difference(now.x, last.now.x),
                angle_difference(now.y, last.now.y),
                angle_difference(now.z, last.now.z),
            ),
            None => Vec3::ZERO,
        };
        EulerSample { now, delta }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    /// Matches whichever direction the player picks.
    Any,
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "x" | "any" => Self::Any,
            other => anyhow::bail!("unknown direction `{other}`"),
        })
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::Any => "any",
        })
    }
}

/// Which swipe directions are active this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directions {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl Directions {
    pub fn is_active(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
            Direction::Any => self.up || self.down || self.left || self.right,
        }
    }
}

/// Derives swipe directions from an [`EulerSample`] sampled earlier in the
/// same frame.
pub struct DirectionSource {
    euler: String,
    threshold: f32,
}

impl DirectionSource {
    /// `euler` names the orientation source; rotation deltas at or beyond
    /// `threshold` radians per frame count as a swipe.
    pub fn new(euler: impl Into<String>, threshold: f32) -> Self {
        Self {
            euler: euler.into(),
            threshold,
        }
    }
}

impl InputSource for DirectionSource {
    type Value = Directions;

    fn sample(&mut self, now: &Snapshot, _previous: Option<&Snapshot>) -> Directions {
        let Some(euler) = now.get::<EulerSample>(&self.euler) else {
            return Directions::default();
        };
        let delta = euler.delta;
        Directions {
            right: delta.y < -self.threshold,
            left: delta.y >= self.threshold,
            down: delta.x < -self.threshold,
            up: delta.x >= self.threshold,
        }
    }
}
