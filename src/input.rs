//! Frame-synchronous input sampling.
//!
//! An [`Input`] owns an ordered pipeline of named sources. Each
//! [`update`](Input::update) calls every source in registration order and
//! publishes the results as an immutable [`Snapshot`]. Sources receive the
//! partially built snapshot of the current frame, so a later source can derive
//! its value from an earlier one, along with the previous frame's snapshot for
//! computing deltas.

pub mod sources;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

pub use sources::{
    angle_difference, Direction, DirectionSource, Directions, EulerSample, EulerSource,
    PlaybackSample, PlaybackTime, TimeSample, TimeSource,
};

type Value = Box<dyn Any + Send + Sync>;

/// Immutable record of the values sampled during one frame.
pub struct Snapshot {
    sample: u64,
    values: HashMap<String, Value>,
    order: Vec<String>,
}

impl Snapshot {
    fn new(sample: u64) -> Self {
        Self {
            sample,
            values: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn insert(&mut self, name: &str, value: Value) {
        self.order.push(name.to_string());
        self.values.insert(name.to_string(), value);
    }

    /// Index of the update that produced this snapshot, starting at zero.
    pub fn sample(&self) -> u64 {
        self.sample
    }

    /// Returns the value of `name` if it was sampled and has type `T`.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.values.get(name)?.downcast_ref::<T>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Source names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sample", &self.sample)
            .field("names", &self.order)
            .finish()
    }
}

/// A named step of the input pipeline.
pub trait InputSource: Send {
    type Value: Any + Send + Sync;

    fn sample(&mut self, now: &Snapshot, previous: Option<&Snapshot>) -> Self::Value;
}

impl<F, V> InputSource for F
where
    F: FnMut(&Snapshot, Option<&Snapshot>) -> V + Send,
    V: Any + Send + Sync,
{
    type Value = V;

    fn sample(&mut self, now: &Snapshot, previous: Option<&Snapshot>) -> V {
        self(now, previous)
    }
}

trait ErasedSource: Send {
    fn sample_erased(&mut self, now: &Snapshot, previous: Option<&Snapshot>) -> Value;
}

impl<S: InputSource> ErasedSource for S {
    fn sample_erased(&mut self, now: &Snapshot, previous: Option<&Snapshot>) -> Value {
        Box::new(self.sample(now, previous))
    }
}

struct Registered {
    name: String,
    source: Box<dyn ErasedSource>,
}

#[derive(Debug, Default)]
struct Frames {
    now: Option<Arc<Snapshot>>,
    last: Option<Arc<Snapshot>>,
}

/// Collects input sources before validating them into an [`Input`].
#[derive(Default)]
pub struct InputBuilder {
    sources: Vec<Registered>,
}

impl InputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source<S>(mut self, name: impl Into<String>, source: S) -> Self
    where
        S: InputSource + 'static,
    {
        self.sources.push(Registered {
            name: name.into(),
            source: Box::new(source),
        });
        self
    }

    /// Fails when a name is empty or used twice.
    pub fn build(self) -> Result<Input> {
        let mut input = Input {
            sources: Vec::with_capacity(self.sources.len()),
            frames: Arc::default(),
            samples: 0,
        };
        for registered in self.sources {
            input.push(registered)?;
        }
        Ok(input)
    }
}

/// The input pipeline plus the two most recent snapshots.
pub struct Input {
    sources: Vec<Registered>,
    frames: Arc<RwLock<Frames>>,
    samples: u64,
}

impl Input {
    pub fn builder() -> InputBuilder {
        InputBuilder::new()
    }

    /// Appends a source to the end of the pipeline, for inputs that only
    /// become available after startup (e.g. once audio has loaded).
    pub fn register<S>(&mut self, name: impl Into<String>, source: S) -> Result<()>
    where
        S: InputSource + 'static,
    {
        self.push(Registered {
            name: name.into(),
            source: Box::new(source),
        })
    }

    fn push(&mut self, registered: Registered) -> Result<()> {
        if registered.name.is_empty() {
            return Err(Error::configuration("input sources must have a name"));
        }
        if self.sources.iter().any(|s| s.name == registered.name) {
            return Err(Error::configuration(format!(
                "input source `{}` is registered twice",
                registered.name
            )));
        }
        self.sources.push(registered);
        Ok(())
    }

    /// Samples every source in order and publishes the result as `now`; the
    /// previous `now` becomes `last`.
    pub fn update(&mut self) -> Arc<Snapshot> {
        let previous = self.frames.read().now.clone();
        let mut next = Snapshot::new(self.samples);
        for registered in &mut self.sources {
            let value = registered
                .source
                .sample_erased(&next, previous.as_deref());
            next.insert(&registered.name, value);
        }
        self.samples += 1;

        let next = Arc::new(next);
        let mut frames = self.frames.write();
        frames.last = frames.now.replace(Arc::clone(&next));
        next
    }

    pub fn now(&self) -> Option<Arc<Snapshot>> {
        self.frames.read().now.clone()
    }

    pub fn last(&self) -> Option<Arc<Snapshot>> {
        self.frames.read().last.clone()
    }

    /// Read-only view of the published snapshots that tasks can hold on to.
    pub fn reader(&self) -> InputReader {
        InputReader {
            frames: Arc::clone(&self.frames),
        }
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name.as_str())
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("sources", &self.source_names().collect::<Vec<_>>())
            .field("samples", &self.samples)
            .finish()
    }
}

/// Cloneable, read-only access to the latest snapshots of an [`Input`].
#[derive(Debug, Clone)]
pub struct InputReader {
    frames: Arc<RwLock<Frames>>,
}

impl InputReader {
    pub fn now(&self) -> Option<Arc<Snapshot>> {
        self.frames.read().now.clone()
    }

    pub fn last(&self) -> Option<Arc<Snapshot>> {
        self.frames.read().last.clone()
    }

    /// Clones the value of `name` out of the current snapshot.
    pub fn get<T: Any + Clone>(&self, name: &str) -> Option<T> {
        self.frames.read().now.as_ref()?.get::<T>(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn now_and_last_rotate_on_update() {
        let mut counter = 0u32;
        let mut input = InputBuilder::new()
            .source("count", move |_: &Snapshot, _: Option<&Snapshot>| {
                counter += 1;
                counter
            })
            .build()
            .unwrap();
        assert!(input.now().is_none());

        input.update();
        assert_eq!(input.now().unwrap().get::<u32>("count"), Some(&1));
        assert!(input.last().is_none());

        input.update();
        assert_eq!(input.now().unwrap().get::<u32>("count"), Some(&2));
        assert_eq!(input.last().unwrap().get::<u32>("count"), Some(&1));
        assert_eq!(input.now().unwrap().sample(), 1);
    }

    #[test]
    fn later_sources_read_values_from_the_same_frame() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut input = InputBuilder::new()
            .source("time", TimeSource::new("time", clock.clone()))
            .source("double", |now: &Snapshot, _: Option<&Snapshot>| {
                now.get::<TimeSample>("time").map(|t| t.now * 2.0)
            })
            .build()
            .unwrap();

        input.update();
        clock.set(1.5);
        let now = input.update();
        assert_eq!(now.get::<Option<f64>>("double"), Some(&Some(3.0)));
        assert_eq!(now.get::<TimeSample>("time").unwrap().now, 1.5);
    }

    #[test]
    fn previous_snapshot_is_passed_to_sources() {
        let mut input = InputBuilder::new()
            .source("frame", |_: &Snapshot, prev: Option<&Snapshot>| {
                prev.and_then(|p| p.get::<u64>("frame")).map_or(0, |f| f + 1)
            })
            .build()
            .unwrap();
        input.update();
        input.update();
        let now = input.update();
        assert_eq!(now.get::<u64>("frame"), Some(&2));
    }

    #[test]
    fn duplicate_names_fail_before_any_update() {
        let result = InputBuilder::new()
            .source("time", |_: &Snapshot, _: Option<&Snapshot>| 0.0)
            .source("time", |_: &Snapshot, _: Option<&Snapshot>| 1.0)
            .build();
        match result {
            Err(err) => assert!(err.is_configuration()),
            Ok(_) => panic!("duplicate source names were accepted"),
        }
    }

    #[test]
    fn empty_names_are_rejected() {
        let result = InputBuilder::new()
            .source("", |_: &Snapshot, _: Option<&Snapshot>| ())
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn sources_can_be_registered_after_startup() {
        let mut input = InputBuilder::new()
            .source("a", |_: &Snapshot, _: Option<&Snapshot>| 1u8)
            .build()
            .unwrap();
        input
            .register("b", |now: &Snapshot, _: Option<&Snapshot>| {
                now.get::<u8>("a").copied().unwrap_or_default() + 1
            })
            .unwrap();
        assert!(input
            .register("a", |_: &Snapshot, _: Option<&Snapshot>| 0u8)
            .is_err());

        let now = input.update();
        assert_eq!(now.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(now.get::<u8>("b"), Some(&2));
    }

    #[test]
    fn readers_see_published_snapshots_only() {
        let mut input = InputBuilder::new()
            .source("answer", |_: &Snapshot, _: Option<&Snapshot>| 42i32)
            .build()
            .unwrap();
        let reader = input.reader();
        assert!(reader.now().is_none());
        input.update();
        assert_eq!(reader.get::<i32>("answer"), Some(42));
        assert_eq!(reader.get::<u8>("answer"), None);
        assert!(reader.last().is_none());
    }
}
