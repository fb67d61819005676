//! Building blocks for composing tasks: delays, event waits and fan-out.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::event::{EventSource, Listener, Subscription};
use crate::task::{resumed_after_completion, Resume, Task, TaskContext};

/// Suspends until `duration` seconds of clock time have passed.
///
/// The start time is taken on the first resumption, which always suspends, so
/// even a zero or negative duration completes one resumption later.
pub fn wait(duration: f64) -> Wait {
    Wait {
        duration,
        started: None,
        finished: false,
    }
}

#[derive(Debug, Clone)]
pub struct Wait {
    duration: f64,
    started: Option<f64>,
    finished: bool,
}

impl Wait {
    pub fn duration(&self) -> f64 {
        self.duration
    }
}

impl Task for Wait {
    type Output = ();

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<()> {
        if self.finished {
            return resumed_after_completion("wait");
        }
        if self.duration.is_nan() {
            self.finished = true;
            return Resume::Failed(Error::configuration("wait duration is NaN"));
        }
        match self.started {
            None => {
                self.started = Some(cx.now());
                Resume::Suspended
            }
            Some(start) if cx.now() - start >= self.duration => {
                self.finished = true;
                Resume::Completed(())
            }
            Some(_) => Resume::Suspended,
        }
    }
}

/// Suspends until `ready` returns true. Checked on every resumption, including
/// the first, so an already satisfied condition completes immediately.
pub fn wait_until<F>(ready: F) -> WaitUntil<F>
where
    F: FnMut(&TaskContext<'_>) -> bool,
{
    WaitUntil {
        ready,
        finished: false,
    }
}

pub struct WaitUntil<F> {
    ready: F,
    finished: bool,
}

impl<F> Task for WaitUntil<F>
where
    F: FnMut(&TaskContext<'_>) -> bool,
{
    type Output = ();

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<()> {
        if self.finished {
            return resumed_after_completion("wait_until");
        }
        if (self.ready)(cx) {
            self.finished = true;
            Resume::Completed(())
        } else {
            Resume::Suspended
        }
    }
}

/// Suspends until `source` dispatches `name`, completing with the event.
pub fn wait_event<S, E>(source: S, name: impl Into<String>) -> WaitEvent<S, E>
where
    S: EventSource<E>,
    E: Clone + Send + 'static,
{
    WaitEvent {
        source,
        name: name.into(),
        callback: None,
        state: WaitEventState::Idle,
    }
}

/// Like [`wait_event`], also calling `callback` from inside the dispatch.
///
/// The callback runs synchronously with the host's dispatch, which matters for
/// platform calls that are only allowed during a user gesture.
pub fn wait_event_with<S, E, F>(
    source: S,
    name: impl Into<String>,
    callback: F,
) -> WaitEvent<S, E>
where
    S: EventSource<E>,
    E: Clone + Send + 'static,
    F: FnMut(&E) + Send + 'static,
{
    WaitEvent {
        source,
        name: name.into(),
        callback: Some(Box::new(callback)),
        state: WaitEventState::Idle,
    }
}

pub struct WaitEvent<S, E> {
    source: S,
    name: String,
    callback: Option<Listener<E>>,
    state: WaitEventState<E>,
}

enum WaitEventState<E> {
    Idle,
    Listening {
        subscription: Subscription,
        fired: Arc<Mutex<Option<E>>>,
    },
    Done,
}

impl<S, E> WaitEvent<S, E> {
    pub fn is_listening(&self) -> bool {
        matches!(self.state, WaitEventState::Listening { .. })
    }
}

impl<S, E> Task for WaitEvent<S, E>
where
    S: EventSource<E>,
    E: Clone + Send + 'static,
{
    type Output = E;

    fn resume(&mut self, _cx: &TaskContext<'_>) -> Resume<E> {
        match std::mem::replace(&mut self.state, WaitEventState::Done) {
            WaitEventState::Idle => {
                let fired = Arc::new(Mutex::new(None));
                let slot = Arc::clone(&fired);
                let mut callback = self.callback.take();
                let listener: Listener<E> = Box::new(move |event: &E| {
                    if let Some(callback) = callback.as_mut() {
                        callback(event);
                    }
                    let mut slot = slot.lock();
                    if slot.is_none() {
                        *slot = Some(event.clone());
                    }
                });
                let subscription = self.source.subscribe(&self.name, listener);
                self.state = WaitEventState::Listening {
                    subscription,
                    fired,
                };
                Resume::Suspended
            }
            WaitEventState::Listening {
                subscription,
                fired,
            } => {
                let event = fired.lock().take();
                match event {
                    Some(event) => {
                        subscription.unsubscribe();
                        Resume::Completed(event)
                    }
                    None => {
                        self.state = WaitEventState::Listening {
                            subscription,
                            fired,
                        };
                        Resume::Suspended
                    }
                }
            }
            WaitEventState::Done => resumed_after_completion("wait_event"),
        }
    }
}

/// Resumes every child once per resumption, in order, until all have
/// completed. Completes with the children's outputs in the order given.
///
/// The first child failure fails the whole group; children that have not
/// finished are dropped without being resumed again.
pub fn wait_all<T, I>(tasks: I) -> WaitAll<T>
where
    T: Task,
    I: IntoIterator<Item = T>,
{
    let children: Vec<Option<T>> = tasks.into_iter().map(Some).collect();
    let outputs = children.iter().map(|_| None).collect();
    WaitAll {
        children,
        outputs,
        finished: false,
    }
}

pub struct WaitAll<T: Task> {
    children: Vec<Option<T>>,
    outputs: Vec<Option<T::Output>>,
    finished: bool,
}

impl<T: Task> WaitAll<T> {
    /// Number of children still running.
    pub fn remaining(&self) -> usize {
        self.children.iter().filter(|child| child.is_some()).count()
    }
}

impl<T: Task> Task for WaitAll<T> {
    type Output = Vec<T::Output>;

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<Self::Output> {
        if self.finished {
            return resumed_after_completion("wait_all");
        }
        let mut failure = None;
        for (slot, output) in self.children.iter_mut().zip(self.outputs.iter_mut()) {
            let Some(child) = slot.as_mut() else {
                continue;
            };
            match child.resume(cx) {
                Resume::Suspended => {}
                Resume::Completed(value) => {
                    *output = Some(value);
                    *slot = None;
                }
                Resume::Failed(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = failure {
            self.children.clear();
            self.outputs.clear();
            self.finished = true;
            return Resume::Failed(err);
        }
        if self.children.iter().any(Option::is_some) {
            return Resume::Suspended;
        }
        self.finished = true;
        self.children.clear();
        Resume::Completed(std::mem::take(&mut self.outputs).into_iter().flatten().collect())
    }
}

/// Result of [`wait_first`]: which child finished first and its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct First<T> {
    pub index: usize,
    pub value: T,
}

/// Resumes children in order until one completes. Later children are not
/// resumed in that pass and every unfinished child is dropped.
///
/// A child failure fails the race and drops the rest. An empty set can never
/// finish and fails with a configuration error on its first resumption.
pub fn wait_first<T, I>(tasks: I) -> WaitFirst<T>
where
    T: Task,
    I: IntoIterator<Item = T>,
{
    WaitFirst {
        children: tasks.into_iter().collect(),
        finished: false,
    }
}

pub struct WaitFirst<T> {
    children: Vec<T>,
    finished: bool,
}

impl<T: Task> Task for WaitFirst<T> {
    type Output = First<T::Output>;

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<Self::Output> {
        if self.finished {
            return resumed_after_completion("wait_first");
        }
        if self.children.is_empty() {
            self.finished = true;
            return Resume::Failed(Error::configuration(
                "wait_first needs at least one task",
            ));
        }
        let mut outcome = None;
        for (index, child) in self.children.iter_mut().enumerate() {
            match child.resume(cx) {
                Resume::Suspended => {}
                Resume::Completed(value) => {
                    outcome = Some(Resume::Completed(First { index, value }));
                    break;
                }
                Resume::Failed(err) => {
                    outcome = Some(Resume::Failed(err));
                    break;
                }
            }
        }
        match outcome {
            Some(step) => {
                self.finished = true;
                self.children.clear();
                step
            }
            None => Resume::Suspended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTarget;
    use crate::scheduler::Spawner;
    use crate::task::{forever, poll_fn, BoxTask, TaskExt};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Driver {
        spawner: Spawner,
    }

    impl Driver {
        fn new() -> Self {
            Self {
                spawner: Spawner::new(),
            }
        }

        fn resume<T: Task>(&self, task: &mut T, now: f64) -> Resume<T::Output> {
            task.resume(&TaskContext::new(now, 0, &self.spawner))
        }
    }

    /// Task that completes on its `finish_at`-th resumption, logging each one.
    fn counted(
        log: &Rc<RefCell<Vec<String>>>,
        name: &'static str,
        finish_at: usize,
    ) -> BoxTask<&'static str> {
        let log = Rc::clone(log);
        let mut resumes = 0;
        poll_fn(move |_| {
            resumes += 1;
            log.borrow_mut().push(format!("{name}{resumes}"));
            if resumes == finish_at {
                Resume::Completed(name)
            } else {
                Resume::Suspended
            }
        })
        .boxed()
    }

    #[test]
    fn zero_and_negative_waits_still_take_one_more_resumption() {
        let driver = Driver::new();
        for duration in [0.0, -1.0] {
            let mut task = wait(duration);
            assert!(driver.resume(&mut task, 5.0).is_suspended());
            assert!(driver.resume(&mut task, 5.0).is_completed());
        }
    }

    #[test]
    fn wait_measures_from_its_first_resumption() {
        let driver = Driver::new();
        let mut task = wait(1.0);
        assert!(driver.resume(&mut task, 10.0).is_suspended());
        assert!(driver.resume(&mut task, 10.5).is_suspended());
        assert!(driver.resume(&mut task, 11.0).is_completed());
        assert!(matches!(
            driver.resume(&mut task, 12.0),
            Resume::Failed(Error::InvalidState(_))
        ));
    }

    #[test]
    fn nan_wait_is_a_configuration_error() {
        let driver = Driver::new();
        match driver.resume(&mut wait(f64::NAN), 0.0) {
            Resume::Failed(err) => assert!(err.is_configuration()),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn wait_until_polls_the_condition() {
        let driver = Driver::new();
        let loaded = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&loaded);
        let mut task = wait_until(move |_| *flag.borrow());
        assert!(driver.resume(&mut task, 0.0).is_suspended());
        *loaded.borrow_mut() = true;
        assert!(driver.resume(&mut task, 0.0).is_completed());

        let mut immediate = wait_until(|cx| cx.now() >= 1.0);
        assert!(driver.resume(&mut immediate, 2.0).is_completed());
    }

    #[test]
    fn wait_event_completes_after_dispatch_and_unsubscribes() {
        let driver = Driver::new();
        let button = EventTarget::<&'static str>::new();
        let clicked = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&clicked);
        let mut task = wait_event_with(button.clone(), "click", move |event: &&'static str| {
            seen.lock().push(*event);
        });

        assert_eq!(button.listener_count("click"), 0);
        assert!(driver.resume(&mut task, 0.0).is_suspended());
        assert_eq!(button.listener_count("click"), 1);
        assert!(driver.resume(&mut task, 0.0).is_suspended());

        button.dispatch("click", &"normal");
        assert_eq!(*clicked.lock(), vec!["normal"]);
        assert_eq!(button.listener_count("click"), 1);

        assert_eq!(driver.resume(&mut task, 0.0).completed(), Some("normal"));
        assert_eq!(button.listener_count("click"), 0);
        assert!(!task.is_listening());
    }

    #[test]
    fn abandoned_event_wait_releases_its_listener() {
        let driver = Driver::new();
        let button = EventTarget::<()>::new();
        let mut task = wait_event(button.clone(), "click");
        assert!(driver.resume(&mut task, 0.0).is_suspended());
        assert_eq!(button.listener_count("click"), 1);
        drop(task);
        assert_eq!(button.listener_count("click"), 0);
    }

    #[test]
    fn wait_all_fans_out_in_order_until_everything_is_done() {
        let driver = Driver::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut group = wait_all(vec![
            counted(&log, "a", 3),
            counted(&log, "b", 1),
            counted(&log, "c", 2),
        ]);

        assert!(driver.resume(&mut group, 0.0).is_suspended());
        assert_eq!(group.remaining(), 2);
        assert!(driver.resume(&mut group, 0.0).is_suspended());
        assert_eq!(
            driver.resume(&mut group, 0.0).completed(),
            Some(vec!["a", "b", "c"])
        );
        assert_eq!(*log.borrow(), vec!["a1", "b1", "c1", "a2", "c2", "a3"]);
    }

    #[test]
    fn empty_wait_all_completes_immediately() {
        let driver = Driver::new();
        let mut group = wait_all(Vec::<BoxTask<()>>::new());
        assert_eq!(driver.resume(&mut group, 0.0).completed(), Some(vec![]));
    }

    #[test]
    fn wait_all_fails_fast_and_drops_the_rest() {
        let driver = Driver::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let failing =
            poll_fn(|_| Resume::<&'static str>::Failed(Error::execution("bad beat"))).boxed();
        let mut group = wait_all(vec![failing, counted(&log, "late", 5)]);

        match driver.resume(&mut group, 0.0) {
            Resume::Failed(err) => assert!(err.is_execution()),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(log.borrow().is_empty());
        assert!(driver.resume(&mut group, 0.0).is_failed());
    }

    #[test]
    fn wait_first_stops_at_the_first_finisher() {
        let driver = Driver::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut race = wait_first(vec![counted(&log, "a", 3), counted(&log, "b", 5)]);

        assert!(driver.resume(&mut race, 0.0).is_suspended());
        assert!(driver.resume(&mut race, 0.0).is_suspended());
        assert_eq!(
            driver.resume(&mut race, 0.0).completed(),
            Some(First { index: 0, value: "a" })
        );
        assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2", "a3"]);
        assert!(driver.resume(&mut race, 0.0).is_failed());
        assert_eq!(log.borrow().len(), 5);
    }

    #[test]
    fn wait_first_time_boxes_a_forever_task() {
        let driver = Driver::new();
        let frames = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&frames);
        let mut race = wait_first(vec![
            forever(move |_| *counter.borrow_mut() += 1).boxed(),
            wait(1.0).boxed(),
        ]);
        let mut now = 0.0;
        while driver.resume(&mut race, now).is_suspended() {
            now += 0.25;
        }
        assert_eq!(*frames.borrow(), 5);
    }

    #[test]
    fn wait_first_between_two_event_waits() {
        let driver = Driver::new();
        let normal = EventTarget::<&'static str>::new();
        let hard = EventTarget::<&'static str>::new();
        let mut menu = wait_first(vec![
            wait_event(normal.clone(), "click").boxed(),
            wait_event(hard.clone(), "click").boxed(),
        ]);
        assert!(driver.resume(&mut menu, 0.0).is_suspended());
        hard.dispatch("click", &"hard");
        let choice = driver.resume(&mut menu, 0.0).completed();
        assert_eq!(choice, Some(First { index: 1, value: "hard" }));
        assert_eq!(normal.listener_count("click"), 0);
        assert_eq!(hard.listener_count("click"), 0);
    }

    #[test]
    fn empty_wait_first_is_a_configuration_error() {
        let driver = Driver::new();
        let mut race = wait_first(Vec::<BoxTask<()>>::new());
        match driver.resume(&mut race, 0.0) {
            Resume::Failed(err) => assert!(err.is_configuration()),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn wait_first_propagates_child_failure() {
        let driver = Driver::new();
        let mut race = wait_first(vec![
            wait(10.0).boxed(),
            poll_fn(|_| Resume::<()>::Failed(Error::execution("lost audio"))).boxed(),
        ]);
        assert!(driver.resume(&mut race, 0.0).is_failed());
    }
}
