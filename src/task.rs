//! Resumable units of cooperative work.
//!
//! A [`Task`] is an explicit state machine with a single [`Task::resume`]
//! operation. Each call runs the task until it either suspends, completes with
//! a value, or fails. Nothing runs when a task is constructed; the first
//! resumption starts it.

use std::marker::PhantomData;

use crate::error::Error;
use crate::scheduler::Spawner;

/// Outcome of a single resumption.
#[derive(Debug)]
pub enum Resume<T> {
    /// The task yielded and wants to be resumed again later.
    Suspended,
    /// The task finished with a value.
    Completed(T),
    /// The task failed; it must not be resumed again.
    Failed(Error),
}

impl<T> Resume<T> {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn map<U, F>(self, f: F) -> Resume<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Suspended => Resume::Suspended,
            Self::Completed(value) => Resume::Completed(f(value)),
            Self::Failed(err) => Resume::Failed(err),
        }
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<crate::Result<T>> for Resume<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(err) => Self::Failed(err),
        }
    }
}

/// Per-resumption view handed to a task by whoever drives it.
pub struct TaskContext<'a> {
    now: f64,
    frame: u64,
    spawner: &'a Spawner,
}

impl<'a> TaskContext<'a> {
    pub fn new(now: f64, frame: u64, spawner: &'a Spawner) -> Self {
        Self {
            now,
            frame,
            spawner,
        }
    }

    /// Clock reading taken at the start of the current tick.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of ticks the driving scheduler completed before this one.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Admits or cancels tasks on the driving scheduler.
    pub fn spawner(&self) -> &Spawner {
        self.spawner
    }
}

/// A suspendable computation.
pub trait Task {
    type Output;

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<Self::Output>;
}

pub type BoxTask<T> = Box<dyn Task<Output = T>>;

impl<T> Task for Box<T>
where
    T: Task + ?Sized,
{
    type Output = T::Output;

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<Self::Output> {
        (**self).resume(cx)
    }
}

pub(crate) fn resumed_after_completion<T>(what: &str) -> Resume<T> {
    Resume::Failed(Error::invalid_state(format!(
        "{what} resumed after it finished"
    )))
}

/// Task driven by a closure that is called once per resumption.
pub struct PollFn<F> {
    poll: F,
    finished: bool,
}

pub fn poll_fn<T, F>(poll: F) -> PollFn<F>
where
    F: FnMut(&TaskContext<'_>) -> Resume<T>,
{
    PollFn {
        poll,
        finished: false,
    }
}

impl<T, F> Task for PollFn<F>
where
    F: FnMut(&TaskContext<'_>) -> Resume<T>,
{
    type Output = T;

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<T> {
        if self.finished {
            return resumed_after_completion("poll_fn task");
        }
        let step = (self.poll)(cx);
        self.finished = !step.is_suspended();
        step
    }
}

/// Runs `body` on every resumption and never completes.
///
/// The output type is free so a forever task can sit next to finite tasks in
/// [`wait_first`](crate::combinators::wait_first).
pub struct Forever<F, T> {
    body: F,
    _output: PhantomData<fn() -> T>,
}

pub fn forever<T, F>(body: F) -> Forever<F, T>
where
    F: FnMut(&TaskContext<'_>),
{
    Forever {
        body,
        _output: PhantomData,
    }
}

impl<T, F> Task for Forever<F, T>
where
    F: FnMut(&TaskContext<'_>),
{
    type Output = T;

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<T> {
        (self.body)(cx);
        Resume::Suspended
    }
}

/// Completes with `value` on its first resumption.
pub struct Ready<T>(Option<T>);

pub fn ready<T>(value: T) -> Ready<T> {
    Ready(Some(value))
}

impl<T> Task for Ready<T> {
    type Output = T;

    fn resume(&mut self, _cx: &TaskContext<'_>) -> Resume<T> {
        match self.0.take() {
            Some(value) => Resume::Completed(value),
            None => resumed_after_completion("ready task"),
        }
    }
}

/// Suspends once, then completes on the next resumption.
#[derive(Debug, Default)]
pub struct YieldNow {
    state: YieldState,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum YieldState {
    #[default]
    Fresh,
    Yielded,
    Done,
}

pub fn yield_now() -> YieldNow {
    YieldNow::default()
}

impl Task for YieldNow {
    type Output = ();

    fn resume(&mut self, _cx: &TaskContext<'_>) -> Resume<()> {
        match self.state {
            YieldState::Fresh => {
                self.state = YieldState::Yielded;
                Resume::Suspended
            }
            YieldState::Yielded => {
                self.state = YieldState::Done;
                Resume::Completed(())
            }
            YieldState::Done => resumed_after_completion("yield_now"),
        }
    }
}

/// Transforms the completion value of a task.
pub struct Map<T, F> {
    task: T,
    map: Option<F>,
}

impl<T, F, U> Task for Map<T, F>
where
    T: Task,
    F: FnOnce(T::Output) -> U,
{
    type Output = U;

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<U> {
        if self.map.is_none() {
            return resumed_after_completion("mapped task");
        }
        match self.task.resume(cx) {
            Resume::Suspended => Resume::Suspended,
            Resume::Completed(value) => match self.map.take() {
                Some(map) => Resume::Completed(map(value)),
                None => resumed_after_completion("mapped task"),
            },
            Resume::Failed(err) => {
                self.map = None;
                Resume::Failed(err)
            }
        }
    }
}

/// Runs one task, then delegates to the task built from its result.
///
/// The follow-up starts in the same resumption in which the first task
/// completes, so suspending inside it suspends the whole chain.
pub struct Then<A, B, F> {
    state: ThenState<A, B, F>,
}

enum ThenState<A, B, F> {
    First(A, F),
    Second(B),
    Done,
}

impl<A, B, F> Task for Then<A, B, F>
where
    A: Task,
    B: Task,
    F: FnOnce(A::Output) -> B,
{
    type Output = B::Output;

    fn resume(&mut self, cx: &TaskContext<'_>) -> Resume<B::Output> {
        loop {
            match std::mem::replace(&mut self.state, ThenState::Done) {
                ThenState::First(mut first, next) => match first.resume(cx) {
                    Resume::Suspended => {
                        self.state = ThenState::First(first, next);
                        return Resume::Suspended;
                    }
                    Resume::Completed(value) => self.state = ThenState::Second(next(value)),
                    Resume::Failed(err) => return Resume::Failed(err),
                },
                ThenState::Second(mut second) => {
                    let step = second.resume(cx);
                    if step.is_suspended() {
                        self.state = ThenState::Second(second);
                    }
                    return step;
                }
                ThenState::Done => return resumed_after_completion("sequenced task"),
            }
        }
    }
}

/// Combinator methods available on every task.
pub trait TaskExt: Task + Sized {
    fn map<U, F>(self, map: F) -> Map<Self, F>
    where
        F: FnOnce(Self::Output) -> U,
    {
        Map {
            task: self,
            map: Some(map),
        }
    }

    fn then<B, F>(self, next: F) -> Then<Self, B, F>
    where
        B: Task,
        F: FnOnce(Self::Output) -> B,
    {
        Then {
            state: ThenState::First(self, next),
        }
    }

    fn boxed(self) -> BoxTask<Self::Output>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<T: Task> TaskExt for T {}
