use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, error, warn};

use crate::clock::Clock;
use crate::diagnostics::DiagnosticLog;
use crate::error::Error;
use crate::task::{BoxTask, Resume, Task, TaskContext, TaskExt};

/// Identifies a task admitted to a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

struct Entry {
    handle: TaskHandle,
    task: BoxTask<()>,
}

#[derive(Default)]
struct Admissions {
    next_id: u64,
    pending: VecDeque<Entry>,
    cancelled: HashSet<TaskHandle>,
}

/// Cloneable handle for admitting and cancelling tasks.
///
/// Tasks admitted through a spawner wait in a queue until the next tick
/// begins, so a task added while a tick is running is first resumed on the
/// following tick.
#[derive(Clone, Default)]
pub struct Spawner {
    admissions: Rc<RefCell<Admissions>>,
}

impl Spawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T>(&self, task: T) -> TaskHandle
    where
        T: Task + 'static,
    {
        let mut admissions = self.admissions.borrow_mut();
        admissions.next_id += 1;
        let handle = TaskHandle(admissions.next_id);
        admissions.pending.push_back(Entry {
            handle,
            task: task.map(|_| ()).boxed(),
        });
        debug!("queued {handle}");
        handle
    }

    /// Cancels a task. Queued tasks are dropped immediately; running tasks are
    /// dropped before their next resumption.
    pub fn remove(&self, handle: TaskHandle) {
        // the task is dropped after the borrow ends; its captures may spawn
        let dropped = {
            let mut admissions = self.admissions.borrow_mut();
            let index = admissions
                .pending
                .iter()
                .position(|entry| entry.handle == handle);
            match index {
                Some(index) => admissions.pending.remove(index),
                None => {
                    admissions.cancelled.insert(handle);
                    None
                }
            }
        };
        drop(dropped);
        debug!("cancelled {handle}");
    }

    fn drain_pending(&self) -> VecDeque<Entry> {
        std::mem::take(&mut self.admissions.borrow_mut().pending)
    }

    fn take_cancelled(&self, handle: TaskHandle) -> bool {
        let mut admissions = self.admissions.borrow_mut();
        !admissions.cancelled.is_empty() && admissions.cancelled.remove(&handle)
    }

    fn take_all_cancelled(&self) -> HashSet<TaskHandle> {
        std::mem::take(&mut self.admissions.borrow_mut().cancelled)
    }

    fn pending_len(&self) -> usize {
        self.admissions.borrow().pending.len()
    }

    fn is_pending(&self, handle: TaskHandle) -> bool {
        self.admissions
            .borrow()
            .pending
            .iter()
            .any(|entry| entry.handle == handle)
    }
}

/// Owns a set of tasks and resumes each of them once per [`tick`](Self::tick).
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    entries: Vec<Entry>,
    spawner: Spawner,
    frame: u64,
    diagnostics: Option<DiagnosticLog>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Vec::new(),
            spawner: Spawner::new(),
            frame: 0,
            diagnostics: None,
        }
    }

    /// Reports task failures into `log` in addition to the `log` facade.
    pub fn with_diagnostics(mut self, log: DiagnosticLog) -> Self {
        self.diagnostics = Some(log);
        self
    }

    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Number of ticks completed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn add<T>(&mut self, task: T) -> TaskHandle
    where
        T: Task + 'static,
    {
        self.spawner.add(task)
    }

    /// Drops a task without resuming it again. Returns `false` when the handle
    /// is not known to this scheduler.
    pub fn remove(&mut self, handle: TaskHandle) -> bool {
        if self.spawner.is_pending(handle) {
            self.spawner.remove(handle);
            return true;
        }
        let before = self.entries.len();
        self.entries.retain(|entry| entry.handle != handle);
        let removed = self.entries.len() != before;
        if removed {
            debug!("removed {handle}");
        } else {
            warn!("attempted to remove unknown {handle}");
        }
        removed
    }

    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.entries.iter().any(|entry| entry.handle == handle) || self.spawner.is_pending(handle)
    }

    /// Number of live tasks, including ones waiting for the next tick.
    pub fn len(&self) -> usize {
        self.entries.len() + self.spawner.pending_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resumes every task present at the start of the call once, in the order
    /// the tasks were added. Tasks added while the pass runs wait for the next
    /// tick. A failing task is reported and dropped; its siblings still run.
    pub fn tick(&mut self) {
        self.apply_cancellations();
        self.entries.extend(self.spawner.drain_pending());

        let cx = TaskContext::new(self.clock.now(), self.frame, &self.spawner);
        let mut entries = std::mem::take(&mut self.entries);
        entries.retain_mut(|entry| {
            if self.spawner.take_cancelled(entry.handle) {
                return false;
            }
            match resume_catching_panics(entry, &cx) {
                Resume::Suspended => true,
                Resume::Completed(()) => {
                    debug!("{} completed", entry.handle);
                    false
                }
                Resume::Failed(err) => {
                    self.report(entry.handle, &err);
                    false
                }
            }
        });
        self.entries = entries;
        self.apply_cancellations();
        self.frame += 1;
    }

    fn apply_cancellations(&mut self) {
        let cancelled = self.spawner.take_all_cancelled();
        if !cancelled.is_empty() {
            self.entries
                .retain(|entry| !cancelled.contains(&entry.handle));
        }
    }

    fn report(&self, handle: TaskHandle, err: &Error) {
        error!("{handle} failed: {err}");
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.push(format!("{handle} failed: {err}"));
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.entries.len())
            .field("pending", &self.spawner.pending_len())
            .field("frame", &self.frame)
            .finish()
    }
}

fn resume_catching_panics(entry: &mut Entry, cx: &TaskContext<'_>) -> Resume<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| entry.task.resume(cx))) {
        Ok(step) => step,
        Err(panic) => Resume::Failed(Error::Execution(anyhow!(
            "task panicked: {}",
            panic_message(panic)
        ))),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}
