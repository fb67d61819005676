use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use log::debug;
use parking_lot::{Mutex, ReentrantMutex};

/// Callback invoked synchronously whenever a subscribed event is dispatched.
pub type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Anything that can deliver named events to listeners.
pub trait EventSource<E> {
    /// Registers `listener` for `name`. Dropping or releasing the returned
    /// subscription removes the listener.
    fn subscribe(&self, name: &str, listener: Listener<E>) -> Subscription;
}

/// Owned registration of a listener. Removal happens exactly once, either via
/// [`unsubscribe`](Self::unsubscribe) or when the subscription is dropped.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

type SharedListener<E> = Arc<ReentrantMutex<RefCell<Listener<E>>>>;

struct Registry<E> {
    next_id: u64,
    listeners: HashMap<String, Vec<(u64, SharedListener<E>)>>,
}

/// In-process event target modelled on DOM `addEventListener`.
///
/// Clones share the same listener registry, so a clone can be handed to a
/// task while the host keeps another one for dispatching.
pub struct EventTarget<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for EventTarget<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> Default for EventTarget<E> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: HashMap::new(),
            })),
        }
    }
}

impl<E> EventTarget<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls every listener registered for `name` in subscription order and
    /// returns how many were notified.
    ///
    /// A listener that dispatches on this target from inside its own callback
    /// is skipped by the nested dispatch. Dispatches from other threads wait
    /// for the running callback instead.
    pub fn dispatch(&self, name: &str, event: &E) -> usize {
        let listeners: Vec<SharedListener<E>> = match self.registry.lock().listeners.get(name) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };
        let mut notified = 0;
        for listener in &listeners {
            let guard = listener.lock();
            let Ok(mut callback) = guard.try_borrow_mut() else {
                debug!("skipping re-entrant `{name}` listener");
                continue;
            };
            (*callback)(event);
            notified += 1;
        }
        notified
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.registry
            .lock()
            .listeners
            .get(name)
            .map_or(0, Vec::len)
    }
}

impl<E: 'static> EventSource<E> for EventTarget<E> {
    fn subscribe(&self, name: &str, listener: Listener<E>) -> Subscription {
        let id = {
            let mut registry = self.registry.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            registry
                .listeners
                .entry(name.to_string())
                .or_default()
                .push((id, Arc::new(ReentrantMutex::new(RefCell::new(listener)))));
            id
        };
        let registry: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        let name = name.to_string();
        Subscription::new(move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let mut registry = registry.lock();
            if let Some(entries) = registry.listeners.get_mut(&name) {
                entries.retain(|(entry, _)| *entry != id);
                if entries.is_empty() {
                    registry.listeners.remove(&name);
                }
            }
        })
    }
}

impl<E, S> EventSource<E> for Arc<S>
where
    S: EventSource<E> + ?Sized,
{
    fn subscribe(&self, name: &str, listener: Listener<E>) -> Subscription {
        (**self).subscribe(name, listener)
    }
}
