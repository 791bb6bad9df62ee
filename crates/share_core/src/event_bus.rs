//! Scope-keyed publish/subscribe registry shared by the components of a page.

use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::{OwnerId, Scope},
    protocol::{BusEvent, EventName},
};
use thiserror::Error;
use tracing::{debug, error};

pub type ListenerCallback = Arc<dyn Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync>;

/// Returned by [`EventBus::register`]; one handle per `(event, callback, owner)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

#[derive(Debug, Error)]
#[error("listener owned by {owner} failed on {event}: {message}")]
pub struct ListenerFailure {
    pub event: EventName,
    pub owner: OwnerId,
    pub message: String,
}

/// Receives failures raised by listeners during delivery.
pub trait ErrorSink: Send + Sync {
    fn report(&self, failure: ListenerFailure);
}

pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, failure: ListenerFailure) {
        error!(
            event = %failure.event,
            owner = %failure.owner,
            error = %failure.message,
            "bus: listener failed"
        );
    }
}

struct Listener {
    handle: ListenerHandle,
    event_name: EventName,
    scope: Scope,
    owner: OwnerId,
    callback: ListenerCallback,
}

impl Listener {
    fn same_registration(
        &self,
        event_name: EventName,
        owner: &OwnerId,
        callback: &ListenerCallback,
    ) -> bool {
        self.event_name == event_name
            && &self.owner == owner
            && same_callback(&self.callback, callback)
    }
}

fn same_callback(a: &ListenerCallback, b: &ListenerCallback) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[derive(Default)]
struct Registry {
    next_handle: u64,
    listeners: Vec<Listener>,
}

pub struct EventBus {
    registry: Mutex<Registry>,
    error_sink: Arc<dyn ErrorSink>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_error_sink(Arc::new(TracingErrorSink))
    }

    pub fn with_error_sink(error_sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            error_sink,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a listener. Registering the same callback for the same event and owner
    /// again returns the existing handle and leaves the original scope in place.
    pub fn register(
        &self,
        event_name: EventName,
        scope: Scope,
        owner: OwnerId,
        callback: ListenerCallback,
    ) -> ListenerHandle {
        let mut registry = self.registry();
        if let Some(existing) = registry
            .listeners
            .iter()
            .find(|l| l.same_registration(event_name, &owner, &callback))
        {
            debug!(event = %event_name, %owner, "bus: duplicate registration ignored");
            return existing.handle;
        }

        registry.next_handle += 1;
        let handle = ListenerHandle(registry.next_handle);
        debug!(event = %event_name, %scope, %owner, "bus: listener registered");
        registry.listeners.push(Listener {
            handle,
            event_name,
            scope,
            owner,
            callback,
        });
        handle
    }

    /// Removes the listener behind `handle`. Returns false if it was already gone.
    ///
    /// Later emits skip the listener, and so does the rest of an emit on the same
    /// thread. A delivery that another thread has already started may still
    /// complete after this returns.
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        let mut registry = self.registry();
        let before = registry.listeners.len();
        registry.listeners.retain(|l| l.handle != handle);
        before != registry.listeners.len()
    }

    /// Removes every listener registered by `owner`; used when a component detaches.
    pub fn unregister_all(&self, owner: &OwnerId) -> usize {
        let mut registry = self.registry();
        let before = registry.listeners.len();
        registry.listeners.retain(|l| &l.owner != owner);
        let removed = before - registry.listeners.len();
        if removed > 0 {
            debug!(%owner, removed, "bus: owner listeners removed");
        }
        removed
    }

    pub fn is_registered(&self, handle: ListenerHandle) -> bool {
        self.registry().listeners.iter().any(|l| l.handle == handle)
    }

    pub fn listener_count(&self, event_name: EventName) -> usize {
        self.registry()
            .listeners
            .iter()
            .filter(|l| l.event_name == event_name)
            .count()
    }

    /// Delivers `event` in registration order to every listener for its name whose
    /// scope is compatible with `scope`. Returns the number of listeners invoked.
    ///
    /// Listeners run without the registry lock held, so they may register or
    /// unregister. A listener removed by an earlier one in the same emit is skipped.
    /// Failures, including panics, go to the error sink and never reach the caller.
    pub fn emit(&self, scope: &Scope, event: BusEvent) -> usize {
        let event_name = event.name();
        let targets: Vec<(ListenerHandle, OwnerId, ListenerCallback)> = self
            .registry()
            .listeners
            .iter()
            .filter(|l| l.event_name == event_name && l.scope.is_compatible(scope))
            .map(|l| (l.handle, l.owner.clone(), Arc::clone(&l.callback)))
            .collect();

        if targets.is_empty() {
            debug!(event = %event_name, %scope, "bus: no listeners");
            return 0;
        }

        let mut delivered = 0;
        for (handle, owner, callback) in targets {
            if !self.is_registered(handle) {
                continue;
            }
            delivered += 1;
            let message = match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic) => panic_message(panic.as_ref()),
            };
            self.error_sink.report(ListenerFailure {
                event: event_name,
                owner,
                message,
            });
        }
        delivered
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
