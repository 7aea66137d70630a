//! Event handler registry.
//!
//! Handlers are registered under an [`EventHandlerId`] and invoked by id
//! from the embedder's input handling. Each handler runs inside
//! [`Scheduler::run_with_priority`], so state updates it dispatches pick up
//! the handler's priority and the event's start time.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use weft_scheduler::{Priority, Scheduler};

/// Unique identifier for an event handler.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventHandlerId(pub usize);

impl fmt::Display for EventHandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type alias for event handler callbacks.
pub type EventCallback = Rc<dyn Fn()>;

struct Handler {
    priority: Priority,
    callback: EventCallback,
}

/// Registry that maps event handler IDs to callbacks.
pub struct EventRegistry {
    scheduler: Scheduler,
    handlers: RefCell<HashMap<EventHandlerId, Handler>>,
    next_id: Cell<usize>,
}

impl EventRegistry {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            handlers: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// Register a handler that runs at user-blocking priority.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let id = runtime.events().register(move || set_count.update(|n| n + 1));
    /// runtime.events().dispatch(id);
    /// ```
    pub fn register(&self, callback: impl Fn() + 'static) -> EventHandlerId {
        self.register_with_priority(Priority::UserBlocking, callback)
    }

    pub fn register_with_priority(
        &self,
        priority: Priority,
        callback: impl Fn() + 'static,
    ) -> EventHandlerId {
        let id = EventHandlerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers.borrow_mut().insert(
            id,
            Handler {
                priority,
                callback: Rc::new(callback),
            },
        );
        id
    }

    /// Dispatch an event to the handler with the given ID.
    ///
    /// Returns `true` if a handler was found and called, `false` otherwise.
    pub fn dispatch(&self, id: EventHandlerId) -> bool {
        let handler = self
            .handlers
            .borrow()
            .get(&id)
            .map(|handler| (handler.priority, handler.callback.clone()));
        let Some((priority, callback)) = handler else {
            tracing::debug!(handler = %id, "event for unknown handler ignored");
            return false;
        };
        tracing::debug!(handler = %id, %priority, "dispatching event");
        self.scheduler.run_with_priority(priority, || callback());
        true
    }

    pub fn remove(&self, id: EventHandlerId) -> bool {
        self.handlers.borrow_mut().remove(&id).is_some()
    }

    /// Clear all registered event handlers and restart ids from zero.
    pub fn clear(&self) {
        self.handlers.borrow_mut().clear();
        self.next_id.set(0);
    }

    /// Get the number of registered handlers (for debugging).
    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }
}
