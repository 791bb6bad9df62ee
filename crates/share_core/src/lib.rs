//! Coordination layer for the case sharing screen: a scope-keyed event bus, the
//! confirmation gate in front of share removal, and the add/remove workflow that
//! talks to the share record store.

pub mod confirmation;
pub mod entity_cache;
pub mod event_bus;
pub mod workflow;

pub use confirmation::{
    ConfirmationCoordinator, ConfirmationModal, CoordinatorState, PendingRemoval,
    DEFAULT_CONFIRMATION_TIMEOUT,
};
pub use entity_cache::ShareEntityCache;
pub use event_bus::{
    ErrorSink, EventBus, ListenerCallback, ListenerFailure, ListenerHandle, TracingErrorSink,
};
pub use workflow::{AdditionOutcome, RemovalOutcome, ShareCommand, ShareWorkflow};
