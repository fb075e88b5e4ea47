//! Speculative state reconciliation for the game client.
//!
//! Feature code submits actions through a [`SessionHandle`] together with
//! the modifiers it expects them to have. The modifiers are layered over an
//! authoritative cache so the UI shows the anticipated result immediately,
//! while the session broadcasts the actions and reconciles the ledger's
//! evaluations as they confirm, fail or get rolled back.
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the session orchestrator and builder
//! - [`api`] exposes the types feature code interacts with
//! - [`overlay`] holds the authoritative cache and the speculative overlay
//! - [`router`] and [`handlers`] reconcile evaluations
//! - [`events`] provides the topic-based notification bus
//! - [`repository`] persists actions that were not broadcast yet
//! - [`workers`] keeps background tasks internal to the crate
pub mod api;
pub mod completion;
pub mod events;
pub mod handlers;
pub mod overlay;
pub mod queue;
pub mod repository;
pub mod router;
pub mod runtime;
pub mod shutdown;

mod workers;

pub use api::{PendingHandle, Result, RuntimeError, SessionHandle};
pub use completion::{Completion, CompletionNotifier};
pub use events::{EventBus, Notification, Topic};
pub use handlers::{HandlerRegistry, ReconcileContext, Reconciliation, ReconciliationHandler};
pub use overlay::{AuthoritativeCache, OverlayError, OverlayStore};
pub use queue::{ActionQueue, PendingAction};
pub use repository::{
    FilePendingStore, InMemoryPendingStore, PendingActionRepository, RepositoryError,
};
pub use router::{DispatchOutcome, EvaluationRouter, ObservedAddresses, RollbackOutcome};
pub use runtime::{PersistenceConfig, RuntimeConfig, Session, SessionBuilder};
pub use shutdown::ShutdownToken;
