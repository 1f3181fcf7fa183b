//! The scheduling core: invokes job bodies over HTTP, keeps the live
//! set of armed jobs firing on schedule, reconciles that live set
//! against the database and prunes history, and exposes the thin
//! control surface the API layer drives.

pub mod control;
pub mod dispatcher;
pub mod health;
pub mod invoker;
pub mod reconciler;

pub use control::Control;
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats};
pub use health::{HealthSnapshot, HealthState};
pub use invoker::{InvocationRequest, Invoker, InvokerConfig};
pub use reconciler::{Reconciler, ReconcilerConfig};
