//! mps-runtime
//!
//! The reconciliation engine and its scheduler.
//!
//! [`Engine`] owns the ticket registry, the committed watermark and the retry
//! queue behind one async mutex, so the sync, ticket, audit and trigger passes
//! never interleave. [`Scheduler`] drives those passes from independent
//! timers plus a debounced trigger inbox, and stops them on shutdown.

mod engine;
mod scheduler;
mod summary;
mod trigger;

pub use engine::{Engine, EngineConfig, EngineSnapshot};
pub use scheduler::Scheduler;
pub use summary::{PassKind, PassSummary};
pub use trigger::TriggerInbox;
