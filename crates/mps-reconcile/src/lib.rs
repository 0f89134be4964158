//! mps-reconcile
//!
//! Catalog reconciliation primitives:
//! - Ticket lifecycle (Open -> Resolved | Abandoned) and the in-memory registry
//! - Monotonic sync watermark
//! - Partition of changed rows into upsert / removal batches
//! - Full-catalog audit diff against the marketplace listing
//!
//! Deterministic, pure logic. No IO. No marketplace calls.

mod audit;
mod partition;
mod registry;
mod types;
pub mod watermark;

pub use audit::audit;
pub use partition::{partition, partition_for_retry};
pub use registry::TicketRegistry;
pub use types::*;
pub use watermark::{SyncWatermark, WatermarkAdvance};
