//! Request and response types for the mps-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/products/:id/sync
// ---------------------------------------------------------------------------

/// Body of a `202 Accepted` trigger response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerAccepted {
    pub product_id: String,
    /// False when the ID was already waiting for the next debounced flush.
    pub newly_queued: bool,
    /// IDs waiting in the inbox after this request.
    pub pending: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
