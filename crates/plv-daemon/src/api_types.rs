//! Request and response types for all plv-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded by
//! Axum and decoded by tests. No business logic lives here. Monetary fields
//! travel as exact minor-unit integers, never floats.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// POST /v1/payments/verify  /v1/admin/payments/manual-verify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub tx_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualVerifyRequest {
    pub tx_ref: String,
    /// "success" | "failure" — the admin-asserted gateway outcome.
    pub verdict: String,
}

/// Rendered reconciliation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResponse {
    /// "confirmed" | "failed" | "already_processed"
    pub status: String,
    pub booking_id: Uuid,
    pub booking_status: String,
    pub payment_status: String,
    pub payment_type: String,
    pub total_amount_minor: i64,
    pub end_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// POST /v1/bookings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub student_id: Uuid,
    pub room_id: Uuid,
    pub start_date: NaiveDate,
    pub duration_months: u32,
    /// "booking_fee" | "full"
    pub payment_type: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Response for every endpoint that opens a gateway checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub booking_id: Uuid,
    pub tx_ref: String,
    pub checkout_url: String,
    pub amount_minor: i64,
    pub booking_status: String,
}

// ---------------------------------------------------------------------------
// POST /v1/bookings/:id/extension-status  /:id/extend  /:id/complete
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionStatusRequest {
    pub additional_months: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendRequest {
    pub additional_months: u32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Two-step extension flow + stuck-state self-healing outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateResponse {
    pub message: String,
    pub booking_status: String,
    /// What the client should do next:
    /// "initiate_payment" | "complete_payment" | "retry_extension" | "none"
    pub action_required: String,
}

// ---------------------------------------------------------------------------
// POST /v1/bookings/:id/reset-extension  /:id/reset-completion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub message: String,
    pub booking_status: String,
}
