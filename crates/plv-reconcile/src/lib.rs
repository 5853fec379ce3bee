//! Reconciliation engine.
//!
//! Architectural decisions:
//! - ONE entry point. The synchronous verify call, the gateway webhook, and
//!   the admin manual override all funnel into [`ReconcileEngine::reconcile`];
//!   they differ only in how they obtained the [`GatewayVerdict`].
//! - Idempotency is keyed on the payment's `tx_ref`. A payment that has
//!   reached `completed` is never re-applied; the second caller gets
//!   [`OutcomeStatus::AlreadyProcessed`] and zero writes happen.
//! - The idempotency gate is re-checked **after** the exclusive row claim is
//!   acquired, so two near-simultaneous triggers serialize and exactly one
//!   applies the monetary effect (and the room-occupancy increment).
//! - Only definitive gateway verdicts reach this crate. Transport/decode
//!   errors are surfaced to the caller by the gateway client and never mutate
//!   payment or booking state; the gateway is also never called while a row
//!   claim is held.
//! - Post-commit side effects go through [`ReconcileHook`]s; a failing hook
//!   is logged and dropped, never rolled into the reconciliation result.

mod engine;
mod memory;
mod store;

pub use engine::{
    OutcomeStatus, ReconcileEngine, ReconcileError, ReconcileHook, ReconciliationOutcome,
};
pub use memory::MemoryStore;
pub use store::{
    BookingStore, Clock, FeeConfig, FixedClock, ReconcileGuard, ReconcileStore, StaticFees,
    SystemClock,
};
