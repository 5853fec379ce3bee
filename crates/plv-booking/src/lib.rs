//! Booking/payment domain types and the explicit booking state machine.
//!
//! Architectural decisions:
//! - One status enum + one transition function. Every entry point (landlord
//!   approve/reject, student cancel, extension/completion requests, the three
//!   payment-verification triggers, stuck-status recovery) applies events
//!   through [`Booking::apply`] instead of re-implementing guards inline.
//! - Illegal events return [`TransitionError`] and leave the booking
//!   untouched; callers surface it as a domain error, never swallow it.
//! - In-flight operation parameters live in [`PendingOp`], a tagged variant
//!   validated at write time — not a free-form key/value map.
//!
//! Deterministic, pure logic. No IO. No clock reads (callers pass timestamps).

mod state_machine;
mod types;

pub use state_machine::{BookingEvent, ExtensionFlow, TransitionError, MAX_EXTENSION_MONTHS};
pub use types::{
    Booking, BookingStatus, Payment, PaymentMeta, PaymentStatus, PaymentType, PendingOp, Room,
    StatusParseError,
};
