//! The booking state machine.
//!
//! # State diagram (simplified)
//!
//! ```text
//!   create()          Approve                 RequestExtension
//!   ───────► Pending ─────────► Confirmed ◄───────────────────┐
//!               │                │   │                        │
//!      Reject   │   Cancel       │   └──► ExtensionInProgress │
//!   ──► Rejected│──► Cancelled   │        PendingExtension ───┤ ExtensionVerified
//!      (term.)       (term.)     │                            │
//!                                └──► CompletingPayment ──────┘ CompletionVerified
//!
//!   OriginalChargeVerified: any non-terminal ──► Confirmed
//!   ChargeFailed:           any non-terminal ──► PaymentFailed
//!   ResetStuck:             in-progress state ──► Confirmed
//! ```
//!
//! Late gateway verdicts for a `Rejected`/`Cancelled` booking are illegal —
//! a closed booking must not be resurrected by a retried webhook. Callers
//! treat the resulting [`TransitionError`] as a data-integrity alert.

use chrono::{DateTime, NaiveDate, Utc};
use plv_money::{add_months, Money};

use crate::types::{Booking, BookingStatus, PaymentType, PendingOp};

/// Upper bound on months added by a single extension request.
pub const MAX_EXTENSION_MONTHS: u32 = 2;

// ---------------------------------------------------------------------------
// ExtensionFlow
// ---------------------------------------------------------------------------

/// Which entry point opened the extension gate. Both flows behave identically
/// downstream; the status value records the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionFlow {
    /// Two-step flow: the status-update endpoint marks the booking first,
    /// payment initiation follows.
    StatusUpdate,
    /// Single-step flow: the dedicated extend endpoint initiates the charge
    /// directly.
    DirectInitiate,
}

impl ExtensionFlow {
    fn in_progress_status(self) -> BookingStatus {
        match self {
            ExtensionFlow::StatusUpdate => BookingStatus::ExtensionInProgress,
            ExtensionFlow::DirectInitiate => BookingStatus::PendingExtension,
        }
    }
}

// ---------------------------------------------------------------------------
// BookingEvent
// ---------------------------------------------------------------------------

/// Events that drive booking state transitions.
///
/// Monetary effects (`new_total`) are computed by the reconciliation engine
/// from persisted state and carried in; the state machine itself never reads
/// fees or payment sums.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingEvent {
    /// Landlord accepted the booking request.
    Approve,
    /// Landlord declined the booking request (→ terminal `Rejected`).
    Reject,
    /// Student withdrew the booking request (→ terminal `Cancelled`).
    Cancel,
    /// Student asked to lengthen the stay; opens the extension gate.
    RequestExtension {
        additional_months: u32,
        today: NaiveDate,
        requested_at: DateTime<Utc>,
        flow: ExtensionFlow,
    },
    /// Student asked to convert a booking fee into full payment.
    RequestCompletion {
        today: NaiveDate,
        initiated_at: DateTime<Utc>,
    },
    /// Gateway verified the original (booking-fee or full) charge.
    OriginalChargeVerified,
    /// Gateway verified an extension charge.
    ExtensionVerified {
        additional_months: u32,
        new_total: Money,
    },
    /// Gateway verified a completion charge.
    CompletionVerified { new_total: Money },
    /// Gateway reported a definitive failure for the in-flight charge.
    ChargeFailed,
    /// Stuck-status recovery: drop an abandoned in-progress operation.
    /// Callers must first check that no pending payment of the relevant type
    /// exists — the state machine cannot see the payment table.
    ResetStuck,
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when an event cannot legally be applied in the current state.
///
/// The booking is left exactly as it was. Callers surface this as a domain
/// error distinct from not-found; for gateway-driven events it additionally
/// warrants a data-integrity log line.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionError {
    /// The state the booking was in when the illegal event arrived.
    pub from: BookingStatus,
    /// Debug string of the event that was rejected.
    pub event: String,
}

impl TransitionError {
    fn new(from: BookingStatus, event: &BookingEvent) -> Self {
        Self {
            from,
            event: format!("{event:?}"),
        }
    }
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal booking transition: {} + {}",
            self.from.as_str(),
            self.event
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Transition application
// ---------------------------------------------------------------------------

impl Booking {
    /// Apply an event to this booking.
    ///
    /// # Errors
    /// Returns [`TransitionError`] for illegal transitions; the booking is not
    /// modified in that case.
    pub fn apply(&mut self, event: BookingEvent) -> Result<(), TransitionError> {
        use BookingEvent::*;
        use BookingStatus::*;

        match (self.status, &event) {
            // --------------------------------------------------------------
            // Landlord / student decisions on a fresh request.
            // --------------------------------------------------------------
            (Pending, Approve) => self.status = Confirmed,
            (Pending, Reject) => self.status = Rejected,
            (Pending, Cancel) => self.status = Cancelled,

            // --------------------------------------------------------------
            // Extension gate. Only an active confirmed stay that has not yet
            // ended can be extended, and only by a bounded number of months.
            // --------------------------------------------------------------
            (
                Confirmed,
                RequestExtension {
                    additional_months,
                    today,
                    requested_at,
                    flow,
                },
            ) => {
                if self.end_date < *today
                    || *additional_months < 1
                    || *additional_months > MAX_EXTENSION_MONTHS
                {
                    return Err(TransitionError::new(self.status, &event));
                }
                self.pending_op = Some(PendingOp::Extension {
                    additional_months: *additional_months,
                    original_end_date: self.end_date,
                    requested_at: *requested_at,
                });
                self.status = flow.in_progress_status();
            }

            // --------------------------------------------------------------
            // Completion gate. Booking-fee bookings only, before checkout.
            // --------------------------------------------------------------
            (
                Confirmed,
                RequestCompletion {
                    today,
                    initiated_at,
                },
            ) => {
                if self.payment_type != PaymentType::BookingFee || self.end_date < *today {
                    return Err(TransitionError::new(self.status, &event));
                }
                self.pending_op = Some(PendingOp::Completion {
                    initiated_at: *initiated_at,
                });
                self.status = CompletingPayment;
            }

            // --------------------------------------------------------------
            // Original charge verdicts. Accepted from any non-terminal state:
            // the verify trigger may observe the booking in Pending,
            // PaymentFailed (retry) or already Confirmed (webhook raced the
            // sync verify). Never from a closed booking.
            // --------------------------------------------------------------
            (s, OriginalChargeVerified) if !s.is_terminal() => self.status = Confirmed,

            // --------------------------------------------------------------
            // Extension verdict: only while the extension gate is open.
            // --------------------------------------------------------------
            (
                ExtensionInProgress | PendingExtension,
                ExtensionVerified {
                    additional_months,
                    new_total,
                },
            ) => {
                let new_end = add_months(self.end_date, *additional_months)
                    .ok_or_else(|| TransitionError::new(self.status, &event))?;
                self.end_date = new_end;
                self.duration_months += *additional_months;
                self.total_amount = *new_total;
                self.pending_op = None;
                self.status = Confirmed;
            }

            // --------------------------------------------------------------
            // Completion verdict: only while the completion gate is open.
            // --------------------------------------------------------------
            (CompletingPayment, CompletionVerified { new_total }) => {
                self.payment_type = PaymentType::Full;
                self.total_amount = *new_total;
                self.pending_op = None;
                self.status = Confirmed;
            }

            // --------------------------------------------------------------
            // Definitive gateway failure: any non-terminal state. No monetary
            // effect; pending_op is kept so a retried charge can reuse it.
            // --------------------------------------------------------------
            (s, ChargeFailed) if !s.is_terminal() => self.status = PaymentFailed,

            // --------------------------------------------------------------
            // Stuck-status recovery.
            // --------------------------------------------------------------
            (s, ResetStuck) if s.is_operation_in_progress() => {
                self.pending_op = None;
                self.status = Confirmed;
            }

            // --------------------------------------------------------------
            // Everything else is illegal.
            // --------------------------------------------------------------
            _ => return Err(TransitionError::new(self.status, &event)),
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
