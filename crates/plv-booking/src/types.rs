use chrono::{DateTime, NaiveDate, Utc};
use plv_money::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StatusParseError
// ---------------------------------------------------------------------------

/// A status/type text column held a value outside the enum.
///
/// Only reachable when the database row was written by something other than
/// this crate — treated as a data-integrity fault by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusParseError {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for StatusParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for StatusParseError {}

// ---------------------------------------------------------------------------
// BookingStatus
// ---------------------------------------------------------------------------

/// All valid states a booking can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, awaiting payment and/or landlord approval.
    Pending,
    /// Original charge verified (or landlord-approved); booking is active.
    Confirmed,
    /// The most recent charge attempt failed at the gateway. Recoverable only
    /// through a fresh charge attempt.
    PaymentFailed,
    /// Landlord rejected the request. **Terminal.**
    Rejected,
    /// Student cancelled the request. **Terminal.**
    Cancelled,
    /// An extension charge is in flight (requested via the status-update flow).
    ExtensionInProgress,
    /// An extension charge is in flight (requested via the direct extend flow).
    PendingExtension,
    /// A booking-fee → full completion charge is in flight.
    CompletingPayment,
}

impl BookingStatus {
    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    /// `true` while an extension or completion charge is in flight.
    pub fn is_operation_in_progress(&self) -> bool {
        matches!(
            self,
            Self::ExtensionInProgress | Self::PendingExtension | Self::CompletingPayment
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::PaymentFailed => "payment_failed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::ExtensionInProgress => "extension_in_progress",
            BookingStatus::PendingExtension => "pending_extension",
            BookingStatus::CompletingPayment => "completing_payment",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StatusParseError> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "payment_failed" => Ok(BookingStatus::PaymentFailed),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "extension_in_progress" => Ok(BookingStatus::ExtensionInProgress),
            "pending_extension" => Ok(BookingStatus::PendingExtension),
            "completing_payment" => Ok(BookingStatus::CompletingPayment),
            other => Err(StatusParseError {
                kind: "booking status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentType
// ---------------------------------------------------------------------------

/// What a payment (or a booking's standing charge model) pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Partial upfront payment, convertible to `Full` via completion.
    BookingFee,
    /// Full rent for the agreed term.
    Full,
    /// Follow-up charge lengthening an active stay.
    Extension,
    /// Follow-up charge converting a booking fee into full payment.
    Complete,
}

impl PaymentType {
    /// `true` for the charge that first confirms a booking (and fills a bed).
    pub fn is_original_charge(&self) -> bool {
        matches!(self, Self::BookingFee | Self::Full)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::BookingFee => "booking_fee",
            PaymentType::Full => "full",
            PaymentType::Extension => "extension",
            PaymentType::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StatusParseError> {
        match s {
            "booking_fee" => Ok(PaymentType::BookingFee),
            "full" => Ok(PaymentType::Full),
            "extension" => Ok(PaymentType::Extension),
            "complete" => Ok(PaymentType::Complete),
            other => Err(StatusParseError {
                kind: "payment type",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StatusParseError> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(StatusParseError {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// PendingOp
// ---------------------------------------------------------------------------

/// Parameters of the one in-flight operation a booking may carry.
///
/// At most one extension/completion charge may be pending per booking; that
/// is enforced by the status gate, and this variant records what the gate was
/// opened for. Cleared when the operation completes or is reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PendingOp {
    Extension {
        additional_months: u32,
        /// Checkout date before the extension, kept for receipts.
        original_end_date: NaiveDate,
        requested_at: DateTime<Utc>,
    },
    Completion {
        initiated_at: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// PaymentMeta
// ---------------------------------------------------------------------------

/// Typed operation parameters carried by a follow-up payment record.
///
/// Written at charge-initiation time; reconciliation reads it to apply the
/// extension without trusting anything client-supplied at verify time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentMeta {
    Extension {
        additional_months: u32,
        original_end_date: NaiveDate,
    },
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// The slice of a room the booking core reads: pricing and occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: Uuid,
    pub room_number: String,
    pub monthly_rate: Money,
    /// Partial upfront amount, when the hostel offers booking-fee holds.
    pub booking_fee: Option<Money>,
    pub occupants: u32,
}

// ---------------------------------------------------------------------------
// Booking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: Uuid,
    pub student_id: Uuid,
    pub room_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Contractually agreed term length. The single source of truth for
    /// duration — never re-derived from the date range.
    pub duration_months: u32,
    pub status: BookingStatus,
    pub payment_type: PaymentType,
    /// Always equals the gateway-verified total under the current
    /// `payment_type`; recomputed by reconciliation, never accumulated ad hoc.
    pub total_amount: Money,
    /// Room rate at load time, joined in by the store.
    pub monthly_rate: Money,
    pub pending_op: Option<PendingOp>,
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

/// One attempted charge. The unit of reconciliation idempotency: `tx_ref`
/// correlates exactly one gateway transaction, and a payment that has reached
/// `completed` is never revisited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub payment_method: String,
    /// Gateway correlation key. `None` only before gateway initiation; after
    /// that it is load-bearing for idempotency and unique per attempt.
    pub tx_ref: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub meta: Option<PaymentMeta>,
}
