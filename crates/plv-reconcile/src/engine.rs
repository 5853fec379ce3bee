use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use plv_booking::{Booking, BookingEvent, Payment, PaymentMeta, PaymentStatus, PaymentType, PendingOp, TransitionError};
use plv_gateway::GatewayVerdict;
use plv_money::{full_payment_total, recompute_after_extension, MoneyError};

use crate::store::{Clock, FeeConfig, ReconcileStore, SystemClock};

// ---------------------------------------------------------------------------
// ReconcileError
// ---------------------------------------------------------------------------

/// Failures of a single `reconcile` invocation.
///
/// `PaymentNotFound` and `BookingNotFound` are permanent data-integrity
/// faults: the gateway reported a transaction this system never initiated,
/// or the owning booking vanished. `Transition` is a guard violation — a
/// verdict arrived for a booking whose state cannot legally accept it.
/// `Store` wraps infrastructure failures and is the only retryable variant.
#[derive(Debug)]
pub enum ReconcileError {
    PaymentNotFound {
        tx_ref: String,
    },
    BookingNotFound {
        tx_ref: String,
        booking_id: Uuid,
    },
    /// An extension payment reached reconciliation without its months
    /// parameter. Cannot happen through this crate's initiation path; flags
    /// a row written by something else.
    InvalidPaymentMeta {
        tx_ref: String,
    },
    Transition(TransitionError),
    Money(MoneyError),
    Store(anyhow::Error),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::PaymentNotFound { tx_ref } => {
                write!(f, "no payment correlates tx_ref {tx_ref:?}")
            }
            ReconcileError::BookingNotFound { tx_ref, booking_id } => write!(
                f,
                "payment {tx_ref:?} references missing booking {booking_id}"
            ),
            ReconcileError::InvalidPaymentMeta { tx_ref } => {
                write!(f, "extension payment {tx_ref:?} carries no months parameter")
            }
            ReconcileError::Transition(e) => write!(f, "{e}"),
            ReconcileError::Money(e) => write!(f, "{e}"),
            ReconcileError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Transition(e) => Some(e),
            ReconcileError::Money(e) => Some(e),
            ReconcileError::Store(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<TransitionError> for ReconcileError {
    fn from(e: TransitionError) -> Self {
        ReconcileError::Transition(e)
    }
}

impl From<MoneyError> for ReconcileError {
    fn from(e: MoneyError) -> Self {
        ReconcileError::Money(e)
    }
}

// ---------------------------------------------------------------------------
// ReconciliationOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The verdict was success and the booking is (now) confirmed.
    Confirmed,
    /// The verdict was failure; payment and booking record the failure.
    Failed,
    /// The payment had already reached `completed`; nothing was written.
    /// A success, not an error — callers render "already confirmed".
    AlreadyProcessed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Confirmed => "confirmed",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::AlreadyProcessed => "already_processed",
        }
    }
}

/// Result of a reconcile invocation: the outcome plus the final persisted
/// state of both records.
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub status: OutcomeStatus,
    pub booking: Booking,
    pub payment: Payment,
}

// ---------------------------------------------------------------------------
// ReconcileHook
// ---------------------------------------------------------------------------

/// Post-commit side-effect hook (receipt email, push notifications).
///
/// Invoked after a successful commit only. Must treat the call as
/// fire-and-forget: errors are logged by the engine and never surface as a
/// reconciliation failure.
#[async_trait]
pub trait ReconcileHook: Send + Sync {
    async fn on_reconciled(&self, booking: &Booking, payment: &Payment) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ReconcileEngine
// ---------------------------------------------------------------------------

pub struct ReconcileEngine<S, F> {
    store: S,
    fees: F,
    clock: Arc<dyn Clock>,
    hooks: Vec<Arc<dyn ReconcileHook>>,
}

impl<S, F> ReconcileEngine<S, F>
where
    S: ReconcileStore,
    F: FeeConfig,
{
    pub fn new(store: S, fees: F) -> Self {
        Self {
            store,
            fees,
            clock: Arc::new(SystemClock),
            hooks: Vec::new(),
        }
    }

    /// Replace the time source (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a post-commit hook. Hooks run in registration order.
    pub fn add_hook(mut self, hook: Arc<dyn ReconcileHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Apply a definitive gateway verdict to the payment correlated with
    /// `tx_ref`, exactly once.
    ///
    /// Safe to call repeatedly and concurrently for the same `tx_ref`: the
    /// exclusive claim serializes callers and the post-claim idempotency gate
    /// turns every call after the first successful one into a read-only
    /// `AlreadyProcessed`.
    pub async fn reconcile(
        &self,
        tx_ref: &str,
        verdict: GatewayVerdict,
    ) -> Result<ReconciliationOutcome, ReconcileError> {
        let mut guard = self
            .store
            .begin(tx_ref)
            .await
            .map_err(ReconcileError::Store)?
            .ok_or_else(|| {
                error!(tx_ref, "gateway reported a transaction we never initiated");
                ReconcileError::PaymentNotFound {
                    tx_ref: tx_ref.to_string(),
                }
            })?;

        let mut payment = guard.payment().clone();

        // Idempotency gate, evaluated on the post-claim snapshot. Webhook
        // retries, double-clicked verify buttons and admin re-runs all land
        // here on every call after the first.
        if payment.status == PaymentStatus::Completed {
            let booking = self.fetch_booking(guard.as_mut(), &payment, tx_ref).await?;
            info!(tx_ref, booking_id = %booking.booking_id, "already processed; no-op");
            return Ok(ReconciliationOutcome {
                status: OutcomeStatus::AlreadyProcessed,
                booking,
                payment,
            });
        }

        let mut booking = self.fetch_booking(guard.as_mut(), &payment, tx_ref).await?;

        match verdict {
            // ----------------------------------------------------------
            // Definitive failure: record it on both rows, touch no money.
            // ----------------------------------------------------------
            GatewayVerdict::Failed => {
                payment.status = PaymentStatus::Failed;
                booking.apply(BookingEvent::ChargeFailed)?;
                guard
                    .commit(&booking, &payment, 0)
                    .await
                    .map_err(ReconcileError::Store)?;
                info!(tx_ref, booking_id = %booking.booking_id, "charge failed; booking marked payment_failed");
                Ok(ReconciliationOutcome {
                    status: OutcomeStatus::Failed,
                    booking,
                    payment,
                })
            }

            // ----------------------------------------------------------
            // Definitive success: complete the payment, apply the one
            // matching transition, recompute money from persisted state.
            // ----------------------------------------------------------
            GatewayVerdict::Success => {
                payment.status = PaymentStatus::Completed;
                payment.paid_at = Some(self.clock.now());

                let occupancy_delta = match payment.payment_type {
                    // The original charge confirms the booking and fills a
                    // bed. Its amount was fixed at creation; the stored
                    // total stands.
                    PaymentType::BookingFee | PaymentType::Full => {
                        booking.apply(BookingEvent::OriginalChargeVerified)?;
                        1
                    }

                    // Extension: additive — sum of completed payments plus
                    // this one. The student already occupies the room, so no
                    // occupancy change.
                    PaymentType::Extension => {
                        let additional_months =
                            extension_months(&payment, &booking).ok_or_else(|| {
                                ReconcileError::InvalidPaymentMeta {
                                    tx_ref: tx_ref.to_string(),
                                }
                            })?;
                        let prior = guard
                            .completed_total_excluding(tx_ref)
                            .await
                            .map_err(ReconcileError::Store)?;
                        let new_total = recompute_after_extension(prior, payment.amount)?;
                        booking.apply(BookingEvent::ExtensionVerified {
                            additional_months,
                            new_total,
                        })?;
                        0
                    }

                    // Completion: from-scratch recompute under the full
                    // payment model, with the fee read fresh.
                    PaymentType::Complete => {
                        let fee = self
                            .fees
                            .platform_fee()
                            .await
                            .map_err(ReconcileError::Store)?;
                        let new_total = full_payment_total(
                            booking.monthly_rate,
                            booking.duration_months,
                            fee,
                        )?;
                        booking.apply(BookingEvent::CompletionVerified { new_total })?;
                        0
                    }
                };

                guard
                    .commit(&booking, &payment, occupancy_delta)
                    .await
                    .map_err(ReconcileError::Store)?;

                info!(
                    tx_ref,
                    booking_id = %booking.booking_id,
                    payment_type = payment.payment_type.as_str(),
                    total = %booking.total_amount,
                    "reconciled"
                );

                for hook in &self.hooks {
                    if let Err(e) = hook.on_reconciled(&booking, &payment).await {
                        warn!(tx_ref, error = %e, "post-commit hook failed; dropped");
                    }
                }

                Ok(ReconciliationOutcome {
                    status: OutcomeStatus::Confirmed,
                    booking,
                    payment,
                })
            }
        }
    }

    async fn fetch_booking(
        &self,
        guard: &mut dyn crate::store::ReconcileGuard,
        payment: &Payment,
        tx_ref: &str,
    ) -> Result<Booking, ReconcileError> {
        guard
            .booking()
            .await
            .map_err(ReconcileError::Store)?
            .ok_or_else(|| {
                error!(
                    tx_ref,
                    booking_id = %payment.booking_id,
                    "payment references a booking that does not exist"
                );
                ReconcileError::BookingNotFound {
                    tx_ref: tx_ref.to_string(),
                    booking_id: payment.booking_id,
                }
            })
    }
}

/// Months for an extension verdict: the payment's own parameters first, the
/// booking's open gate as fallback.
fn extension_months(payment: &Payment, booking: &Booking) -> Option<u32> {
    match &payment.meta {
        Some(PaymentMeta::Extension {
            additional_months, ..
        }) => Some(*additional_months),
        None => match &booking.pending_op {
            Some(PendingOp::Extension {
                additional_months, ..
            }) => Some(*additional_months),
            _ => None,
        },
    }
}
