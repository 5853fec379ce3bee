//! Persistence and environment seams for the reconciliation engine.
//!
//! The engine only ever touches storage through [`ReconcileStore`] /
//! [`ReconcileGuard`]. The guard is the claim-token of the design: a commit
//! is unreachable except through a guard obtained from `begin`, which makes
//! "read under lock, write under the same lock" an API requirement rather
//! than a convention. The Postgres implementation backs the guard with a
//! `SELECT … FOR UPDATE` transaction; the in-memory implementation with a
//! per-tx_ref mutex.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use plv_booking::{Booking, Payment, PaymentType, Room};
use plv_money::Money;

// ---------------------------------------------------------------------------
// ReconcileStore / ReconcileGuard
// ---------------------------------------------------------------------------

/// Storage entry point for reconciliation.
#[async_trait]
pub trait ReconcileStore: Send + Sync {
    /// Acquire an exclusive claim on the payment correlated with `tx_ref` and
    /// return it read under that claim.
    ///
    /// Returns `Ok(None)` when no payment carries this `tx_ref` — the gateway
    /// reported a transaction this system never initiated.
    ///
    /// The claim is held until the guard is committed or dropped; dropping
    /// without committing discards every staged change.
    async fn begin(&self, tx_ref: &str) -> anyhow::Result<Option<Box<dyn ReconcileGuard>>>;
}

/// An exclusive claim on one payment row plus the transaction scope for the
/// reconcile write-set.
#[async_trait]
pub trait ReconcileGuard: Send {
    /// The payment as read after the claim was acquired. Callers must base
    /// the idempotency decision on this snapshot, not on any earlier read.
    fn payment(&self) -> &Payment;

    /// The owning booking, with the room's current rate joined in.
    async fn booking(&mut self) -> anyhow::Result<Option<Booking>>;

    /// Sum of all completed payment amounts for the owning booking,
    /// excluding the payment identified by `exclude_tx_ref`.
    async fn completed_total_excluding(&mut self, exclude_tx_ref: &str) -> anyhow::Result<Money>;

    /// Persist the booking, the payment, and the room-occupancy delta as one
    /// atomic unit — committed together or not at all.
    async fn commit(
        self: Box<Self>,
        booking: &Booking,
        payment: &Payment,
        occupancy_delta: i64,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: ReconcileStore + ?Sized> ReconcileStore for Arc<T> {
    async fn begin(&self, tx_ref: &str) -> anyhow::Result<Option<Box<dyn ReconcileGuard>>> {
        (**self).begin(tx_ref).await
    }
}

// ---------------------------------------------------------------------------
// BookingStore
// ---------------------------------------------------------------------------

/// Plain CRUD seam used by the charge-initiation endpoints (no claim
/// semantics — those belong to reconciliation only).
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn room(&self, room_id: Uuid) -> anyhow::Result<Option<Room>>;

    async fn booking(&self, booking_id: Uuid) -> anyhow::Result<Option<Booking>>;

    async fn insert_booking(&self, booking: &Booking) -> anyhow::Result<()>;

    async fn update_booking(&self, booking: &Booking) -> anyhow::Result<()>;

    async fn insert_payment(&self, payment: &Payment) -> anyhow::Result<()>;

    /// Most recently created payment of the given type for a booking.
    async fn latest_payment_of_type(
        &self,
        booking_id: Uuid,
        kind: PaymentType,
    ) -> anyhow::Result<Option<Payment>>;

    /// Whether a `pending` payment of the given type exists. Gates the
    /// stuck-status reset: a reset must not orphan an in-flight charge.
    async fn has_pending_payment(
        &self,
        booking_id: Uuid,
        kind: PaymentType,
    ) -> anyhow::Result<bool>;
}

#[async_trait]
impl<T: BookingStore + ?Sized> BookingStore for Arc<T> {
    async fn room(&self, room_id: Uuid) -> anyhow::Result<Option<Room>> {
        (**self).room(room_id).await
    }

    async fn booking(&self, booking_id: Uuid) -> anyhow::Result<Option<Booking>> {
        (**self).booking(booking_id).await
    }

    async fn insert_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        (**self).insert_booking(booking).await
    }

    async fn update_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        (**self).update_booking(booking).await
    }

    async fn insert_payment(&self, payment: &Payment) -> anyhow::Result<()> {
        (**self).insert_payment(payment).await
    }

    async fn latest_payment_of_type(
        &self,
        booking_id: Uuid,
        kind: PaymentType,
    ) -> anyhow::Result<Option<Payment>> {
        (**self).latest_payment_of_type(booking_id, kind).await
    }

    async fn has_pending_payment(
        &self,
        booking_id: Uuid,
        kind: PaymentType,
    ) -> anyhow::Result<bool> {
        (**self).has_pending_payment(booking_id, kind).await
    }
}

// ---------------------------------------------------------------------------
// FeeConfig
// ---------------------------------------------------------------------------

/// Source of the platform fee. Read fresh at every recomputation — the fee
/// may change between bookings and the engine must never cache it.
#[async_trait]
pub trait FeeConfig: Send + Sync {
    async fn platform_fee(&self) -> anyhow::Result<Money>;
}

#[async_trait]
impl<T: FeeConfig + ?Sized> FeeConfig for Arc<T> {
    async fn platform_fee(&self) -> anyhow::Result<Money> {
        (**self).platform_fee().await
    }
}

/// Fixed fee for tests and single-tenant deployments.
#[derive(Debug, Clone, Copy)]
pub struct StaticFees(pub Money);

#[async_trait]
impl FeeConfig for StaticFees {
    async fn platform_fee(&self) -> anyhow::Result<Money> {
        Ok(self.0)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Injected time source, so `paid_at` stamps are deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the wrapped instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
