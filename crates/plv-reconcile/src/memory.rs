//! Deterministic in-memory store for tests and dev wiring.
//!
//! Mirrors the Postgres store's locking shape: `begin` takes a per-tx_ref
//! async mutex (the row-lock stand-in) and only then snapshots the payment,
//! so the idempotency gate always evaluates post-claim state. All staged
//! changes land in one `commit` under the data lock — dropping the guard
//! without committing discards everything, exactly like a rolled-back
//! transaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use plv_booking::{Booking, Payment, PaymentStatus, PaymentType, Room};
use plv_money::Money;

use crate::store::{BookingStore, ReconcileGuard, ReconcileStore};

#[derive(Debug, Default)]
struct Data {
    rooms: HashMap<Uuid, Room>,
    bookings: HashMap<Uuid, Booking>,
    /// Insertion-ordered so "latest payment of type" is well defined.
    payments: Vec<Payment>,
}

#[derive(Debug, Default)]
struct State {
    data: StdMutex<Data>,
    claims: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_room(&self, room: Room) {
        self.data().rooms.insert(room.room_id, room);
    }

    pub fn insert_booking_record(&self, booking: Booking) {
        self.data().bookings.insert(booking.booking_id, booking);
    }

    pub fn insert_payment_record(&self, payment: Payment) {
        self.data().payments.push(payment);
    }

    pub fn booking_record(&self, booking_id: Uuid) -> Option<Booking> {
        self.data().bookings.get(&booking_id).cloned()
    }

    pub fn payment_by_tx_ref(&self, tx_ref: &str) -> Option<Payment> {
        self.data()
            .payments
            .iter()
            .find(|p| p.tx_ref.as_deref() == Some(tx_ref))
            .cloned()
    }

    pub fn occupants(&self, room_id: Uuid) -> Option<u32> {
        self.data().rooms.get(&room_id).map(|r| r.occupants)
    }

    fn data(&self) -> std::sync::MutexGuard<'_, Data> {
        self.state.data.lock().expect("memory store poisoned")
    }

    fn claim_handle(&self, tx_ref: &str) -> Arc<AsyncMutex<()>> {
        let mut claims = self.state.claims.lock().expect("memory store poisoned");
        claims
            .entry(tx_ref.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

// ---------------------------------------------------------------------------
// ReconcileStore
// ---------------------------------------------------------------------------

struct MemoryGuard {
    store: MemoryStore,
    payment: Payment,
    _claim: OwnedMutexGuard<()>,
}

#[async_trait]
impl ReconcileStore for MemoryStore {
    async fn begin(&self, tx_ref: &str) -> anyhow::Result<Option<Box<dyn ReconcileGuard>>> {
        // Claim first, snapshot second: a concurrent caller that loses the
        // race must observe the winner's writes.
        let claim = self.claim_handle(tx_ref).lock_owned().await;

        let payment = match self.payment_by_tx_ref(tx_ref) {
            Some(p) => p,
            None => return Ok(None),
        };

        Ok(Some(Box::new(MemoryGuard {
            store: self.clone(),
            payment,
            _claim: claim,
        })))
    }
}

#[async_trait]
impl ReconcileGuard for MemoryGuard {
    fn payment(&self) -> &Payment {
        &self.payment
    }

    async fn booking(&mut self) -> anyhow::Result<Option<Booking>> {
        Ok(self.store.booking_record(self.payment.booking_id))
    }

    async fn completed_total_excluding(&mut self, exclude_tx_ref: &str) -> anyhow::Result<Money> {
        let data = self.store.data();
        let mut total = Money::ZERO;
        for p in data
            .payments
            .iter()
            .filter(|p| p.booking_id == self.payment.booking_id)
            .filter(|p| p.status == PaymentStatus::Completed)
            .filter(|p| p.tx_ref.as_deref() != Some(exclude_tx_ref))
        {
            total = total
                .checked_add(p.amount)
                .context("completed payments sum overflow")?;
        }
        Ok(total)
    }

    async fn commit(
        self: Box<Self>,
        booking: &Booking,
        payment: &Payment,
        occupancy_delta: i64,
    ) -> anyhow::Result<()> {
        let mut data = self.store.data();

        if occupancy_delta != 0 {
            let room = data
                .rooms
                .get_mut(&booking.room_id)
                .ok_or_else(|| anyhow!("room {} not found", booking.room_id))?;
            let new = i64::from(room.occupants) + occupancy_delta;
            room.occupants = u32::try_from(new)
                .map_err(|_| anyhow!("occupancy underflow for room {}", booking.room_id))?;
        }

        data.bookings.insert(booking.booking_id, booking.clone());
        match data
            .payments
            .iter_mut()
            .find(|p| p.payment_id == payment.payment_id)
        {
            Some(slot) => *slot = payment.clone(),
            None => data.payments.push(payment.clone()),
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BookingStore
// ---------------------------------------------------------------------------

#[async_trait]
impl BookingStore for MemoryStore {
    async fn room(&self, room_id: Uuid) -> anyhow::Result<Option<Room>> {
        Ok(self.data().rooms.get(&room_id).cloned())
    }

    async fn booking(&self, booking_id: Uuid) -> anyhow::Result<Option<Booking>> {
        Ok(self.booking_record(booking_id))
    }

    async fn insert_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        self.insert_booking_record(booking.clone());
        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        let mut data = self.data();
        if !data.bookings.contains_key(&booking.booking_id) {
            return Err(anyhow!("booking {} not found", booking.booking_id));
        }
        data.bookings.insert(booking.booking_id, booking.clone());
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> anyhow::Result<()> {
        self.insert_payment_record(payment.clone());
        Ok(())
    }

    async fn latest_payment_of_type(
        &self,
        booking_id: Uuid,
        kind: PaymentType,
    ) -> anyhow::Result<Option<Payment>> {
        Ok(self
            .data()
            .payments
            .iter()
            .rev()
            .find(|p| p.booking_id == booking_id && p.payment_type == kind)
            .cloned())
    }

    async fn has_pending_payment(
        &self,
        booking_id: Uuid,
        kind: PaymentType,
    ) -> anyhow::Result<bool> {
        Ok(self.data().payments.iter().any(|p| {
            p.booking_id == booking_id
                && p.payment_type == kind
                && p.status == PaymentStatus::Pending
        }))
    }
}
