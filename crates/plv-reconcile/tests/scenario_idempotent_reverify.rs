//! Scenario: Idempotent Re-Verification
//!
//! # Invariant under test
//! Calling `reconcile(tx, success)` twice in sequence produces the same final
//! booking/payment state as calling it once; the second call returns
//! `already_processed` and performs zero additional writes (occupancy in
//! particular is incremented at most once).

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use plv_booking::{Booking, BookingStatus, Payment, PaymentStatus, PaymentType, Room};
use plv_gateway::GatewayVerdict;
use plv_money::Money;
use plv_reconcile::{
    FixedClock, MemoryStore, OutcomeStatus, ReconcileEngine, StaticFees,
};

fn mwk(units: i64) -> Money {
    Money::from_major(units).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ts() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-08-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Room + pending full-payment booking + pending payment, tx_ref "bk_tx_1".
fn seed_pending_booking(store: &MemoryStore) -> (Uuid, Uuid) {
    let room_id = Uuid::new_v4();
    let booking_id = Uuid::new_v4();

    store.insert_room(Room {
        room_id,
        room_number: "12".into(),
        monthly_rate: mwk(50_000),
        booking_fee: Some(mwk(10_000)),
        occupants: 0,
    });
    store.insert_booking_record(Booking {
        booking_id,
        student_id: Uuid::new_v4(),
        room_id,
        start_date: date(2026, 9, 1),
        end_date: date(2026, 12, 1),
        duration_months: 3,
        status: BookingStatus::Pending,
        payment_type: PaymentType::Full,
        total_amount: mwk(152_500),
        monthly_rate: mwk(50_000),
        pending_op: None,
    });
    store.insert_payment_record(Payment {
        payment_id: Uuid::new_v4(),
        booking_id,
        amount: mwk(152_500),
        payment_type: PaymentType::Full,
        payment_method: "paychangu".into(),
        tx_ref: Some("bk_tx_1".into()),
        status: PaymentStatus::Pending,
        paid_at: None,
        meta: None,
    });

    (booking_id, room_id)
}

fn engine(store: &MemoryStore) -> ReconcileEngine<MemoryStore, StaticFees> {
    ReconcileEngine::new(store.clone(), StaticFees(mwk(2_500)))
        .with_clock(Arc::new(FixedClock(ts())))
}

#[tokio::test]
async fn second_reconcile_is_a_read_only_no_op() {
    let store = MemoryStore::new();
    let (booking_id, room_id) = seed_pending_booking(&store);
    let engine = engine(&store);

    // First call applies the transition.
    let first = engine
        .reconcile("bk_tx_1", GatewayVerdict::Success)
        .await
        .unwrap();
    assert_eq!(first.status, OutcomeStatus::Confirmed);
    assert_eq!(first.booking.status, BookingStatus::Confirmed);
    assert_eq!(first.payment.status, PaymentStatus::Completed);
    assert_eq!(first.payment.paid_at, Some(ts()));

    let booking_after_first = store.booking_record(booking_id).unwrap();
    let payment_after_first = store.payment_by_tx_ref("bk_tx_1").unwrap();

    // Second call: already processed, zero writes.
    let second = engine
        .reconcile("bk_tx_1", GatewayVerdict::Success)
        .await
        .unwrap();
    assert_eq!(second.status, OutcomeStatus::AlreadyProcessed);

    assert_eq!(store.booking_record(booking_id).unwrap(), booking_after_first);
    assert_eq!(store.payment_by_tx_ref("bk_tx_1").unwrap(), payment_after_first);
    assert_eq!(
        store.occupants(room_id),
        Some(1),
        "occupancy must be incremented exactly once across both calls"
    );
}

#[tokio::test]
async fn replayed_failure_webhook_after_success_does_not_unconfirm() {
    let store = MemoryStore::new();
    let (booking_id, _room) = seed_pending_booking(&store);
    let engine = engine(&store);

    engine
        .reconcile("bk_tx_1", GatewayVerdict::Success)
        .await
        .unwrap();

    // A stale retry claiming failure must hit the idempotency gate — a
    // completed payment is never revisited, whatever the replayed verdict.
    let replay = engine
        .reconcile("bk_tx_1", GatewayVerdict::Failed)
        .await
        .unwrap();
    assert_eq!(replay.status, OutcomeStatus::AlreadyProcessed);
    assert_eq!(
        store.booking_record(booking_id).unwrap().status,
        BookingStatus::Confirmed
    );
}

#[tokio::test]
async fn unknown_tx_ref_is_payment_not_found() {
    let store = MemoryStore::new();
    seed_pending_booking(&store);
    let engine = engine(&store);

    let err = engine
        .reconcile("bk_tx_never_issued", GatewayVerdict::Success)
        .await
        .unwrap_err();
    assert!(
        matches!(err, plv_reconcile::ReconcileError::PaymentNotFound { .. }),
        "got {err:?}"
    );
}
