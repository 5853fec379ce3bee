//! Scenario: Concurrent Verification Applies Exactly Once
//!
//! # Invariant under test
//! Two concurrent `reconcile(tx, success)` calls for the same
//! never-before-seen tx_ref (the webhook racing the client's verify-after-
//! redirect poll) result in exactly one `confirmed` transition and exactly
//! one room-occupancy increment.
//!
//! The per-tx_ref claim serializes the callers; whichever acquires it second
//! re-reads the payment under the claim, finds it completed, and becomes a
//! read-only `already_processed`.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use plv_booking::{Booking, BookingStatus, Payment, PaymentStatus, PaymentType, Room};
use plv_gateway::GatewayVerdict;
use plv_money::Money;
use plv_reconcile::{MemoryStore, OutcomeStatus, ReconcileEngine, StaticFees};

fn mwk(units: i64) -> Money {
    Money::from_major(units).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn seed(store: &MemoryStore) -> (Uuid, Uuid) {
    let room_id = Uuid::new_v4();
    let booking_id = Uuid::new_v4();

    store.insert_room(Room {
        room_id,
        room_number: "7".into(),
        monthly_rate: mwk(50_000),
        booking_fee: None,
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
        tx_ref: Some("bk_race_1".into()),
        status: PaymentStatus::Pending,
        paid_at: None,
        meta: None,
    });

    (booking_id, room_id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn webhook_and_sync_verify_race_applies_once() {
    let store = MemoryStore::new();
    let (booking_id, room_id) = seed(&store);

    let engine = Arc::new(ReconcileEngine::new(
        store.clone(),
        StaticFees(mwk(2_500)),
    ));

    // Trigger (a): the student's verify-after-redirect call.
    let e1 = Arc::clone(&engine);
    let sync_verify =
        tokio::spawn(async move { e1.reconcile("bk_race_1", GatewayVerdict::Success).await });

    // Trigger (b): the gateway webhook, near-simultaneously.
    let e2 = Arc::clone(&engine);
    let webhook =
        tokio::spawn(async move { e2.reconcile("bk_race_1", GatewayVerdict::Success).await });

    let a = sync_verify.await.unwrap().unwrap();
    let b = webhook.await.unwrap().unwrap();

    let confirmed = [a.status, b.status]
        .iter()
        .filter(|s| **s == OutcomeStatus::Confirmed)
        .count();
    let already = [a.status, b.status]
        .iter()
        .filter(|s| **s == OutcomeStatus::AlreadyProcessed)
        .count();
    assert_eq!(
        (confirmed, already),
        (1, 1),
        "exactly one trigger may apply the transition: got {:?} / {:?}",
        a.status,
        b.status
    );

    assert_eq!(
        store.occupants(room_id),
        Some(1),
        "room occupancy must be incremented exactly once"
    );

    let booking = store.booking_record(booking_id).unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.total_amount, mwk(152_500));

    let payment = store.payment_by_tx_ref("bk_race_1").unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_concurrent_triggers_still_apply_once() {
    let store = MemoryStore::new();
    let (_booking, room_id) = seed(&store);

    let engine = Arc::new(ReconcileEngine::new(
        store.clone(),
        StaticFees(mwk(2_500)),
    ));

    // Webhook retries + admin re-runs + polling client, all at once.
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let e = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            e.reconcile("bk_race_1", GatewayVerdict::Success).await
        }));
    }

    let mut confirmed = 0;
    for t in tasks {
        let outcome = t.await.unwrap().unwrap();
        if outcome.status == OutcomeStatus::Confirmed {
            confirmed += 1;
        }
    }

    assert_eq!(confirmed, 1, "exactly one of the 8 triggers may win");
    assert_eq!(store.occupants(room_id), Some(1));
}
