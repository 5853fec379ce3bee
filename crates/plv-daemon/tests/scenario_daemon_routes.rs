//! In-process scenario tests for plv-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket,
//! backed by the in-memory store and the scripted paper gateway. Each test
//! calls `routes::build_router` and drives it via `tower::ServiceExt::oneshot`
//! — no network I/O required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use chrono::{DateTime, NaiveDate, Utc};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt; // oneshot
use uuid::Uuid;

use plv_booking::{Booking, BookingStatus, Payment, PaymentStatus, PaymentType, Room};
use plv_daemon::{routes, state};
use plv_gateway::{webhook, PaperGateway};
use plv_money::Money;
use plv_reconcile::{FixedClock, MemoryStore, StaticFees};

const WEBHOOK_SECRET: &str = "whsec_test";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

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

struct Harness {
    store: MemoryStore,
    gateway: Arc<PaperGateway>,
    state: Arc<state::AppState>,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::new();
        let gateway = Arc::new(PaperGateway::new());
        let state = Arc::new(state::AppState::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            gateway.clone(),
            Arc::new(StaticFees(mwk(2_500))),
            Arc::new(FixedClock(ts())),
            WEBHOOK_SECRET.to_string(),
            state::PaymentUrls::default(),
            Vec::new(),
        ));
        Self {
            store,
            gateway,
            state,
        }
    }

    fn router(&self) -> axum::Router {
        routes::build_router(Arc::clone(&self.state))
    }

    /// Room + booking + pending payment, returning (booking_id, room_id).
    fn seed_booking(&self, status: BookingStatus, payment_type: PaymentType) -> (Uuid, Uuid) {
        let room_id = Uuid::new_v4();
        let booking_id = Uuid::new_v4();

        self.store.insert_room(Room {
            room_id,
            room_number: "12".into(),
            monthly_rate: mwk(50_000),
            booking_fee: Some(mwk(10_000)),
            occupants: 0,
        });
        self.store.insert_booking_record(Booking {
            booking_id,
            student_id: Uuid::new_v4(),
            room_id,
            start_date: date(2026, 9, 1),
            end_date: date(2026, 12, 1),
            duration_months: 3,
            status,
            payment_type,
            total_amount: mwk(152_500),
            monthly_rate: mwk(50_000),
            pending_op: None,
        });
        self.store.insert_payment_record(Payment {
            payment_id: Uuid::new_v4(),
            booking_id,
            amount: mwk(152_500),
            payment_type,
            payment_method: "paychangu".into(),
            tx_ref: Some(format!("bk_{booking_id}")),
            status: PaymentStatus::Pending,
            paid_at: None,
            meta: None,
        });

        (booking_id, room_id)
    }
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<axum::body::Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

async fn call(
    router: axum::Router,
    req: Request<axum::body::Body>,
) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let h = Harness::new();
    let req = Request::builder()
        .method("GET")
        .uri("/v1/health")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = call(h.router(), req).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "plv-daemon");
}

// ---------------------------------------------------------------------------
// POST /v1/payments/verify
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verify_confirms_booking_then_reports_already_processed() {
    let h = Harness::new();
    let (booking_id, room_id) = h.seed_booking(BookingStatus::Pending, PaymentType::Full);
    let tx_ref = format!("bk_{booking_id}");
    h.gateway.script_success(&tx_ref);

    let (status, body) = call(
        h.router(),
        json_request("POST", "/v1/payments/verify", json!({ "tx_ref": tx_ref })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["booking_status"], "confirmed");
    assert_eq!(json["total_amount_minor"], 15_250_000_i64);

    // Replay: distinct success variant, no second application.
    let (status, body) = call(
        h.router(),
        json_request("POST", "/v1/payments/verify", json!({ "tx_ref": tx_ref })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "already_processed");
    assert_eq!(h.store.occupants(room_id), Some(1));
}

#[tokio::test]
async fn verify_maps_gateway_outage_to_502_and_touches_nothing() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Pending, PaymentType::Full);
    let tx_ref = format!("bk_{booking_id}");
    h.gateway.script_outage(&tx_ref);

    let (status, _body) = call(
        h.router(),
        json_request("POST", "/v1/payments/verify", json!({ "tx_ref": tx_ref })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    // Timeout semantics: both records untouched.
    assert_eq!(
        h.store.booking_record(booking_id).unwrap().status,
        BookingStatus::Pending
    );
    assert_eq!(
        h.store.payment_by_tx_ref(&tx_ref).unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn verify_unknown_payment_is_404() {
    let h = Harness::new();
    h.gateway.script_success("bk_ghost");

    let (status, _body) = call(
        h.router(),
        json_request("POST", "/v1/payments/verify", json!({ "tx_ref": "bk_ghost" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// POST /v1/payments/webhook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn webhook_without_signature_is_rejected() {
    let h = Harness::new();
    let req = Request::builder()
        .method("POST")
        .uri("/v1/payments/webhook")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"tx_ref":"bk_x"}"#))
        .unwrap();

    let (status, _body) = call(h.router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_with_tampered_signature_is_rejected() {
    let h = Harness::new();
    let body = r#"{"tx_ref":"bk_x"}"#;
    let sig = webhook::sign("wrong-secret", body.as_bytes());

    let req = Request::builder()
        .method("POST")
        .uri("/v1/payments/webhook")
        .header("content-type", "application/json")
        .header("signature", sig)
        .body(axum::body::Body::from(body))
        .unwrap();

    let (status, _body) = call(h.router(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_webhook_reconciles_and_answers_204() {
    let h = Harness::new();
    let (booking_id, room_id) = h.seed_booking(BookingStatus::Pending, PaymentType::Full);
    let tx_ref = format!("bk_{booking_id}");
    h.gateway.script_success(&tx_ref);

    let body = json!({ "data": { "tx_ref": tx_ref, "status": "success" } }).to_string();
    let sig = webhook::sign(WEBHOOK_SECRET, body.as_bytes());

    let req = Request::builder()
        .method("POST")
        .uri("/v1/payments/webhook")
        .header("content-type", "application/json")
        .header("signature", sig)
        .body(axum::body::Body::from(body))
        .unwrap();

    let (status, _body) = call(h.router(), req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(
        h.store.booking_record(booking_id).unwrap().status,
        BookingStatus::Confirmed
    );
    assert_eq!(h.store.occupants(room_id), Some(1));
}

#[tokio::test]
async fn webhook_retry_after_success_stays_204_and_single_increment() {
    let h = Harness::new();
    let (booking_id, room_id) = h.seed_booking(BookingStatus::Pending, PaymentType::Full);
    let tx_ref = format!("bk_{booking_id}");
    h.gateway.script_success(&tx_ref);

    let body = json!({ "tx_ref": tx_ref }).to_string();
    let sig = webhook::sign(WEBHOOK_SECRET, body.as_bytes());

    for _ in 0..3 {
        let req = Request::builder()
            .method("POST")
            .uri("/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("signature", sig.clone())
            .body(axum::body::Body::from(body.clone()))
            .unwrap();
        let (status, _b) = call(h.router(), req).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    assert_eq!(h.store.occupants(room_id), Some(1));
}

// ---------------------------------------------------------------------------
// POST /v1/admin/payments/manual-verify
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_verify_applies_admin_asserted_verdict() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Pending, PaymentType::Full);
    let tx_ref = format!("bk_{booking_id}");

    // No gateway scripting at all: the admin override never calls it.
    let (status, body) = call(
        h.router(),
        json_request(
            "POST",
            "/v1/admin/payments/manual-verify",
            json!({ "tx_ref": tx_ref, "verdict": "success" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "confirmed");
}

#[tokio::test]
async fn manual_verify_failure_marks_payment_failed() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Pending, PaymentType::Full);
    let tx_ref = format!("bk_{booking_id}");

    let (status, body) = call(
        h.router(),
        json_request(
            "POST",
            "/v1/admin/payments/manual-verify",
            json!({ "tx_ref": tx_ref, "verdict": "failure" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "failed");
    assert_eq!(
        h.store.booking_record(booking_id).unwrap().status,
        BookingStatus::PaymentFailed
    );
}

#[tokio::test]
async fn manual_verify_rejects_unknown_verdict_word() {
    let h = Harness::new();
    let (status, _body) = call(
        h.router(),
        json_request(
            "POST",
            "/v1/admin/payments/manual-verify",
            json!({ "tx_ref": "bk_x", "verdict": "probably" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// POST /v1/bookings — create + checkout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_booking_opens_checkout() {
    let h = Harness::new();
    let room_id = Uuid::new_v4();
    h.store.insert_room(Room {
        room_id,
        room_number: "3A".into(),
        monthly_rate: mwk(50_000),
        booking_fee: Some(mwk(10_000)),
        occupants: 0,
    });

    let (status, body) = call(
        h.router(),
        json_request(
            "POST",
            "/v1/bookings",
            json!({
                "student_id": Uuid::new_v4(),
                "room_id": room_id,
                "start_date": "2026-09-01",
                "duration_months": 3,
                "payment_type": "full",
                "email": "student@example.com",
                "first_name": "Thoko",
                "last_name": "Banda"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let json = parse_json(body);
    assert_eq!(json["amount_minor"], 15_250_000_i64, "50000×3 + 2500 fee");
    assert_eq!(json["booking_status"], "pending");
    let checkout = json["checkout_url"].as_str().unwrap();
    assert!(checkout.starts_with("paper:checkout:"), "got {checkout}");

    let booking_id: Uuid = json["booking_id"].as_str().unwrap().parse().unwrap();
    let booking = h.store.booking_record(booking_id).unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.end_date, date(2026, 12, 1));
}

#[tokio::test]
async fn create_booking_rejects_unknown_payment_type() {
    let h = Harness::new();
    let (status, _b) = call(
        h.router(),
        json_request(
            "POST",
            "/v1/bookings",
            json!({
                "student_id": Uuid::new_v4(),
                "room_id": Uuid::new_v4(),
                "start_date": "2026-09-01",
                "duration_months": 3,
                "payment_type": "installments",
                "email": "s@example.com",
                "first_name": "T",
                "last_name": "B"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Extension / completion guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn extension_status_on_pending_booking_is_409() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Pending, PaymentType::Full);

    let (status, _b) = call(
        h.router(),
        json_request(
            "POST",
            &format!("/v1/bookings/{booking_id}/extension-status"),
            json!({ "additional_months": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        h.store.booking_record(booking_id).unwrap().status,
        BookingStatus::Pending,
        "guard violation must leave the booking unchanged"
    );
}

#[tokio::test]
async fn extension_status_marks_confirmed_booking_in_progress() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Confirmed, PaymentType::Full);

    let (status, body) = call(
        h.router(),
        json_request(
            "POST",
            &format!("/v1/bookings/{booking_id}/extension-status"),
            json!({ "additional_months": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["booking_status"], "extension_in_progress");
}

#[tokio::test]
async fn direct_extend_uses_pending_extension_and_opens_checkout() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Confirmed, PaymentType::Full);

    let (status, body) = call(
        h.router(),
        json_request(
            "POST",
            &format!("/v1/bookings/{booking_id}/extend"),
            json!({
                "additional_months": 2,
                "email": "s@example.com",
                "first_name": "T",
                "last_name": "B"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["booking_status"], "pending_extension");
    assert_eq!(json["amount_minor"], 10_250_000_i64, "50000×2 + 2500 fee");

    let tx_ref = json["tx_ref"].as_str().unwrap();
    assert!(tx_ref.starts_with("ext_"), "got {tx_ref}");
    let payment = h.store.payment_by_tx_ref(tx_ref).unwrap();
    assert_eq!(payment.payment_type, PaymentType::Extension);
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn complete_requires_booking_fee_payment_type() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Confirmed, PaymentType::Full);

    let (status, _b) = call(
        h.router(),
        json_request(
            "POST",
            &format!("/v1/bookings/{booking_id}/complete"),
            json!({ "email": "s@example.com", "first_name": "T", "last_name": "B" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn complete_charges_server_computed_remainder() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Confirmed, PaymentType::BookingFee);
    // Seeded total 152_500 is the full-payment figure; make it a realistic
    // booking-fee total instead.
    let mut booking = h.store.booking_record(booking_id).unwrap();
    booking.total_amount = mwk(12_500);
    h.store.insert_booking_record(booking);

    let (status, body) = call(
        h.router(),
        json_request(
            "POST",
            &format!("/v1/bookings/{booking_id}/complete"),
            json!({ "email": "s@example.com", "first_name": "T", "last_name": "B" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["booking_status"], "completing_payment");
    assert_eq!(
        json["amount_minor"],
        14_000_000_i64,
        "152500 full total - 12500 already paid"
    );
    assert!(json["tx_ref"].as_str().unwrap().starts_with("complete_"));
}

// ---------------------------------------------------------------------------
// Reset endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reset_extension_refused_while_charge_is_pending() {
    let h = Harness::new();
    let (booking_id, _room) =
        h.seed_booking(BookingStatus::ExtensionInProgress, PaymentType::Full);
    // Seeded payment is Pending with payment_type Full; add a pending
    // extension charge, which is what blocks the reset.
    h.store.insert_payment_record(Payment {
        payment_id: Uuid::new_v4(),
        booking_id,
        amount: mwk(102_500),
        payment_type: PaymentType::Extension,
        payment_method: "paychangu".into(),
        tx_ref: Some(format!("ext_{booking_id}")),
        status: PaymentStatus::Pending,
        paid_at: None,
        meta: None,
    });

    let (status, _b) = call(
        h.router(),
        json_request(
            "POST",
            &format!("/v1/bookings/{booking_id}/reset-extension"),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        h.store.booking_record(booking_id).unwrap().status,
        BookingStatus::ExtensionInProgress
    );
}

#[tokio::test]
async fn reset_extension_recovers_abandoned_gate() {
    let h = Harness::new();
    let (booking_id, _room) =
        h.seed_booking(BookingStatus::ExtensionInProgress, PaymentType::Full);

    let (status, body) = call(
        h.router(),
        json_request(
            "POST",
            &format!("/v1/bookings/{booking_id}/reset-extension"),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["booking_status"], "confirmed");
}

#[tokio::test]
async fn reset_completion_requires_completing_payment_status() {
    let h = Harness::new();
    let (booking_id, _room) = h.seed_booking(BookingStatus::Confirmed, PaymentType::BookingFee);

    let (status, _b) = call(
        h.router(),
        json_request(
            "POST",
            &format!("/v1/bookings/{booking_id}/reset-completion"),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Unknown routes return 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let h = Harness::new();
    let req = Request::builder()
        .method("GET")
        .uri("/v1/does_not_exist")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, _b) = call(h.router(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
