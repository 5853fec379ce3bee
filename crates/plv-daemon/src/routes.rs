//! Axum router and all HTTP handlers for plv-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` and thin: guards live in
//! the booking state machine, money in plv-money, and verdict application in
//! the reconcile engine. The three verification entry points (sync verify,
//! webhook, admin manual override) differ only in how the verdict is
//! obtained before the shared `reconcile` call.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use plv_booking::{
    Booking, BookingEvent, BookingStatus, ExtensionFlow, Payment, PaymentMeta, PaymentStatus,
    PaymentType, PendingOp,
};
use plv_gateway::{txref, webhook, GatewayError, GatewayVerdict, InitiateRequest};
use plv_money::{add_months, booking_fee_total, extension_total, full_payment_total, Money};
use plv_reconcile::{ReconcileError, ReconciliationOutcome};

use crate::api_types::{
    CheckoutResponse, CompleteRequest, CreateBookingRequest, ErrorResponse, ExtendRequest,
    ExtensionStatusRequest, HealthResponse, ManualVerifyRequest, ReconcileResponse,
    ResetResponse, StatusUpdateResponse, VerifyRequest,
};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/bookings", post(create_booking))
        .route(
            "/v1/bookings/:booking_id/extension-status",
            post(extension_status),
        )
        .route("/v1/bookings/:booking_id/extend", post(extend))
        .route("/v1/bookings/:booking_id/complete", post(complete))
        .route(
            "/v1/bookings/:booking_id/reset-extension",
            post(reset_extension),
        )
        .route(
            "/v1/bookings/:booking_id/reset-completion",
            post(reset_completion),
        )
        .route("/v1/payments/verify", post(verify_payment))
        .route("/v1/payments/webhook", post(webhook_callback))
        .route("/v1/admin/payments/manual-verify", post(manual_verify))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn fail(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

fn internal(e: anyhow::Error) -> Response {
    warn!(error = %e, "internal error");
    fail(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

/// Map engine failures onto the error taxonomy: not-found is permanent 404,
/// guard violations are 409 (domain conflict, distinct from not-found),
/// data-shape faults 422, infrastructure 500.
fn reconcile_error(e: ReconcileError) -> Response {
    match &e {
        ReconcileError::PaymentNotFound { .. } | ReconcileError::BookingNotFound { .. } => {
            fail(StatusCode::NOT_FOUND, e.to_string())
        }
        ReconcileError::Transition(_) => fail(StatusCode::CONFLICT, e.to_string()),
        ReconcileError::InvalidPaymentMeta { .. } => {
            fail(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        ReconcileError::Money(_) | ReconcileError::Store(_) => {
            warn!(error = %e, "reconcile infrastructure failure");
            fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Gateway-communication faults are transient: 502, caller retries.
fn gateway_error(e: GatewayError) -> Response {
    fail(StatusCode::BAD_GATEWAY, e.to_string())
}

fn outcome_response(outcome: ReconciliationOutcome) -> Response {
    (
        StatusCode::OK,
        Json(ReconcileResponse {
            status: outcome.status.as_str().to_string(),
            booking_id: outcome.booking.booking_id,
            booking_status: outcome.booking.status.as_str().to_string(),
            payment_status: outcome.payment.status.as_str().to_string(),
            payment_type: outcome.booking.payment_type.as_str().to_string(),
            total_amount_minor: outcome.booking.total_amount.minor(),
            end_date: outcome.booking.end_date,
        }),
    )
        .into_response()
}

enum Fetched {
    Booking(Booking),
    Response(Response),
}

async fn fetch_booking(st: &AppState, booking_id: Uuid) -> Fetched {
    match st.store.booking(booking_id).await {
        Ok(Some(b)) => Fetched::Booking(b),
        Ok(None) => Fetched::Response(fail(StatusCode::NOT_FOUND, "booking not found")),
        Err(e) => Fetched::Response(internal(e)),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/bookings — create booking + original charge checkout
// ---------------------------------------------------------------------------

pub(crate) async fn create_booking(
    State(st): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Response {
    let payment_type = match PaymentType::parse(&req.payment_type) {
        Ok(t @ (PaymentType::BookingFee | PaymentType::Full)) => t,
        _ => {
            return fail(
                StatusCode::BAD_REQUEST,
                "payment_type must be 'booking_fee' or 'full'",
            )
        }
    };
    if req.duration_months < 1 {
        return fail(StatusCode::BAD_REQUEST, "duration_months must be positive");
    }

    let room = match st.store.room(req.room_id).await {
        Ok(Some(r)) => r,
        Ok(None) => return fail(StatusCode::NOT_FOUND, "room not found"),
        Err(e) => return internal(e),
    };
    let fee = match st.fees.platform_fee().await {
        Ok(f) => f,
        Err(e) => return internal(e),
    };

    // Totals are computed server-side only; the client never supplies one.
    let total = match payment_type {
        PaymentType::BookingFee => {
            let Some(booking_fee) = room.booking_fee else {
                return fail(
                    StatusCode::BAD_REQUEST,
                    "room does not offer booking-fee holds",
                );
            };
            booking_fee_total(booking_fee, fee)
        }
        _ => full_payment_total(room.monthly_rate, req.duration_months, fee),
    };
    let total = match total {
        Ok(t) => t,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let Some(end_date) = add_months(req.start_date, req.duration_months) else {
        return fail(StatusCode::BAD_REQUEST, "start_date out of range");
    };

    let now = st.clock.now();
    let booking = Booking {
        booking_id: Uuid::new_v4(),
        student_id: req.student_id,
        room_id: req.room_id,
        start_date: req.start_date,
        end_date,
        duration_months: req.duration_months,
        status: BookingStatus::Pending,
        payment_type,
        total_amount: total,
        monthly_rate: room.monthly_rate,
        pending_op: None,
    };
    if let Err(e) = st.store.insert_booking(&booking).await {
        return internal(e);
    }

    let tx_ref = txref::original_charge(booking.booking_id, now);
    let payment = Payment {
        payment_id: Uuid::new_v4(),
        booking_id: booking.booking_id,
        amount: total,
        payment_type,
        payment_method: "paychangu".to_string(),
        tx_ref: Some(tx_ref.clone()),
        status: PaymentStatus::Pending,
        paid_at: None,
        meta: None,
    };
    if let Err(e) = st.store.insert_payment(&payment).await {
        return internal(e);
    }

    let initiated = st
        .gateway
        .initiate_transaction(InitiateRequest {
            tx_ref: tx_ref.clone(),
            amount: total,
            currency: "MWK".to_string(),
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            title: format!("Hostel Room Booking: Room {}", room.room_number),
            description: format!("Stay from {} to {}", req.start_date, end_date),
            callback_url: st.payment_urls.callback_url.clone(),
            return_url: st.payment_urls.return_url.clone(),
        })
        .await;
    let initiated = match initiated {
        Ok(i) => i,
        Err(e) => return gateway_error(e),
    };

    info!(booking_id = %booking.booking_id, %tx_ref, "booking created; checkout opened");
    (
        StatusCode::CREATED,
        Json(CheckoutResponse {
            booking_id: booking.booking_id,
            tx_ref,
            checkout_url: initiated.checkout_url,
            amount_minor: total.minor(),
            booking_status: booking.status.as_str().to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/payments/verify — trigger (a): the owner's synchronous verify
// ---------------------------------------------------------------------------

pub(crate) async fn verify_payment(
    State(st): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Response {
    // Verify first, lock after: the gateway round-trip must not hold the
    // payment row.
    let verdict = match st.gateway.verify_transaction(&req.tx_ref).await {
        Ok(v) => v,
        Err(e) => return gateway_error(e),
    };

    match st.engine.reconcile(&req.tx_ref, verdict).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => reconcile_error(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/payments/webhook — trigger (b): the gateway's async callback
// ---------------------------------------------------------------------------

pub(crate) async fn webhook_callback(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Signature is the precondition: nothing past this line runs for an
    // unauthenticated payload.
    let sig = ["signature", "x-signature", "paychangu-signature"]
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok());
    let Some(sig) = sig else {
        return fail(StatusCode::BAD_REQUEST, "missing Signature header");
    };
    if let Err(e) = webhook::verify_signature(&st.webhook_secret, &body, sig) {
        return fail(StatusCode::BAD_REQUEST, e.to_string());
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let Some(tx_ref) = extract_tx_ref(&payload) else {
        warn!("webhook payload carries no tx_ref");
        return StatusCode::NO_CONTENT.into_response();
    };

    // The payload's claimed status is not trusted; the verdict comes from a
    // fresh verify call. Providers retry delivery, so failures past the
    // signature check are logged and answered 204 — the sync-verify and
    // admin paths can still land the same transaction.
    match st.gateway.verify_transaction(&tx_ref).await {
        Ok(verdict) => match st.engine.reconcile(&tx_ref, verdict).await {
            Ok(outcome) => {
                info!(%tx_ref, status = outcome.status.as_str(), "webhook reconciled")
            }
            Err(e) => warn!(%tx_ref, error = %e, "webhook reconcile failed"),
        },
        Err(e) => warn!(%tx_ref, error = %e, "webhook verify failed; provider will retry"),
    }

    StatusCode::NO_CONTENT.into_response()
}

fn extract_tx_ref(payload: &Value) -> Option<String> {
    let direct = payload.get("tx_ref").or_else(|| payload.get("txRef"));
    let nested = payload
        .get("data")
        .and_then(|d| d.get("tx_ref").or_else(|| d.get("txRef")));
    direct
        .or(nested)
        .and_then(Value::as_str)
        .map(String::from)
}

// ---------------------------------------------------------------------------
// POST /v1/admin/payments/manual-verify — trigger (c): admin override
// ---------------------------------------------------------------------------

pub(crate) async fn manual_verify(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ManualVerifyRequest>,
) -> Response {
    let verdict = match req.verdict.as_str() {
        "success" => GatewayVerdict::Success,
        "failure" | "failed" => GatewayVerdict::Failed,
        other => {
            return fail(
                StatusCode::BAD_REQUEST,
                format!("verdict must be 'success' or 'failure', got {other:?}"),
            )
        }
    };

    info!(tx_ref = %req.tx_ref, verdict = verdict.as_str(), "admin manual verification");
    match st.engine.reconcile(&req.tx_ref, verdict).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => reconcile_error(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/bookings/:id/extension-status — two-step extension flow
// ---------------------------------------------------------------------------

pub(crate) async fn extension_status(
    State(st): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ExtensionStatusRequest>,
) -> Response {
    let mut booking = match fetch_booking(&st, booking_id).await {
        Fetched::Booking(b) => b,
        Fetched::Response(r) => return r,
    };

    if matches!(
        booking.status,
        BookingStatus::ExtensionInProgress | BookingStatus::PendingExtension
    ) {
        return self_heal_stuck(&st, booking, PaymentType::Extension, "retry_extension").await;
    }

    let now = st.clock.now();
    if let Err(e) = booking.apply(BookingEvent::RequestExtension {
        additional_months: req.additional_months,
        today: now.date_naive(),
        requested_at: now,
        flow: ExtensionFlow::StatusUpdate,
    }) {
        return fail(StatusCode::CONFLICT, e.to_string());
    }
    if let Err(e) = st.store.update_booking(&booking).await {
        return internal(e);
    }

    (
        StatusCode::OK,
        Json(StatusUpdateResponse {
            message: "Extension status updated successfully".to_string(),
            booking_status: booking.status.as_str().to_string(),
            action_required: "initiate_payment".to_string(),
        }),
    )
        .into_response()
}

/// A booking stuck in an in-progress status self-heals based on what its
/// latest follow-up payment actually did: still pending → finish paying;
/// completed (verdict landed but a crash ate the status flip) or absent →
/// reset to confirmed.
async fn self_heal_stuck(
    st: &AppState,
    mut booking: Booking,
    kind: PaymentType,
    retry_action: &str,
) -> Response {
    let latest = match st.store.latest_payment_of_type(booking.booking_id, kind).await {
        Ok(p) => p,
        Err(e) => return internal(e),
    };

    match latest {
        Some(p) if p.status == PaymentStatus::Pending => (
            StatusCode::OK,
            Json(StatusUpdateResponse {
                message: "Payment already initiated. Please complete the payment.".to_string(),
                booking_status: booking.status.as_str().to_string(),
                action_required: "complete_payment".to_string(),
            }),
        )
            .into_response(),
        Some(p) if p.status == PaymentStatus::Completed => {
            if let Err(e) = booking.apply(BookingEvent::ResetStuck) {
                return fail(StatusCode::CONFLICT, e.to_string());
            }
            if let Err(e) = st.store.update_booking(&booking).await {
                return internal(e);
            }
            (
                StatusCode::OK,
                Json(StatusUpdateResponse {
                    message: "Payment was already completed. Status reset to confirmed."
                        .to_string(),
                    booking_status: booking.status.as_str().to_string(),
                    action_required: "none".to_string(),
                }),
            )
                .into_response()
        }
        _ => {
            // No payment record, or only a failed attempt: drop the gate.
            if let Err(e) = booking.apply(BookingEvent::ResetStuck) {
                return fail(StatusCode::CONFLICT, e.to_string());
            }
            if let Err(e) = st.store.update_booking(&booking).await {
                return internal(e);
            }
            (
                StatusCode::OK,
                Json(StatusUpdateResponse {
                    message: "Status reset. You can retry the operation.".to_string(),
                    booking_status: booking.status.as_str().to_string(),
                    action_required: retry_action.to_string(),
                }),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/bookings/:id/extend — direct extension initiate
// ---------------------------------------------------------------------------

pub(crate) async fn extend(
    State(st): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ExtendRequest>,
) -> Response {
    let mut booking = match fetch_booking(&st, booking_id).await {
        Fetched::Booking(b) => b,
        Fetched::Response(r) => return r,
    };

    let now = st.clock.now();
    match booking.status {
        BookingStatus::Confirmed => {
            if let Err(e) = booking.apply(BookingEvent::RequestExtension {
                additional_months: req.additional_months,
                today: now.date_naive(),
                requested_at: now,
                flow: ExtensionFlow::DirectInitiate,
            }) {
                return fail(StatusCode::CONFLICT, e.to_string());
            }
            if let Err(e) = st.store.update_booking(&booking).await {
                return internal(e);
            }
        }
        // Gate already open: a retry after an interrupted initiation.
        BookingStatus::ExtensionInProgress | BookingStatus::PendingExtension => {}
        other => {
            return fail(
                StatusCode::CONFLICT,
                format!("booking is '{}' and cannot be extended", other.as_str()),
            )
        }
    }

    let fee = match st.fees.platform_fee().await {
        Ok(f) => f,
        Err(e) => return internal(e),
    };
    let amount = match extension_total(booking.monthly_rate, req.additional_months, fee) {
        Ok(a) => a,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let original_end_date = match &booking.pending_op {
        Some(PendingOp::Extension {
            original_end_date, ..
        }) => *original_end_date,
        _ => booking.end_date,
    };

    let tx_ref = txref::extension(booking_id, req.additional_months, now);
    let payment = Payment {
        payment_id: Uuid::new_v4(),
        booking_id,
        amount,
        payment_type: PaymentType::Extension,
        payment_method: "paychangu".to_string(),
        tx_ref: Some(tx_ref.clone()),
        status: PaymentStatus::Pending,
        paid_at: None,
        meta: Some(PaymentMeta::Extension {
            additional_months: req.additional_months,
            original_end_date,
        }),
    };
    if let Err(e) = st.store.insert_payment(&payment).await {
        return internal(e);
    }

    let initiated = st
        .gateway
        .initiate_transaction(InitiateRequest {
            tx_ref: tx_ref.clone(),
            amount,
            currency: "MWK".to_string(),
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            title: "Booking Extension".to_string(),
            description: format!(
                "Extension payment for {} month(s)",
                req.additional_months
            ),
            callback_url: st.payment_urls.callback_url.clone(),
            return_url: st.payment_urls.return_url.clone(),
        })
        .await;
    let initiated = match initiated {
        Ok(i) => i,
        Err(e) => return gateway_error(e),
    };

    (
        StatusCode::OK,
        Json(CheckoutResponse {
            booking_id,
            tx_ref,
            checkout_url: initiated.checkout_url,
            amount_minor: amount.minor(),
            booking_status: booking.status.as_str().to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/bookings/:id/complete — booking fee → full payment initiate
// ---------------------------------------------------------------------------

pub(crate) async fn complete(
    State(st): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> Response {
    let mut booking = match fetch_booking(&st, booking_id).await {
        Fetched::Booking(b) => b,
        Fetched::Response(r) => return r,
    };

    let now = st.clock.now();
    match booking.status {
        BookingStatus::Confirmed => {
            if let Err(e) = booking.apply(BookingEvent::RequestCompletion {
                today: now.date_naive(),
                initiated_at: now,
            }) {
                return fail(StatusCode::CONFLICT, e.to_string());
            }
            if let Err(e) = st.store.update_booking(&booking).await {
                return internal(e);
            }
        }
        // Gate already open: a retry after an interrupted initiation.
        BookingStatus::CompletingPayment => {}
        other => {
            return fail(
                StatusCode::CONFLICT,
                format!("booking is '{}' and cannot be completed", other.as_str()),
            )
        }
    }

    let fee = match st.fees.platform_fee().await {
        Ok(f) => f,
        Err(e) => return internal(e),
    };
    // Remainder is derived from persisted state, never client input.
    let remaining = full_payment_total(booking.monthly_rate, booking.duration_months, fee)
        .and_then(|full| full.checked_sub(booking.total_amount));
    let remaining = match remaining {
        Ok(r) if !r.is_negative() && r != Money::ZERO => r,
        Ok(_) => {
            return fail(
                StatusCode::CONFLICT,
                "nothing left to charge for this booking",
            )
        }
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let tx_ref = txref::completion(booking_id, now);
    let payment = Payment {
        payment_id: Uuid::new_v4(),
        booking_id,
        amount: remaining,
        payment_type: PaymentType::Complete,
        payment_method: "paychangu".to_string(),
        tx_ref: Some(tx_ref.clone()),
        status: PaymentStatus::Pending,
        paid_at: None,
        meta: None,
    };
    if let Err(e) = st.store.insert_payment(&payment).await {
        return internal(e);
    }

    let initiated = st
        .gateway
        .initiate_transaction(InitiateRequest {
            tx_ref: tx_ref.clone(),
            amount: remaining,
            currency: "MWK".to_string(),
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            title: "Complete Payment".to_string(),
            description: "Convert booking fee to full payment".to_string(),
            callback_url: st.payment_urls.callback_url.clone(),
            return_url: st.payment_urls.return_url.clone(),
        })
        .await;
    let initiated = match initiated {
        Ok(i) => i,
        Err(e) => return gateway_error(e),
    };

    (
        StatusCode::OK,
        Json(CheckoutResponse {
            booking_id,
            tx_ref,
            checkout_url: initiated.checkout_url,
            amount_minor: remaining.minor(),
            booking_status: booking.status.as_str().to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/bookings/:id/reset-extension  /:id/reset-completion
// ---------------------------------------------------------------------------

pub(crate) async fn reset_extension(
    State(st): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
) -> Response {
    reset_stuck(
        &st,
        booking_id,
        &[
            BookingStatus::ExtensionInProgress,
            BookingStatus::PendingExtension,
        ],
        PaymentType::Extension,
    )
    .await
}

pub(crate) async fn reset_completion(
    State(st): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
) -> Response {
    reset_stuck(
        &st,
        booking_id,
        &[BookingStatus::CompletingPayment],
        PaymentType::Complete,
    )
    .await
}

async fn reset_stuck(
    st: &AppState,
    booking_id: Uuid,
    allowed: &[BookingStatus],
    kind: PaymentType,
) -> Response {
    let mut booking = match fetch_booking(st, booking_id).await {
        Fetched::Booking(b) => b,
        Fetched::Response(r) => return r,
    };

    if !allowed.contains(&booking.status) {
        return fail(
            StatusCode::CONFLICT,
            format!(
                "booking is '{}'; only a stuck in-progress status can be reset",
                booking.status.as_str()
            ),
        );
    }

    // A pending charge must be verified (or fail at the gateway) before the
    // gate may be dropped — resetting under it would orphan the charge.
    match st.store.has_pending_payment(booking_id, kind).await {
        Ok(true) => {
            return fail(
                StatusCode::CONFLICT,
                "a pending payment exists for this operation; verify it instead of resetting",
            )
        }
        Ok(false) => {}
        Err(e) => return internal(e),
    }

    if let Err(e) = booking.apply(BookingEvent::ResetStuck) {
        return fail(StatusCode::CONFLICT, e.to_string());
    }
    if let Err(e) = st.store.update_booking(&booking).await {
        return internal(e);
    }

    info!(%booking_id, "stuck status reset to confirmed");
    (
        StatusCode::OK,
        Json(ResetResponse {
            message: "Status reset successfully".to_string(),
            booking_status: booking.status.as_str().to_string(),
        }),
    )
        .into_response()
}
