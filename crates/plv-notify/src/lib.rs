//! Post-commit notification dispatch.
//!
//! Reconciliation commits first; notification delivery is a separate,
//! independently failing step decoupled through a bounded queue:
//!
//! ```text
//! ReconcileEngine ──commit──► Notifier (ReconcileHook)
//!                                  │  try_send (never blocks)
//!                                  ▼
//!                           mpsc::channel ──► dispatcher task
//!                                               ├─► EmailSink  (receipt)
//!                                               └─► PushSink   (student + landlord)
//! ```
//!
//! A full queue or a down sink costs a log line, never a rolled-back
//! reconciliation. Landlord resolution (room → hostel → landlord) belongs to
//! the push collaborator behind [`PushSink`]; the job carries the `room_id`
//! it needs for the lookup.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use plv_booking::{Booking, Payment, PaymentType};
use plv_money::Money;
use plv_reconcile::ReconcileHook;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// NotificationJob
// ---------------------------------------------------------------------------

/// One reconciled charge worth of outbound messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationJob {
    /// Original charge verified: receipt + "booking active" pushes.
    BookingConfirmed {
        booking_id: Uuid,
        payment_id: Uuid,
        student_id: Uuid,
        room_id: Uuid,
        amount: Money,
        tx_ref: Option<String>,
    },
    /// Extension verified: new checkout date in the copy.
    ExtensionConfirmed {
        booking_id: Uuid,
        payment_id: Uuid,
        student_id: Uuid,
        room_id: Uuid,
        amount: Money,
        new_end_date: NaiveDate,
        new_total: Money,
    },
    /// Booking fee converted to full payment.
    CompletionConfirmed {
        booking_id: Uuid,
        payment_id: Uuid,
        student_id: Uuid,
        room_id: Uuid,
        amount: Money,
        new_total: Money,
    },
}

impl NotificationJob {
    pub fn from_reconciled(booking: &Booking, payment: &Payment) -> Self {
        match payment.payment_type {
            PaymentType::BookingFee | PaymentType::Full => NotificationJob::BookingConfirmed {
                booking_id: booking.booking_id,
                payment_id: payment.payment_id,
                student_id: booking.student_id,
                room_id: booking.room_id,
                amount: payment.amount,
                tx_ref: payment.tx_ref.clone(),
            },
            PaymentType::Extension => NotificationJob::ExtensionConfirmed {
                booking_id: booking.booking_id,
                payment_id: payment.payment_id,
                student_id: booking.student_id,
                room_id: booking.room_id,
                amount: payment.amount,
                new_end_date: booking.end_date,
                new_total: booking.total_amount,
            },
            PaymentType::Complete => NotificationJob::CompletionConfirmed {
                booking_id: booking.booking_id,
                payment_id: payment.payment_id,
                student_id: booking.student_id,
                room_id: booking.room_id,
                amount: payment.amount,
                new_total: booking.total_amount,
            },
        }
    }

    pub fn student_id(&self) -> Uuid {
        match self {
            NotificationJob::BookingConfirmed { student_id, .. }
            | NotificationJob::ExtensionConfirmed { student_id, .. }
            | NotificationJob::CompletionConfirmed { student_id, .. } => *student_id,
        }
    }

    pub fn room_id(&self) -> Uuid {
        match self {
            NotificationJob::BookingConfirmed { room_id, .. }
            | NotificationJob::ExtensionConfirmed { room_id, .. }
            | NotificationJob::CompletionConfirmed { room_id, .. } => *room_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Email delivery collaborator (receipt rendering, PDFs, SMTP — all external).
#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send_receipt(&self, job: &NotificationJob) -> anyhow::Result<()>;
}

/// Push-notification collaborator. Implementations resolve the landlord for
/// landlord-facing pushes from the job's `room_id`.
#[async_trait]
pub trait PushSink: Send + Sync {
    async fn notify_student(
        &self,
        student_id: Uuid,
        title: &str,
        body: &str,
    ) -> anyhow::Result<()>;

    async fn notify_landlord_for_room(
        &self,
        room_id: Uuid,
        title: &str,
        body: &str,
    ) -> anyhow::Result<()>;
}

/// Dev/test sink: logs every message instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EmailSink for LogSink {
    async fn send_receipt(&self, job: &NotificationJob) -> anyhow::Result<()> {
        info!(?job, "receipt email (log sink)");
        Ok(())
    }
}

#[async_trait]
impl PushSink for LogSink {
    async fn notify_student(
        &self,
        student_id: Uuid,
        title: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        info!(%student_id, title, body, "student push (log sink)");
        Ok(())
    }

    async fn notify_landlord_for_room(
        &self,
        room_id: Uuid,
        title: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        info!(%room_id, title, body, "landlord push (log sink)");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier (the hook) and the dispatcher task
// ---------------------------------------------------------------------------

/// The engine-facing end of the queue. Registered as a [`ReconcileHook`].
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotificationJob>,
}

/// Build the queue. Hand the receiver to [`spawn_dispatcher`].
pub fn notification_channel(capacity: usize) -> (Notifier, mpsc::Receiver<NotificationJob>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Notifier { tx }, rx)
}

#[async_trait]
impl ReconcileHook for Notifier {
    async fn on_reconciled(&self, booking: &Booking, payment: &Payment) -> anyhow::Result<()> {
        let job = NotificationJob::from_reconciled(booking, payment);
        // try_send, not send: a congested notification queue must never
        // stall a reconcile caller.
        self.tx
            .try_send(job)
            .map_err(|e| anyhow!("notification queue rejected job: {e}"))
    }
}

/// Drain the queue, delivering each job through the sinks. Sink errors are
/// logged per message; the task keeps draining until every sender is gone.
pub fn spawn_dispatcher(
    mut rx: mpsc::Receiver<NotificationJob>,
    email: Arc<dyn EmailSink>,
    push: Arc<dyn PushSink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            deliver(&job, email.as_ref(), push.as_ref()).await;
        }
    })
}

async fn deliver(job: &NotificationJob, email: &dyn EmailSink, push: &dyn PushSink) {
    if let Err(e) = email.send_receipt(job).await {
        warn!(?job, error = %e, "receipt email failed; dropped");
    }

    let (student_title, student_body, landlord_title, landlord_body) = copy_for(job);
    if let Err(e) = push
        .notify_student(job.student_id(), &student_title, &student_body)
        .await
    {
        warn!(?job, error = %e, "student push failed; dropped");
    }
    if let Err(e) = push
        .notify_landlord_for_room(job.room_id(), &landlord_title, &landlord_body)
        .await
    {
        warn!(?job, error = %e, "landlord push failed; dropped");
    }
}

fn copy_for(job: &NotificationJob) -> (String, String, String, String) {
    match job {
        NotificationJob::BookingConfirmed { amount, .. } => (
            "Payment Successful".to_string(),
            format!(
                "Your payment of MWK {amount} has been confirmed. Your booking is now active!"
            ),
            "Payment Processing".to_string(),
            format!(
                "Payment of MWK {amount} received. It will reflect in your account within 24 hours."
            ),
        ),
        NotificationJob::ExtensionConfirmed {
            amount,
            new_end_date,
            ..
        } => (
            "Booking Extended Successfully!".to_string(),
            format!("Your booking has been extended. Your new checkout date is {new_end_date}."),
            "Extension Payment Processing".to_string(),
            format!(
                "Extension payment of MWK {amount} received. It will reflect in your account within 24 hours."
            ),
        ),
        NotificationJob::CompletionConfirmed { amount, .. } => (
            "Payment Completed Successfully".to_string(),
            "Your complete payment has been processed. Your booking is now fully paid!".to_string(),
            "Complete Payment Processing".to_string(),
            format!(
                "Complete payment of MWK {amount} received. It will reflect in your account within 24 hours."
            ),
        ),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
