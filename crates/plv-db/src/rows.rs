//! Row ↔ domain mapping.
//!
//! Status/type columns are text and go through the domain enums' `parse`, so
//! a row written outside this crate surfaces as an explicit error rather
//! than an impossible enum value.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;

use plv_booking::{
    Booking, BookingStatus, Payment, PaymentMeta, PaymentStatus, PaymentType, PendingOp, Room,
};
use plv_money::Money;

/// Expects the booking columns plus `monthly_rate_minor` joined from `rooms`.
pub(crate) fn booking_from_row(row: &PgRow) -> Result<Booking> {
    let pending_op: Option<Value> = row.try_get("pending_op")?;
    let pending_op: Option<PendingOp> = pending_op
        .map(serde_json::from_value)
        .transpose()
        .context("malformed pending_op column")?;

    Ok(Booking {
        booking_id: row.try_get("booking_id")?,
        student_id: row.try_get("student_id")?,
        room_id: row.try_get("room_id")?,
        start_date: row.try_get::<NaiveDate, _>("start_date")?,
        end_date: row.try_get::<NaiveDate, _>("end_date")?,
        duration_months: u32::try_from(row.try_get::<i32, _>("duration_months")?)
            .context("negative duration_months")?,
        status: BookingStatus::parse(&row.try_get::<String, _>("status")?)?,
        payment_type: PaymentType::parse(&row.try_get::<String, _>("payment_type")?)?,
        total_amount: Money::from_minor(row.try_get::<i64, _>("total_amount_minor")?),
        monthly_rate: Money::from_minor(row.try_get::<i64, _>("monthly_rate_minor")?),
        pending_op,
    })
}

pub(crate) fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let meta: Option<Value> = row.try_get("meta")?;
    let meta: Option<PaymentMeta> = meta
        .map(serde_json::from_value)
        .transpose()
        .context("malformed payment meta column")?;

    Ok(Payment {
        payment_id: row.try_get("payment_id")?,
        booking_id: row.try_get("booking_id")?,
        amount: Money::from_minor(row.try_get::<i64, _>("amount_minor")?),
        payment_type: PaymentType::parse(&row.try_get::<String, _>("payment_type")?)?,
        payment_method: row.try_get("payment_method")?,
        tx_ref: row.try_get("tx_ref")?,
        status: PaymentStatus::parse(&row.try_get::<String, _>("status")?)?,
        paid_at: row.try_get::<Option<DateTime<Utc>>, _>("paid_at")?,
        meta,
    })
}

pub(crate) fn room_from_row(row: &PgRow) -> Result<Room> {
    Ok(Room {
        room_id: row.try_get("room_id")?,
        room_number: row.try_get("room_number")?,
        monthly_rate: Money::from_minor(row.try_get::<i64, _>("monthly_rate_minor")?),
        booking_fee: row
            .try_get::<Option<i64>, _>("booking_fee_minor")?
            .map(Money::from_minor),
        occupants: u32::try_from(row.try_get::<i32, _>("occupants")?)
            .context("negative occupants")?,
    })
}

pub(crate) fn pending_op_to_value(op: &Option<PendingOp>) -> Result<Option<Value>> {
    op.as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("serialize pending_op")
}

pub(crate) fn meta_to_value(meta: &Option<PaymentMeta>) -> Result<Option<Value>> {
    meta.as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("serialize payment meta")
}

pub(crate) fn months_to_i32(months: u32) -> Result<i32> {
    i32::try_from(months).context("duration_months out of range")
}
