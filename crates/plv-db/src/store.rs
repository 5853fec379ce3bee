use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use plv_booking::{Booking, Payment, PaymentType, Room};
use plv_money::Money;
use plv_reconcile::{BookingStore, FeeConfig, ReconcileGuard, ReconcileStore};

use crate::rows::{
    booking_from_row, meta_to_value, months_to_i32, payment_from_row, pending_op_to_value,
    room_from_row,
};
use crate::DEFAULT_PLATFORM_FEE_MINOR;

const BOOKING_COLUMNS: &str = r#"
    b.booking_id, b.student_id, b.room_id, b.start_date, b.end_date,
    b.duration_months, b.status, b.payment_type, b.total_amount_minor,
    b.pending_op, r.monthly_rate_minor
"#;

const PAYMENT_COLUMNS: &str = r#"
    payment_id, booking_id, amount_minor, payment_type, payment_method,
    tx_ref, status, paid_at, meta
"#;

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Provisioning helper (admin tooling and DB tests).
    pub async fn insert_room(&self, room: &Room) -> Result<()> {
        sqlx::query(
            r#"
            insert into rooms (room_id, room_number, monthly_rate_minor, booking_fee_minor, occupants)
            values ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(room.room_id)
        .bind(&room.room_number)
        .bind(room.monthly_rate.minor())
        .bind(room.booking_fee.map(Money::minor))
        .bind(i32::try_from(room.occupants).context("occupants out of range")?)
        .execute(&self.pool)
        .await
        .context("insert_room failed")?;
        Ok(())
    }

    pub async fn occupants(&self, room_id: Uuid) -> Result<Option<u32>> {
        let row: Option<(i32,)> =
            sqlx::query_as("select occupants from rooms where room_id = $1")
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await
                .context("occupants query failed")?;
        Ok(row.map(|(n,)| n.max(0) as u32))
    }
}

// ---------------------------------------------------------------------------
// ReconcileStore: FOR UPDATE claim + one transaction per reconcile
// ---------------------------------------------------------------------------

struct PgGuard {
    tx: Transaction<'static, Postgres>,
    payment: Payment,
}

#[async_trait]
impl ReconcileStore for PgStore {
    async fn begin(&self, tx_ref: &str) -> Result<Option<Box<dyn ReconcileGuard>>> {
        let mut tx = self.pool.begin().await.context("begin transaction")?;

        // Row lock on the payment: concurrent reconcilers for the same
        // tx_ref queue here and re-read the row the winner committed.
        let row = sqlx::query(&format!(
            "select {PAYMENT_COLUMNS} from payments where tx_ref = $1 for update"
        ))
        .bind(tx_ref)
        .fetch_optional(&mut *tx)
        .await
        .context("lock payment by tx_ref")?;

        let Some(row) = row else {
            return Ok(None); // tx drops → rollback, nothing held
        };

        let payment = payment_from_row(&row)?;
        Ok(Some(Box::new(PgGuard { tx, payment })))
    }
}

#[async_trait]
impl ReconcileGuard for PgGuard {
    fn payment(&self) -> &Payment {
        &self.payment
    }

    async fn booking(&mut self) -> Result<Option<Booking>> {
        // Lock the booking row too: the whole write-set mutates under one
        // claim. The join brings in the room's current rate.
        let row = sqlx::query(&format!(
            r#"
            select {BOOKING_COLUMNS}
            from bookings b
            join rooms r on r.room_id = b.room_id
            where b.booking_id = $1
            for update of b
            "#
        ))
        .bind(self.payment.booking_id)
        .fetch_optional(&mut *self.tx)
        .await
        .context("lock booking row")?;

        row.map(|r| booking_from_row(&r)).transpose()
    }

    async fn completed_total_excluding(&mut self, exclude_tx_ref: &str) -> Result<Money> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            select coalesce(sum(amount_minor), 0)::bigint
            from payments
            where booking_id = $1
              and status = 'completed'
              and tx_ref is distinct from $2
            "#,
        )
        .bind(self.payment.booking_id)
        .bind(exclude_tx_ref)
        .fetch_one(&mut *self.tx)
        .await
        .context("completed payments sum failed")?;
        Ok(Money::from_minor(total))
    }

    async fn commit(
        self: Box<Self>,
        booking: &Booking,
        payment: &Payment,
        occupancy_delta: i64,
    ) -> Result<()> {
        let mut tx = self.tx;

        sqlx::query(
            r#"
            update payments
            set status = $2,
                paid_at = $3,
                amount_minor = $4,
                meta = $5
            where payment_id = $1
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.status.as_str())
        .bind(payment.paid_at)
        .bind(payment.amount.minor())
        .bind(meta_to_value(&payment.meta)?)
        .execute(&mut *tx)
        .await
        .context("update payment failed")?;

        sqlx::query(
            r#"
            update bookings
            set status = $2,
                payment_type = $3,
                end_date = $4,
                duration_months = $5,
                total_amount_minor = $6,
                pending_op = $7
            where booking_id = $1
            "#,
        )
        .bind(booking.booking_id)
        .bind(booking.status.as_str())
        .bind(booking.payment_type.as_str())
        .bind(booking.end_date)
        .bind(months_to_i32(booking.duration_months)?)
        .bind(booking.total_amount.minor())
        .bind(pending_op_to_value(&booking.pending_op)?)
        .execute(&mut *tx)
        .await
        .context("update booking failed")?;

        if occupancy_delta != 0 {
            sqlx::query(
                r#"
                update rooms
                set occupants = occupants + $2
                where room_id = $1
                "#,
            )
            .bind(booking.room_id)
            .bind(i32::try_from(occupancy_delta).context("occupancy delta out of range")?)
            .execute(&mut *tx)
            .await
            .context("update room occupancy failed")?;
        }

        tx.commit().await.context("commit reconcile transaction")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BookingStore: pool-level CRUD for charge initiation
// ---------------------------------------------------------------------------

#[async_trait]
impl BookingStore for PgStore {
    async fn room(&self, room_id: Uuid) -> Result<Option<Room>> {
        let row = sqlx::query(
            r#"
            select room_id, room_number, monthly_rate_minor, booking_fee_minor, occupants
            from rooms
            where room_id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch room failed")?;
        row.map(|r| room_from_row(&r)).transpose()
    }

    async fn booking(&self, booking_id: Uuid) -> Result<Option<Booking>> {
        let row = sqlx::query(&format!(
            r#"
            select {BOOKING_COLUMNS}
            from bookings b
            join rooms r on r.room_id = b.room_id
            where b.booking_id = $1
            "#
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch booking failed")?;
        row.map(|r| booking_from_row(&r)).transpose()
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<()> {
        sqlx::query(
            r#"
            insert into bookings (
              booking_id, student_id, room_id, start_date, end_date,
              duration_months, status, payment_type, total_amount_minor, pending_op
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            )
            "#,
        )
        .bind(booking.booking_id)
        .bind(booking.student_id)
        .bind(booking.room_id)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(months_to_i32(booking.duration_months)?)
        .bind(booking.status.as_str())
        .bind(booking.payment_type.as_str())
        .bind(booking.total_amount.minor())
        .bind(pending_op_to_value(&booking.pending_op)?)
        .execute(&self.pool)
        .await
        .context("insert_booking failed")?;
        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> Result<()> {
        let res = sqlx::query(
            r#"
            update bookings
            set status = $2,
                payment_type = $3,
                end_date = $4,
                duration_months = $5,
                total_amount_minor = $6,
                pending_op = $7
            where booking_id = $1
            "#,
        )
        .bind(booking.booking_id)
        .bind(booking.status.as_str())
        .bind(booking.payment_type.as_str())
        .bind(booking.end_date)
        .bind(months_to_i32(booking.duration_months)?)
        .bind(booking.total_amount.minor())
        .bind(pending_op_to_value(&booking.pending_op)?)
        .execute(&self.pool)
        .await
        .context("update_booking failed")?;

        if res.rows_affected() == 0 {
            anyhow::bail!("booking {} not found", booking.booking_id);
        }
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            insert into payments (
              payment_id, booking_id, amount_minor, payment_type, payment_method,
              tx_ref, status, paid_at, meta
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9
            )
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.booking_id)
        .bind(payment.amount.minor())
        .bind(payment.payment_type.as_str())
        .bind(&payment.payment_method)
        .bind(&payment.tx_ref)
        .bind(payment.status.as_str())
        .bind(payment.paid_at)
        .bind(meta_to_value(&payment.meta)?)
        .execute(&self.pool)
        .await
        .context("insert_payment failed")?;
        Ok(())
    }

    async fn latest_payment_of_type(
        &self,
        booking_id: Uuid,
        kind: PaymentType,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            select {PAYMENT_COLUMNS}
            from payments
            where booking_id = $1 and payment_type = $2
            order by created_at desc, payment_id desc
            limit 1
            "#
        ))
        .bind(booking_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("latest_payment_of_type failed")?;
        row.map(|r| payment_from_row(&r)).transpose()
    }

    async fn has_pending_payment(&self, booking_id: Uuid, kind: PaymentType) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            select exists (
                select 1 from payments
                where booking_id = $1 and payment_type = $2 and status = 'pending'
            )
            "#,
        )
        .bind(booking_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .context("has_pending_payment failed")?;
        Ok(exists)
    }
}

// ---------------------------------------------------------------------------
// FeeConfig: read fresh on every call
// ---------------------------------------------------------------------------

#[async_trait]
impl FeeConfig for PgStore {
    async fn platform_fee(&self) -> Result<Money> {
        let row: Option<(String,)> = sqlx::query_as(
            "select config_value from configuration where config_key = 'platform_fee_minor'",
        )
        .fetch_optional(&self.pool)
        .await
        .context("platform fee query failed")?;

        let minor = match row {
            Some((v,)) => v
                .trim()
                .parse::<i64>()
                .with_context(|| format!("malformed platform_fee_minor value: {v:?}"))?,
            None => DEFAULT_PLATFORM_FEE_MINOR,
        };
        Ok(Money::from_minor(minor))
    }
}
