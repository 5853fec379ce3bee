//! Gateway correlation-key derivation.
//!
//! Every charge attempt gets a fresh `tx_ref`; the prefix encodes the charge
//! kind so stuck transactions are recognisable in gateway dashboards. The
//! booking id plus a random suffix makes collisions practically impossible,
//! and the payments table enforces uniqueness regardless.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// tx_ref for a booking's original charge: `bk_{booking}_{epoch}_{suffix}`.
pub fn original_charge(booking_id: Uuid, now: DateTime<Utc>) -> String {
    format!("bk_{}_{}_{}", booking_id, now.timestamp(), suffix())
}

/// tx_ref for an extension charge: `ext_{booking}_{months}_{epoch}_{suffix}`.
pub fn extension(booking_id: Uuid, additional_months: u32, now: DateTime<Utc>) -> String {
    format!(
        "ext_{}_{}_{}_{}",
        booking_id,
        additional_months,
        now.timestamp(),
        suffix()
    )
}

/// tx_ref for a completion charge: `complete_{booking}_{epoch}_{suffix}`.
pub fn completion(booking_id: Uuid, now: DateTime<Utc>) -> String {
    format!("complete_{}_{}_{}", booking_id, now.timestamp(), suffix())
}

fn suffix() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..6].to_string()
}
