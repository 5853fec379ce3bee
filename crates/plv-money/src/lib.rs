//! Fixed-point currency and month-duration arithmetic.
//!
//! # Design invariant
//!
//! All monetary amounts on the **pricing decision surface** are represented as
//! [`Money`]: `i64` integer minor units (1 MWK = 100 minor units). This
//! eliminates binary-float drift across repeated recomputation — two totals
//! that compare equal as `f64` but differ at the sub-ngwee level are always
//! distinguishable as `i64`.
//!
//! `f64` conversions happen **only** at wire boundaries (gateway JSON, API
//! responses), via [`Money::to_major_f64`] / [`Money::from_major_f64`]. No
//! other code path should produce or consume floating-point amounts.
//!
//! Term length is always the booking's stored `duration_months` integer —
//! never re-derived from `end_date - start_date` (calendar months are not
//! evenly divisible by days). [`add_months`] provides the calendar-clamped
//! month addition used when an extension moves a checkout date.

mod money;
mod months;
mod pricing;

pub use money::{Money, MoneyError, MINOR_PER_UNIT};
pub use months::add_months;
pub use pricing::{
    booking_fee_total, extension_total, full_payment_total, recompute_after_extension,
};
