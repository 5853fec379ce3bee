//! The four pricing formulas shared by every charge path.
//!
//! Pure functions, no I/O. Every caller — booking creation, extension,
//! completion, reconciliation — must go through these rather than inlining
//! the arithmetic, so the formulas have exactly one definition each.

use crate::money::{Money, MoneyError};

/// Total for a booking-fee booking: `booking_fee + platform_fee`.
pub fn booking_fee_total(booking_fee: Money, platform_fee: Money) -> Result<Money, MoneyError> {
    booking_fee.checked_add(platform_fee)
}

/// Total for a full-payment booking: `monthly_rate × months + platform_fee`.
pub fn full_payment_total(
    monthly_rate: Money,
    months: u32,
    platform_fee: Money,
) -> Result<Money, MoneyError> {
    monthly_rate.checked_mul(months)?.checked_add(platform_fee)
}

/// Charge amount for extending a stay:
/// `monthly_rate × additional_months + platform_fee`.
pub fn extension_total(
    monthly_rate: Money,
    additional_months: u32,
    platform_fee: Money,
) -> Result<Money, MoneyError> {
    monthly_rate
        .checked_mul(additional_months)?
        .checked_add(platform_fee)
}

/// New booking total after a verified extension payment: the sum of all
/// previously completed payments plus the extension amount. Additive by
/// contract — extensions never recompute the historical charges.
pub fn recompute_after_extension(
    prior_completed_total: Money,
    extension_amount: Money,
) -> Result<Money, MoneyError> {
    prior_completed_total.checked_add(extension_amount)
}
