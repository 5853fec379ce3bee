use serde::{Deserialize, Serialize};

/// Scale factor: 1 currency unit = 100 minor units (2 decimal places).
pub const MINOR_PER_UNIT: i64 = 100;

// ---------------------------------------------------------------------------
// MoneyError
// ---------------------------------------------------------------------------

/// Returned when an arithmetic step would leave the representable range.
///
/// Overflow is always indicative of corrupt input (no legitimate booking total
/// approaches `i64::MAX` minor units), so callers must fail the operation
/// rather than clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    /// The result would overflow `i64` minor units.
    Overflow,
    /// An `f64` wire amount was `NaN`, infinite, or out of `i64` range.
    NotRepresentable,
}

impl std::fmt::Display for MoneyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoneyError::Overflow => write!(f, "money arithmetic overflow"),
            MoneyError::NotRepresentable => {
                write!(f, "amount is not representable as fixed-point money")
            }
        }
    }
}

impl std::error::Error for MoneyError {}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// A currency amount in integer minor units.
///
/// Serializes as the raw `i64` minor-unit count so database columns and JSON
/// payloads carry the exact value. Construction from display units goes
/// through the checked constructors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Construct from a raw minor-unit count (e.g. a `BIGINT` column).
    pub fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Construct from whole currency units.
    ///
    /// # Errors
    /// [`MoneyError::Overflow`] if `units * 100` exceeds `i64`.
    pub fn from_major(units: i64) -> Result<Self, MoneyError> {
        units
            .checked_mul(MINOR_PER_UNIT)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Raw minor-unit count.
    pub fn minor(self) -> i64 {
        self.0
    }

    /// Convert to display units as `f64`. **Wire boundary only** — never feed
    /// the result back into pricing arithmetic.
    pub fn to_major_f64(self) -> f64 {
        self.0 as f64 / MINOR_PER_UNIT as f64
    }

    /// Parse an `f64` display amount received from a wire payload.
    ///
    /// Rounds to the nearest minor unit to avoid systematic truncation bias.
    ///
    /// # Errors
    /// [`MoneyError::NotRepresentable`] for `NaN`, infinities, or values whose
    /// scaled form leaves `i64` range.
    pub fn from_major_f64(amount: f64) -> Result<Self, MoneyError> {
        if !amount.is_finite() {
            return Err(MoneyError::NotRepresentable);
        }
        let scaled = amount * MINOR_PER_UNIT as f64;
        if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
            return Err(MoneyError::NotRepresentable);
        }
        Ok(Money(scaled.round() as i64))
    }

    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Multiply by a month count (or any non-negative scalar).
    pub fn checked_mul(self, factor: u32) -> Result<Money, MoneyError> {
        self.0
            .checked_mul(i64::from(factor))
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for Money {
    /// Renders as display units with two decimals, e.g. `152500.00`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:02}",
            abs / MINOR_PER_UNIT as u64,
            abs % MINOR_PER_UNIT as u64
        )
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
