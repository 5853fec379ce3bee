use chrono::{Months, NaiveDate};

/// Add `months` calendar months to `date`, clamping to the last day of the
/// target month when the source day does not exist there (Jan 31 + 1 month =
/// Feb 28, or Feb 29 in a leap year).
///
/// Returns `None` only when the result would leave chrono's representable
/// date range, which for real booking dates indicates corrupt input.
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}
