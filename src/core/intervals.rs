//! Partitioning of a date range into fixed-width time windows.

use crate::types::{MosaicError, MosaicResult, TimeInterval};
use chrono::{DateTime, Duration, Utc};

/// Partition `[min_date, max_date)` into contiguous windows of
/// `width_days` days. The final window is truncated at `max_date` and may
/// be shorter than the nominal width. Produces exactly
/// `ceil(range / width)` intervals.
pub fn plan_intervals(
    min_date: DateTime<Utc>,
    max_date: DateTime<Utc>,
    width_days: i64,
) -> MosaicResult<Vec<TimeInterval>> {
    if width_days <= 0 {
        return Err(MosaicError::InvalidRange(format!(
            "interval width must be positive, got {} days",
            width_days
        )));
    }
    if max_date <= min_date {
        return Err(MosaicError::InvalidRange(format!(
            "max date {} is not after min date {}",
            max_date.format("%Y-%m-%d"),
            min_date.format("%Y-%m-%d")
        )));
    }

    let width = Duration::days(width_days);
    let mut intervals = Vec::new();
    let mut start = min_date;
    while start < max_date {
        let end = (start + width).min(max_date);
        intervals.push(TimeInterval { start, end });
        start = end;
    }

    log::debug!(
        "Planned {} intervals of {} days between {} and {}",
        intervals.len(),
        width_days,
        min_date.format("%Y-%m-%d"),
        max_date.format("%Y-%m-%d")
    );
    Ok(intervals)
}
