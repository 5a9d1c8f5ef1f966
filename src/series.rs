//! Date-keyed merging of daily point series.
//!
//! Series from different stores are not guaranteed to share length or date
//! alignment (a store may have gaps, or may have opened mid-window), so every
//! combination here is keyed by calendar date and never by array position.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

use crate::error::{Result, RollupError};
use crate::models::DailyPoint;

/// Sum two daily series by calendar date.
///
/// Dates present in only one side keep their own value. The output is sorted
/// ascending by date with no duplicates. An empty `base` yields a copy of
/// `incoming`; an empty `incoming` yields `base` as is.
pub fn merge(base: &[DailyPoint], incoming: &[DailyPoint]) -> Vec<DailyPoint> {
    debug_assert!(
        ensure_unique_dates(base).is_ok() && ensure_unique_dates(incoming).is_ok(),
        "merge inputs must carry at most one point per date"
    );

    if base.is_empty() {
        return sorted_copy(incoming);
    }
    if incoming.is_empty() {
        return sorted_copy(base);
    }

    let mut by_date: BTreeMap<NaiveDate, f64> =
        base.iter().map(|p| (p.date, p.value)).collect();
    for point in incoming {
        *by_date.entry(point.date).or_insert(0.0) += point.value;
    }
    into_points(by_date)
}

/// Merge any number of series, folding left with [`merge`].
pub fn merge_all<'a, I>(series: I) -> Vec<DailyPoint>
where
    I: IntoIterator<Item = &'a [DailyPoint]>,
{
    series
        .into_iter()
        .fold(Vec::new(), |acc, next| merge(&acc, next))
}

/// Sum of every value in the series.
pub fn total(series: &[DailyPoint]) -> f64 {
    series.iter().map(|p| p.value).sum()
}

/// Pair two series by date over the union of their dates, defaulting a
/// missing side to 0. Sorted ascending.
pub fn zip_by_date(a: &[DailyPoint], b: &[DailyPoint]) -> Vec<(NaiveDate, f64, f64)> {
    let mut by_date: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for p in a {
        by_date.entry(p.date).or_insert((0.0, 0.0)).0 += p.value;
    }
    for p in b {
        by_date.entry(p.date).or_insert((0.0, 0.0)).1 += p.value;
    }
    by_date
        .into_iter()
        .map(|(date, (x, y))| (date, x, y))
        .collect()
}

/// Fail with [`RollupError::MisalignedSeries`] if a date appears twice.
pub fn ensure_unique_dates(series: &[DailyPoint]) -> Result<()> {
    let mut seen = HashSet::with_capacity(series.len());
    for point in series {
        if !seen.insert(point.date) {
            return Err(RollupError::MisalignedSeries(format!(
                "duplicate point for {}",
                point.date
            )));
        }
    }
    Ok(())
}

fn sorted_copy(series: &[DailyPoint]) -> Vec<DailyPoint> {
    let mut out = series.to_vec();
    out.sort_by_key(|p| p.date);
    out
}

fn into_points(by_date: BTreeMap<NaiveDate, f64>) -> Vec<DailyPoint> {
    by_date
        .into_iter()
        .map(|(date, value)| DailyPoint::new(date, value))
        .collect()
}
