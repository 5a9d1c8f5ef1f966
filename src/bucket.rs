//! Re-bucketing of dated series into coarser periods.
//!
//! Two modes are supported: quarterly (consecutive groups of three monthly
//! points) and day-of-week (all occurrences of each weekday in a range).
//! Ratio metrics are re-bucketed by bucketing their numerator and denominator
//! and recombining per bucket, never by summing the ratio values.

use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{EngineConfig, WeekStart, WeekdayPolicy};
use crate::models::{DailyPoint, DateRange, PeriodBucket, QuarterRow, RatioFormula};
use crate::ratio;
use crate::series;

const MONTHS_PER_QUARTER: usize = 3;

// ---------------------------------------------------------------------------
// Monthly / quarterly
// ---------------------------------------------------------------------------

/// Sum a daily series into one point per calendar month, dated on the 1st.
pub fn monthly(daily: &[DailyPoint]) -> Vec<DailyPoint> {
    let mut by_month: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for point in daily {
        *by_month.entry(month_start(point.date)).or_insert(0.0) += point.value;
    }
    by_month
        .into_iter()
        .map(|(date, value)| DailyPoint::new(date, value))
        .collect()
}

/// Group monthly points into consecutive groups of three.
///
/// Each bucket is labelled `Q{n} {year}` after the first month of its group.
/// A trailing group with fewer than three months is still emitted, with
/// `count` reflecting the months it holds.
pub fn quarterly(monthly: &[DailyPoint]) -> Vec<PeriodBucket> {
    let mut sorted = monthly.to_vec();
    sorted.sort_by_key(|p| p.date);

    sorted
        .chunks(MONTHS_PER_QUARTER)
        .map(|group| {
            let sum: f64 = group.iter().map(|p| p.value).sum();
            let count = group.len() as u32;
            PeriodBucket {
                label: quarter_label(group[0].date),
                sum,
                count,
                average: ratio::safe_ratio(sum, count as f64, 1.0),
            }
        })
        .collect()
}

/// Quarterly buckets of a ratio metric from its monthly components.
///
/// Each bucket's `sum` and `average` both carry the ratio recombined from
/// the quarter's summed numerator and denominator.
pub fn quarterly_ratio(
    formula: RatioFormula,
    monthly_numerator: &[DailyPoint],
    monthly_denominator: &[DailyPoint],
) -> Vec<PeriodBucket> {
    series::zip_by_date(monthly_numerator, monthly_denominator)
        .chunks(MONTHS_PER_QUARTER)
        .map(|group| {
            let n: f64 = group.iter().map(|(_, n, _)| n).sum();
            let d: f64 = group.iter().map(|(_, _, d)| d).sum();
            let value = ratio::ratio(formula, n, d);
            PeriodBucket {
                label: quarter_label(group[0].0),
                sum: value,
                count: group.len() as u32,
                average: value,
            }
        })
        .collect()
}

/// Quarterly sales and orders with a basket size recomputed per quarter.
pub fn quarterly_sales(monthly_sales: &[DailyPoint], monthly_orders: &[DailyPoint]) -> Vec<QuarterRow> {
    series::zip_by_date(monthly_sales, monthly_orders)
        .chunks(MONTHS_PER_QUARTER)
        .map(|group| {
            let sales: f64 = group.iter().map(|(_, s, _)| s).sum();
            let orders: f64 = group.iter().map(|(_, _, o)| o).sum();
            QuarterRow {
                label: quarter_label(group[0].0),
                sales,
                orders,
                basket_size: ratio::basket_size(sales, orders),
            }
        })
        .collect()
}

pub fn quarter_label(date: NaiveDate) -> String {
    format!("Q{} {}", (date.month0() / 3) + 1, date.year())
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

// ---------------------------------------------------------------------------
// PeriodBucketer: day-of-week bucketing bound to an engine config
// ---------------------------------------------------------------------------

/// Day-of-week bucketing using the labels, week start and empty-weekday
/// policy of an [`EngineConfig`].
pub struct PeriodBucketer<'a> {
    config: &'a EngineConfig,
}

impl<'a> PeriodBucketer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Group a daily series by weekday.
    ///
    /// With a `window`, only points inside it are summed and `count` is the
    /// number of calendar occurrences of the weekday in the window (a day
    /// without a point counts as a zero-valued day). Without one, `count` is
    /// the number of points falling on that weekday.
    ///
    /// Output follows the canonical week order, never first-seen order.
    pub fn day_of_week(&self, daily: &[DailyPoint], window: Option<&DateRange>) -> Vec<PeriodBucket> {
        let tally = WeekdayTally::collect(daily, &[], window);
        self.emit(&tally, |sum, _, count| {
            (sum, ratio::safe_ratio(sum, count as f64, 1.0))
        })
    }

    /// Weekday buckets of a ratio metric, recombined per weekday from the
    /// bucketed numerator and denominator. `sum` and `average` both carry
    /// the recombined ratio.
    pub fn day_of_week_ratio(
        &self,
        formula: RatioFormula,
        numerator: &[DailyPoint],
        denominator: &[DailyPoint],
        window: Option<&DateRange>,
    ) -> Vec<PeriodBucket> {
        let tally = WeekdayTally::collect(numerator, denominator, window);
        self.emit(&tally, |n, d, _| {
            let value = ratio::ratio(formula, n, d);
            (value, value)
        })
    }

    fn emit<F>(&self, tally: &WeekdayTally, value: F) -> Vec<PeriodBucket>
    where
        F: Fn(f64, f64, u32) -> (f64, f64),
    {
        self.canonical_order()
            .into_iter()
            .filter_map(|day| {
                let count = tally.counts[day];
                if count == 0 && self.config.weekday_policy == WeekdayPolicy::Omit {
                    return None;
                }
                let (sum, average) = if count == 0 {
                    (0.0, 0.0)
                } else {
                    value(tally.primary[day], tally.secondary[day], count)
                };
                Some(PeriodBucket {
                    label: self.config.weekday_labels.label(day as u32).to_string(),
                    sum,
                    count,
                    average,
                })
            })
            .collect()
    }

    /// Weekday indices (days from Sunday) in output order.
    fn canonical_order(&self) -> [usize; 7] {
        match self.config.week_start {
            WeekStart::Sunday => [0, 1, 2, 3, 4, 5, 6],
            WeekStart::Monday => [1, 2, 3, 4, 5, 6, 0],
        }
    }
}

/// Per-weekday sums of up to two series plus occurrence counts.
struct WeekdayTally {
    primary: [f64; 7],
    secondary: [f64; 7],
    counts: [u32; 7],
}

impl WeekdayTally {
    fn collect(primary: &[DailyPoint], secondary: &[DailyPoint], window: Option<&DateRange>) -> Self {
        let in_window = |date: NaiveDate| window.map_or(true, |w| w.contains(date));
        let mut tally = Self {
            primary: [0.0; 7],
            secondary: [0.0; 7],
            counts: [0; 7],
        };

        for p in primary.iter().filter(|p| in_window(p.date)) {
            tally.primary[weekday_index(p.date)] += p.value;
        }
        for p in secondary.iter().filter(|p| in_window(p.date)) {
            tally.secondary[weekday_index(p.date)] += p.value;
        }

        match window {
            Some(w) => {
                for date in w.iter_days() {
                    tally.counts[weekday_index(date)] += 1;
                }
            }
            None => {
                let dates: BTreeSet<NaiveDate> =
                    primary.iter().chain(secondary).map(|p| p.date).collect();
                for date in dates {
                    tally.counts[weekday_index(date)] += 1;
                }
            }
        }
        tally
    }
}

fn weekday_index(date: NaiveDate) -> usize {
    date.weekday().num_days_from_sunday() as usize
}
