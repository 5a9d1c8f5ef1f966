//! Recombination of ratio metrics from aggregated components.
//!
//! A per-store percentage is never summed or averaged across stores: stores
//! differ in volume, so the only correct cross-store ratio is the quotient of
//! the summed numerator and the summed denominator. Daily ratio series are
//! built the same way, per date, from the date-aligned component series.

use std::collections::BTreeMap;

use crate::config::PERCENT_SCALE;
use crate::error::{Result, RollupError};
use crate::models::{AggregatedMetric, DailyPoint, DerivedRatio, MetricName, MetricSnapshot, RatioFormula};
use crate::series;

// ---------------------------------------------------------------------------
// Safe division
// ---------------------------------------------------------------------------

/// `numerator / denominator * scale`, or 0 when the denominator is 0.
///
/// Never returns `NaN` or an infinity: any non-finite quotient collapses to 0.
pub fn safe_ratio(numerator: f64, denominator: f64, scale: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator * scale;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Evaluate a formula over windowed totals.
pub fn ratio(formula: RatioFormula, numerator_total: f64, denominator_total: f64) -> f64 {
    safe_ratio(numerator_total, denominator_total, formula.scale())
}

pub fn basket_size(sales: f64, orders: f64) -> f64 {
    ratio(RatioFormula::BasketSize, sales, orders)
}

pub fn conversion_rate(orders: f64, visitors: f64) -> f64 {
    ratio(RatioFormula::ConversionRate, orders, visitors)
}

pub fn ctr(clicks: f64, impressions: f64) -> f64 {
    ratio(RatioFormula::Ctr, clicks, impressions)
}

pub fn roas(sales: f64, cost: f64) -> f64 {
    ratio(RatioFormula::Roas, sales, cost)
}

// ---------------------------------------------------------------------------
// Recombination
// ---------------------------------------------------------------------------

/// Rebuild a ratio metric from its aggregated numerator and denominator.
///
/// `components` must hold both [`RatioFormula::numerator`] and
/// [`RatioFormula::denominator`]; a missing component is an
/// [`RollupError::InvalidArgument`].
pub fn recombine(
    formula: RatioFormula,
    components: &BTreeMap<MetricName, AggregatedMetric>,
) -> Result<DerivedRatio> {
    let numerator = component(formula, formula.numerator(), components)?;
    let denominator = component(formula, formula.denominator(), components)?;

    Ok(DerivedRatio {
        formula,
        value: ratio(formula, numerator.total, denominator.total),
        numerator_total: numerator.total,
        denominator_total: denominator.total,
        series: daily_ratio(formula, &numerator.series, &denominator.series),
    })
}

fn component<'a>(
    formula: RatioFormula,
    name: MetricName,
    components: &'a BTreeMap<MetricName, AggregatedMetric>,
) -> Result<&'a AggregatedMetric> {
    components.get(&name).ok_or_else(|| {
        RollupError::InvalidArgument(format!("{} requires component '{}'", formula, name))
    })
}

/// Per-date ratio from date-aligned numerator and denominator series.
///
/// `out[d] = numerator[d] / denominator[d] * scale`, 0 on days where the
/// denominator is 0 or absent.
pub fn daily_ratio(
    formula: RatioFormula,
    numerator: &[DailyPoint],
    denominator: &[DailyPoint],
) -> Vec<DailyPoint> {
    series::zip_by_date(numerator, denominator)
        .into_iter()
        .map(|(date, n, d)| DailyPoint::new(date, ratio(formula, n, d)))
        .collect()
}

// ---------------------------------------------------------------------------
// Derived components
// ---------------------------------------------------------------------------

/// `Σ_store(base_store * rate_store / 100)`.
///
/// Reconstructs an absolute count (clicks from impressions and CTR, orders
/// from clicks and conversion rate) when the count itself is not reported.
pub fn sum_of_rated<I>(pairs: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    pairs
        .into_iter()
        .map(|(base, rate)| base * rate / PERCENT_SCALE)
        .sum()
}

/// Derive one store's absolute count from a base count and a percentage rate.
///
/// The total uses the window totals; each day uses that day's base and rate
/// (a day without a rate point contributes 0).
pub fn apply_rate(base: &MetricSnapshot, rate: &MetricSnapshot) -> MetricSnapshot {
    let total = sum_of_rated([(base.total, rate.total)]);
    let rates: BTreeMap<_, _> = rate.series.iter().map(|p| (p.date, p.value)).collect();
    let mut series: Vec<DailyPoint> = base
        .series
        .iter()
        .map(|p| {
            let r = rates.get(&p.date).copied().unwrap_or(0.0);
            DailyPoint::new(p.date, sum_of_rated([(p.value, r)]))
        })
        .collect();
    series.sort_by_key(|p| p.date);
    MetricSnapshot::new(total, series)
}
