//! Period-over-period growth.
//!
//! Zero-baseline policy: growth from a previous value of 0 is undefined, so
//! it is reported as `0%`. When the current value is positive the trend is
//! still `Up`; when both are 0 the trend is `Equal`. No `NaN` or infinity is
//! ever returned.
//!
//! Trend follows the raw sign of the change regardless of metric polarity
//! (falling cost reports `Down`).

use serde::{Deserialize, Serialize};

use crate::config::PERCENT_SCALE;
use crate::models::Trend;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Growth {
    pub percent: f64,
    pub trend: Trend,
}

/// Percentage change from `previous` to `current`.
pub fn growth(current: f64, previous: f64) -> Growth {
    if previous == 0.0 {
        let trend = if current > 0.0 {
            Trend::Up
        } else if current < 0.0 {
            Trend::Down
        } else {
            Trend::Equal
        };
        return Growth { percent: 0.0, trend };
    }

    let percent = (current - previous) / previous * PERCENT_SCALE;
    if !percent.is_finite() {
        return Growth {
            percent: 0.0,
            trend: Trend::Equal,
        };
    }
    Growth {
        percent,
        trend: classify(percent),
    }
}

/// Shorthand for `growth(current, previous).percent`.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    growth(current, previous).percent
}

pub fn classify(percent: f64) -> Trend {
    if percent > 0.0 {
        Trend::Up
    } else if percent < 0.0 {
        Trend::Down
    } else {
        Trend::Equal
    }
}

/// Recover the previous-window total behind a snapshot's reported change.
///
/// Inverts `percent = (total - previous) / previous * 100`. A reported
/// `0%` with an `Up` trend is the zero-baseline case and yields `Some(0.0)`.
/// A change of `-100%` or below cannot be inverted and yields `None`.
pub fn implied_previous(total: f64, percent: f64, trend: Trend) -> Option<f64> {
    if percent == 0.0 && trend == Trend::Up && total > 0.0 {
        return Some(0.0);
    }
    let factor = 1.0 + percent / PERCENT_SCALE;
    if factor <= 0.0 {
        return None;
    }
    let previous = total / factor;
    previous.is_finite().then_some(previous)
}
