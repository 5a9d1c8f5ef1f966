use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::PERCENT_SCALE;

// ---------------------------------------------------------------------------
// MetricName: Every metric the dashboard can request
// ---------------------------------------------------------------------------

/// A metric reported per store by the snapshot layer.
///
/// Additive metrics (`Sales`, `Orders`, `Visitors`, `Impressions`, `Clicks`,
/// `Cost`) may be summed across stores. Ratio metrics (`BasketSize`,
/// `ConversionRate`, `Ctr`, `Roas`) must be recombined from their additive
/// components, see [`RatioFormula`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricName {
    Sales,
    Orders,
    Visitors,
    Impressions,
    Clicks,
    Cost,
    BasketSize,
    ConversionRate,
    Ctr,
    Roas,
}

impl MetricName {
    /// The camelCase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Sales => "sales",
            MetricName::Orders => "orders",
            MetricName::Visitors => "visitors",
            MetricName::Impressions => "impressions",
            MetricName::Clicks => "clicks",
            MetricName::Cost => "cost",
            MetricName::BasketSize => "basketSize",
            MetricName::ConversionRate => "conversionRate",
            MetricName::Ctr => "ctr",
            MetricName::Roas => "roas",
        }
    }

    pub fn kind(&self) -> MetricKind {
        if self.formula().is_some() {
            MetricKind::Ratio
        } else {
            MetricKind::Additive
        }
    }

    pub fn is_ratio(&self) -> bool {
        self.kind() == MetricKind::Ratio
    }

    /// The recombination formula for a ratio metric, `None` for additive ones.
    pub fn formula(&self) -> Option<RatioFormula> {
        match self {
            MetricName::BasketSize => Some(RatioFormula::BasketSize),
            MetricName::ConversionRate => Some(RatioFormula::ConversionRate),
            MetricName::Ctr => Some(RatioFormula::Ctr),
            MetricName::Roas => Some(RatioFormula::Roas),
            _ => None,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Additive,
    Ratio,
}

// ---------------------------------------------------------------------------
// RatioFormula: numerator / denominator * scale
// ---------------------------------------------------------------------------

/// A named quotient of two additive metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RatioFormula {
    /// `sales / orders`
    BasketSize,
    /// `orders / visitors * 100`
    ConversionRate,
    /// `clicks / impressions * 100`
    Ctr,
    /// `sales / cost`
    Roas,
}

impl RatioFormula {
    pub fn metric(&self) -> MetricName {
        match self {
            RatioFormula::BasketSize => MetricName::BasketSize,
            RatioFormula::ConversionRate => MetricName::ConversionRate,
            RatioFormula::Ctr => MetricName::Ctr,
            RatioFormula::Roas => MetricName::Roas,
        }
    }

    pub fn numerator(&self) -> MetricName {
        match self {
            RatioFormula::BasketSize | RatioFormula::Roas => MetricName::Sales,
            RatioFormula::ConversionRate => MetricName::Orders,
            RatioFormula::Ctr => MetricName::Clicks,
        }
    }

    pub fn denominator(&self) -> MetricName {
        match self {
            RatioFormula::BasketSize => MetricName::Orders,
            RatioFormula::ConversionRate => MetricName::Visitors,
            RatioFormula::Ctr => MetricName::Impressions,
            RatioFormula::Roas => MetricName::Cost,
        }
    }

    /// Multiplier applied to the quotient (100 for percentages).
    pub fn scale(&self) -> f64 {
        match self {
            RatioFormula::ConversionRate | RatioFormula::Ctr => PERCENT_SCALE,
            RatioFormula::BasketSize | RatioFormula::Roas => 1.0,
        }
    }
}

impl fmt::Display for RatioFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric().as_str())
    }
}
