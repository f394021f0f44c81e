//! Measure accessors and ratio math.
//!
//! Unreported measures count as zero in every sum, and every division by zero
//! resolves to zero so no view ever carries `NaN` or infinity.

use crate::models::campaign_metric;

/// The single place an unreported measure becomes zero.
pub fn value_or<T: Default>(measure: Option<T>) -> T {
    measure.unwrap_or_default()
}

/// `numerator / denominator`, or 0 when the result would not be finite.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() { value } else { 0.0 }
}

/// Period-over-period change in percent; 0 when there is no previous value.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    safe_ratio(current - previous, previous) * 100.0
}

/// Summed measures of a set of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: f64,
}

impl Totals {
    pub fn add(&mut self, row: &campaign_metric::Model) {
        self.spend += value_or(row.spend);
        self.impressions += value_or(row.impressions);
        self.clicks += value_or(row.clicks);
        self.conversions += value_or(row.conversions);
    }

    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a campaign_metric::Model>) -> Self {
        let mut totals = Self::default();
        for row in rows {
            totals.add(row);
        }
        totals
    }

    /// Clicks per impression.
    pub fn ctr(&self) -> f64 {
        safe_ratio(self.clicks as f64, self.impressions as f64)
    }

    /// Spend per click.
    pub fn cpc(&self) -> f64 {
        safe_ratio(self.spend, self.clicks as f64)
    }

    pub fn cost_per_conversion(&self) -> f64 {
        safe_ratio(self.spend, self.conversions)
    }

    /// Conversion value (conversions × assumed value) per unit of spend.
    pub fn roas(&self, value_per_conversion: f64) -> f64 {
        safe_ratio(self.conversions * value_per_conversion, self.spend)
    }
}
