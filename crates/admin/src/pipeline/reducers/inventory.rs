//! Inventory risk buckets and quantity statistics.

use std::collections::BTreeMap;

use serde::Serialize;

use catalog_ops_core::CanonicalRecord;

use crate::pipeline::Reducer;

/// Single-pass mean and population variance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    /// Add one observation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn push(self, value: f64) -> Self {
        let count = self.count + 1;
        let delta = value - self.mean;
        let mean = self.mean + delta / count as f64;
        let m2 = delta.mul_add(value - mean, self.m2);
        Self { count, mean, m2 }
    }

    /// Number of observations.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Mean, 0 when empty.
    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance, 0 when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// A record flagged as critical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedRecord {
    /// Record id.
    pub id: String,
    /// Record title.
    pub title: String,
    /// Stock quantity.
    pub quantity: i64,
}

/// Buckets stock into critical, low and healthy.
///
/// A quantity below `critical_below` is critical, below `low_below` is low,
/// anything else is healthy. Negative quantities are critical and also
/// counted on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryRiskReducer {
    /// Exclusive upper bound of the critical bucket.
    pub critical_below: i64,
    /// Exclusive upper bound of the low bucket.
    pub low_below: i64,
}

impl Default for InventoryRiskReducer {
    fn default() -> Self {
        Self {
            critical_below: 2,
            low_below: 5,
        }
    }
}

/// Running inventory aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryState {
    critical_count: usize,
    low_count: usize,
    healthy_count: usize,
    negative_count: usize,
    total_quantity: i64,
    min_quantity: Option<i64>,
    max_quantity: Option<i64>,
    low_stock_breakdown: BTreeMap<i64, usize>,
    critical: Vec<FlaggedRecord>,
    stats: Welford,
}

/// Final inventory report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryReport {
    /// Critical threshold used.
    pub critical_below: i64,
    /// Low threshold used.
    pub low_below: i64,
    /// Records folded.
    pub record_count: u64,
    /// Records in the critical bucket (negatives included).
    pub critical_count: usize,
    /// Records in the low bucket.
    pub low_count: usize,
    /// Records in the healthy bucket.
    pub healthy_count: usize,
    /// Records with negative stock.
    pub negative_count: usize,
    /// Sum of all quantities.
    pub total_quantity: i64,
    /// Smallest quantity seen.
    pub min_quantity: Option<i64>,
    /// Largest quantity seen.
    pub max_quantity: Option<i64>,
    /// Mean quantity.
    pub mean_quantity: f64,
    /// Population variance of the quantities.
    pub variance: f64,
    /// Standard deviation of the quantities.
    pub std_dev: f64,
    /// How many records hold each quantity below the low threshold.
    pub low_stock_breakdown: BTreeMap<i64, usize>,
    /// Every critical record, in fold order.
    pub critical_items: Vec<FlaggedRecord>,
}

impl Reducer for InventoryRiskReducer {
    type State = InventoryState;
    type Report = InventoryReport;

    fn init(&self) -> InventoryState {
        InventoryState::default()
    }

    #[allow(clippy::cast_precision_loss)]
    fn fold(&self, mut state: InventoryState, record: CanonicalRecord) -> InventoryState {
        let quantity = record.quantity;

        if quantity < self.critical_below || quantity < 0 {
            state.critical_count += 1;
            state.critical.push(FlaggedRecord {
                id: record.id,
                title: record.title,
                quantity,
            });
        } else if quantity < self.low_below {
            state.low_count += 1;
        } else {
            state.healthy_count += 1;
        }

        if quantity < 0 {
            state.negative_count += 1;
        }
        if quantity < self.low_below {
            *state.low_stock_breakdown.entry(quantity).or_insert(0) += 1;
        }

        state.total_quantity = state.total_quantity.saturating_add(quantity);
        state.min_quantity = Some(state.min_quantity.map_or(quantity, |m| m.min(quantity)));
        state.max_quantity = Some(state.max_quantity.map_or(quantity, |m| m.max(quantity)));
        state.stats = state.stats.push(quantity as f64);
        state
    }

    fn finalize(&self, state: InventoryState) -> InventoryReport {
        let variance = state.stats.variance();
        InventoryReport {
            critical_below: self.critical_below,
            low_below: self.low_below,
            record_count: state.stats.count(),
            critical_count: state.critical_count,
            low_count: state.low_count,
            healthy_count: state.healthy_count,
            negative_count: state.negative_count,
            total_quantity: state.total_quantity,
            min_quantity: state.min_quantity,
            max_quantity: state.max_quantity,
            mean_quantity: state.stats.mean(),
            variance,
            std_dev: variance.sqrt(),
            low_stock_breakdown: state.low_stock_breakdown,
            critical_items: state.critical,
        }
    }
}
