//! Grouped sales summaries.
//!
//! Products are grouped by exact, case-sensitive name; months by the
//! `(year, month)` of each record's date. Amounts are summed as decimals, so
//! the result does not depend on input order. A sum that leaves the `Decimal`
//! range is an error rather than a wrapped or saturated value.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::{
    data::{SalesRecord, YearMonth},
    error::AnalyzerError,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggregationResult {
    pub totals_by_product: BTreeMap<String, Decimal>,
    pub average_by_month: BTreeMap<YearMonth, Decimal>,
    pub count_by_product: BTreeMap<String, usize>,
    pub grand_total: Decimal,
    pub grand_count: usize,
    /// Zero when there are no records.
    pub max_product_total: Decimal,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.grand_count == 0
    }
}

#[derive(Default)]
struct MonthAccumulator {
    sum: Decimal,
    count: u64,
}

impl MonthAccumulator {
    fn mean(&self) -> Decimal {
        if self.count == 0 {
            return Decimal::ZERO;
        }
        // |sum / count| <= |sum| for count >= 1, so this cannot leave the range.
        self.sum
            .checked_div(Decimal::from(self.count))
            .unwrap_or(Decimal::ZERO)
    }
}

fn add_amount(
    total: &mut Decimal,
    amount: Decimal,
    scope: impl FnOnce() -> String,
) -> Result<(), AnalyzerError> {
    *total = total
        .checked_add(amount)
        .ok_or_else(|| AnalyzerError::amount_overflow(scope()))?;
    Ok(())
}

pub fn aggregate(records: &[SalesRecord]) -> Result<AggregationResult, AnalyzerError> {
    let mut totals_by_product: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut count_by_product: BTreeMap<String, usize> = BTreeMap::new();
    let mut months: BTreeMap<YearMonth, MonthAccumulator> = BTreeMap::new();

    for record in records {
        let product = record.product_name();
        add_amount(
            totals_by_product.entry(product.to_string()).or_default(),
            record.sales(),
            || format!("product '{product}'"),
        )?;
        *count_by_product.entry(product.to_string()).or_default() += 1;
        let month = months.entry(record.month()).or_default();
        add_amount(&mut month.sum, record.sales(), || {
            format!("month {}", record.month())
        })?;
        month.count += 1;
    }

    let average_by_month = months
        .into_iter()
        .map(|(month, acc)| (month, acc.mean()))
        .collect();
    let mut grand_total = Decimal::ZERO;
    for total in totals_by_product.values() {
        add_amount(&mut grand_total, *total, || "all products".to_string())?;
    }
    let grand_count: usize = count_by_product.values().sum();
    let max_product_total = totals_by_product
        .values()
        .copied()
        .max()
        .unwrap_or(Decimal::ZERO);

    Ok(AggregationResult {
        totals_by_product,
        average_by_month,
        count_by_product,
        grand_total,
        grand_count,
        max_product_total,
    })
}
