use std::{collections::BTreeMap, sync::Arc};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use spendlog_core::{IntoExpenseDate, SummaryRow};

use crate::storage::{ExpenseStore, StorageError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub percentage: f64,
}

/// Category name to its share of the range. Empty means the range holds no
/// expenses.
pub type Breakdown = BTreeMap<String, CategoryBreakdown>;

/// Turns grouped totals into shares of the grand total. With a zero grand total
/// every share is 0.
pub fn breakdown(rows: &[SummaryRow]) -> Breakdown {
    let grand_total: Decimal = rows.iter().map(|r| r.total).sum();

    rows.iter()
        .map(|row| {
            let percentage = if grand_total.is_zero() {
                0.0
            } else {
                (row.total / grand_total * Decimal::ONE_HUNDRED)
                    .to_f64()
                    .unwrap_or(0.0)
            };
            (
                row.category.clone(),
                CategoryBreakdown {
                    total: row.total,
                    percentage,
                },
            )
        })
        .collect()
}

pub struct AnalyticsService {
    store: Arc<dyn ExpenseStore>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }

    pub fn analyze(&self, start: impl IntoExpenseDate, end: impl IntoExpenseDate) -> Result<Breakdown, StorageError> {
        let start = start.into_expense_date()?;
        let end = end.into_expense_date()?;
        tracing::info!(%start, %end, backend = self.store.backend_name(), "analyze");

        let rows = self.store.summary(start, end)?;
        Ok(breakdown(&rows))
    }
}
