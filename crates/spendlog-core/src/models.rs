use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use time::{Date, PrimitiveDateTime};

use crate::storage::StorageError;

/// Categories offered by the entry form. Storage accepts any label.
pub const DEFAULT_CATEGORIES: [&str; 5] = ["Rent", "Food", "Shopping", "Entertainment", "Other"];

/// Number of decimal places kept for monetary amounts.
pub const AMOUNT_SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseRecord {
    pub id: i64,
    pub expense_date: Date,
    pub amount: Decimal,
    pub category: String,
    pub notes: String,
    pub created_at: PrimitiveDateTime,
}

/// The caller-supplied part of a record, as entered in the form or posted to the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category: String,
    #[serde(default)]
    pub notes: String,
}

impl NewExpense {
    pub fn new(amount: Decimal, category: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            amount,
            category: category.into(),
            notes: notes.into(),
        }
    }
}

impl From<&ExpenseRecord> for NewExpense {
    fn from(record: &ExpenseRecord) -> Self {
        Self {
            amount: record.amount,
            category: record.category.clone(),
            notes: record.notes.clone(),
        }
    }
}

/// One `(category, total)` pair of a grouped range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub category: String,
    pub total: Decimal,
}

impl SummaryRow {
    pub fn new(category: impl Into<String>, total: Decimal) -> Self {
        Self {
            category: category.into(),
            total,
        }
    }
}

/// Rounds half a cent away from zero, as `NUMERIC(10,2)` columns store it.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Parses an amount read back from a store. Engines render numeric columns in
/// plain or scientific notation depending on magnitude.
pub fn parse_amount(s: &str) -> Result<Decimal, StorageError> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map(round_amount)
        .map_err(|e| StorageError::InvalidAmount(format!("{}: {}", s, e)))
}
