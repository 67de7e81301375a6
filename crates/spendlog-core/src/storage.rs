use rust_decimal::Decimal;
use time::Date;

use crate::models::{ExpenseRecord, NewExpense, SummaryRow};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StorageError::Connection(_) | StorageError::IOError(_))
    }
}

/// The persistence contract every backend satisfies.
///
/// Implementations acquire a connection per call and release it before
/// returning, on success and on error alike. Nothing is retried.
pub trait ExpenseStore: Send + Sync {
    /// Short name used in logs and CLI output.
    fn backend_name(&self) -> &'static str;

    fn fetch_for_date(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError>;
    fn delete_for_date(&self, date: Date) -> Result<(), StorageError>;
    fn insert(&self, date: Date, amount: Decimal, category: &str, notes: &str) -> Result<(), StorageError>;
    /// Totals per category for `start..=end`. Categories without records in the
    /// range are absent from the result.
    fn summary(&self, start: Date, end: Date) -> Result<Vec<SummaryRow>, StorageError>;

    /// Replaces every record of `date` with `entries`, in order.
    ///
    /// The default runs `delete_for_date` and then one `insert` per entry, so a
    /// failure part way through leaves the day partially written. Transactional
    /// backends override this with a single transaction.
    fn replace_day(&self, date: Date, entries: &[NewExpense]) -> Result<(), StorageError> {
        self.delete_for_date(date)?;
        for entry in entries {
            self.insert(date, entry.amount, &entry.category, &entry.notes)?;
        }
        Ok(())
    }

    // Whole-store access used when copying data between backends
    fn fetch_all(&self) -> Result<Vec<ExpenseRecord>, StorageError>;
    /// The first `limit` records in `fetch_all` order. SQL backends push the
    /// limit into the query.
    fn fetch_first(&self, limit: usize) -> Result<Vec<ExpenseRecord>, StorageError> {
        let mut records = self.fetch_all()?;
        records.truncate(limit);
        Ok(records)
    }
    /// Inserts a record keeping its `created_at`. The store assigns a fresh `id`.
    fn import(&self, record: &ExpenseRecord) -> Result<(), StorageError>;
    fn count(&self) -> Result<u64, StorageError>;
}
