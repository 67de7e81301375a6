//! Copying every expense from one backend to another.

use spendlog_core::{format_date, ExpenseRecord};

use crate::storage::{ExpenseStore, StorageError};

pub const SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub read: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Imports `records` into `target` in order. Rows the target rejects are logged
/// and skipped; losing the connection aborts the whole copy.
pub fn copy_records(records: &[ExpenseRecord], target: &dyn ExpenseStore) -> Result<MigrationReport, StorageError> {
    // Touch the target first so schema creation and connection problems
    // surface before any row is attempted.
    let existing = target.count()?;
    tracing::info!(backend = target.backend_name(), existing, rows = records.len(), "Starting import");

    let mut report = MigrationReport {
        read: records.len(),
        ..Default::default()
    };
    for record in records {
        match target.import(record) {
            Ok(()) => report.inserted += 1,
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    id = record.id,
                    date = %format_date(record.expense_date),
                    error = %e,
                    "Skipped expense"
                );
                report.skipped += 1;
            }
        }
    }

    tracing::info!(inserted = report.inserted, skipped = report.skipped, "Import finished");
    Ok(report)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub source_count: u64,
    pub target_count: u64,
    pub sample: Vec<ExpenseRecord>,
}

impl Verification {
    pub fn counts_match(&self) -> bool {
        self.source_count == self.target_count
    }
}

pub fn verify(source: &dyn ExpenseStore, target: &dyn ExpenseStore) -> Result<Verification, StorageError> {
    let source_count = source.count()?;
    let target_count = target.count()?;
    let sample = target.fetch_first(SAMPLE_SIZE)?;

    Ok(Verification {
        source_count,
        target_count,
        sample,
    })
}
