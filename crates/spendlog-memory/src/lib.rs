//! In-process backend. Nothing survives the process; used for tests, benches and
//! throwaway sessions.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use rust_decimal::Decimal;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use spendlog_core::{
    round_amount, ExpenseRecord, ExpenseStore, NewExpense, StorageError, SummaryRow,
};

pub struct InMemoryStorage {
    records: RwLock<BTreeMap<i64, ExpenseRecord>>,
    id_counter: AtomicI64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            id_counter: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<i64, ExpenseRecord>>, StorageError> {
        self.records
            .read()
            .map_err(|_| StorageError::Other("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<i64, ExpenseRecord>>, StorageError> {
        self.records
            .write()
            .map_err(|_| StorageError::Other("in-memory store lock poisoned".to_string()))
    }

    fn new_record(&self, date: Date, amount: Decimal, category: &str, notes: &str, created_at: PrimitiveDateTime) -> ExpenseRecord {
        ExpenseRecord {
            id: self.next_id(),
            expense_date: date,
            amount: round_amount(amount),
            category: category.to_string(),
            notes: notes.to_string(),
            created_at,
        }
    }
}

fn now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

impl ExpenseStore for InMemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn fetch_for_date(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError> {
        let records = self.read()?;
        Ok(records
            .values()
            .filter(|r| r.expense_date == date)
            .cloned()
            .collect())
    }

    fn delete_for_date(&self, date: Date) -> Result<(), StorageError> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|_, r| r.expense_date != date);
        tracing::debug!(%date, removed = before - records.len(), "In-memory delete");
        Ok(())
    }

    fn insert(&self, date: Date, amount: Decimal, category: &str, notes: &str) -> Result<(), StorageError> {
        let record = self.new_record(date, amount, category, notes, now());
        self.write()?.insert(record.id, record);
        Ok(())
    }

    fn summary(&self, start: Date, end: Date) -> Result<Vec<SummaryRow>, StorageError> {
        let records = self.read()?;
        let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
        for record in records.values().filter(|r| r.expense_date >= start && r.expense_date <= end) {
            *totals.entry(record.category.as_str()).or_insert(Decimal::ZERO) += record.amount;
        }
        Ok(totals
            .into_iter()
            .map(|(category, total)| SummaryRow::new(category, total))
            .collect())
    }

    fn replace_day(&self, date: Date, entries: &[NewExpense]) -> Result<(), StorageError> {
        let created_at = now();
        let fresh: Vec<ExpenseRecord> = entries
            .iter()
            .map(|e| self.new_record(date, e.amount, &e.category, &e.notes, created_at))
            .collect();

        // Single write lock, so readers never observe a half-replaced day
        let mut records = self.write()?;
        records.retain(|_, r| r.expense_date != date);
        records.extend(fresh.into_iter().map(|r| (r.id, r)));
        Ok(())
    }

    fn fetch_all(&self) -> Result<Vec<ExpenseRecord>, StorageError> {
        let mut all: Vec<ExpenseRecord> = self.read()?.values().cloned().collect();
        all.sort_by_key(|r| (r.created_at, r.id));
        Ok(all)
    }

    fn import(&self, record: &ExpenseRecord) -> Result<(), StorageError> {
        let copy = self.new_record(
            record.expense_date,
            record.amount,
            &record.category,
            &record.notes,
            record.created_at,
        );
        self.write()?.insert(copy.id, copy);
        Ok(())
    }

    fn count(&self) -> Result<u64, StorageError> {
        Ok(self.read()?.len() as u64)
    }
}
