use std::sync::Arc;

use spendlog_core::{round_amount, ExpenseRecord, IntoExpenseDate, NewExpense};

use crate::storage::{ExpenseStore, StorageError};

/// Reading and rewriting the expenses of a single day.
pub struct ExpenseService {
    store: Arc<dyn ExpenseStore>,
}

impl ExpenseService {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ExpenseStore> {
        &self.store
    }

    pub fn fetch_day(&self, date: impl IntoExpenseDate) -> Result<Vec<ExpenseRecord>, StorageError> {
        let date = date.into_expense_date()?;
        tracing::info!(%date, backend = self.store.backend_name(), "fetch_day");
        self.store.fetch_for_date(date)
    }

    /// Replaces the whole day with `entries`. Entries whose amount is not
    /// positive are dropped and the rest are rounded to cents. Returns how many
    /// were kept.
    pub fn replace_day(&self, date: impl IntoExpenseDate, entries: Vec<NewExpense>) -> Result<usize, StorageError> {
        let date = date.into_expense_date()?;
        let submitted = entries.len();
        let kept = keep_positive(entries);
        tracing::info!(
            %date,
            submitted,
            kept = kept.len(),
            backend = self.store.backend_name(),
            "replace_day"
        );
        self.store.replace_day(date, &kept)?;
        Ok(kept.len())
    }
}

pub fn keep_positive(entries: Vec<NewExpense>) -> Vec<NewExpense> {
    entries
        .into_iter()
        .filter(|e| e.amount > rust_decimal::Decimal::ZERO)
        .map(|mut e| {
            e.amount = round_amount(e.amount);
            e
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use rust_decimal_macros::dec;

    fn service() -> ExpenseService {
        ExpenseService::new(Arc::new(InMemoryStorage::new()))
    }

    #[test]
    fn test_untouched_day_is_empty() {
        assert!(service().fetch_day("2024-08-01").unwrap().is_empty());
    }

    #[test]
    fn test_non_positive_amounts_are_dropped() {
        let kept = keep_positive(vec![
            NewExpense::new(dec!(100), "Rent", ""),
            NewExpense::new(dec!(0), "Food", "skip"),
            NewExpense::new(dec!(-3), "Food", "refund"),
        ]);
        assert_eq!(kept, vec![NewExpense::new(dec!(100), "Rent", "")]);
    }

    #[test]
    fn test_small_positive_amounts_are_kept_and_rounded() {
        let service = service();
        let kept = service
            .replace_day(
                "2024-08-01",
                vec![
                    NewExpense::new(dec!(0.125), "Food", "a"),
                    NewExpense::new(dec!(2.345), "Food", "b"),
                    NewExpense::new(dec!(0.005), "Food", "c"),
                ],
            )
            .unwrap();
        assert_eq!(kept, 3);

        let stored: Vec<_> = service
            .fetch_day("2024-08-01")
            .unwrap()
            .into_iter()
            .map(|r| (r.notes, r.amount))
            .collect();
        assert_eq!(
            stored,
            vec![
                ("a".to_string(), dec!(0.13)),
                ("b".to_string(), dec!(2.35)),
                ("c".to_string(), dec!(0.01)),
            ]
        );
    }

    #[test]
    fn test_replace_day_with_nothing_clears_the_day() {
        let service = service();
        service
            .replace_day("2024-08-01", vec![NewExpense::new(dec!(5), "Food", "")])
            .unwrap();
        assert_eq!(service.fetch_day("2024-08-01").unwrap().len(), 1);

        assert_eq!(service.replace_day("2024-08-01", vec![]).unwrap(), 0);
        assert!(service.fetch_day("2024-08-01").unwrap().is_empty());
    }

    #[test]
    fn test_replace_day_keeps_entry_order() {
        let service = service();
        service
            .replace_day(
                "2024-08-02",
                vec![
                    NewExpense::new(dec!(1), "Food", "first"),
                    NewExpense::new(dec!(2), "Food", "second"),
                ],
            )
            .unwrap();
        let notes: Vec<_> = service
            .fetch_day("2024-08-02")
            .unwrap()
            .into_iter()
            .map(|r| r.notes)
            .collect();
        assert_eq!(notes, vec!["first", "second"]);
    }

    #[test]
    fn test_bad_date_is_rejected_before_storage() {
        let err = service().fetch_day("2024-02-31").unwrap_err();
        assert!(matches!(err, StorageError::InvalidDate(_)));
    }
}
