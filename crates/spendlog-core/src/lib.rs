//! Core types and traits for spendlog storage backends.
//!
//! This crate provides the `ExpenseStore` trait and all associated types,
//! enabling pluggable storage implementations in separate crates.

pub mod dates;
pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use dates::{format_date, format_timestamp, parse_date, parse_timestamp, IntoExpenseDate};
pub use models::{parse_amount, round_amount, ExpenseRecord, NewExpense, SummaryRow, DEFAULT_CATEGORIES};
pub use storage::{ExpenseStore, StorageError};
