//! Networked backend on MySQL.
//!
//! There is no pool: each operation dials the server, runs its statements and
//! drops the connection. Only establishing the connection has a timeout.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use mysql::{prelude::Queryable, Conn, OptsBuilder, TxOpts};
use rust_decimal::Decimal;
use time::Date;

use spendlog_core::{
    format_date, format_timestamp, parse_amount, parse_date, parse_timestamp, round_amount,
    ExpenseRecord, ExpenseStore, NewExpense, StorageError, SummaryRow,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS expenses (
        id INT AUTO_INCREMENT PRIMARY KEY,
        expense_date DATE NOT NULL,
        amount DECIMAL(10, 2) NOT NULL,
        category VARCHAR(100) NOT NULL,
        notes TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
";

const SELECT_COLUMNS: &str = "SELECT id, DATE_FORMAT(expense_date, '%Y-%m-%d'), CAST(amount AS CHAR), \
     category, notes, DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s') FROM expenses";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlSettings {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl Default for MySqlSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: "root".to_string(),
            password: String::new(),
            database: "expense_manager".to_string(),
            port: 3306,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl MySqlSettings {
    pub fn opts(&self) -> OptsBuilder {
        OptsBuilder::new()
            .ip_or_hostname(Some(self.host.clone()))
            .tcp_port(self.port)
            .user(Some(self.user.clone()))
            .pass(Some(self.password.clone()))
            .db_name(Some(self.database.clone()))
            .tcp_connect_timeout(Some(self.connect_timeout))
    }
}

pub struct MySqlStorage {
    settings: MySqlSettings,
    schema_ready: AtomicBool,
}

impl MySqlStorage {
    /// Does not dial the server; the first operation does.
    pub fn new(settings: MySqlSettings) -> Self {
        Self {
            settings,
            schema_ready: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &MySqlSettings {
        &self.settings
    }

    /// Runs `f` against a fresh connection that is dropped when `f` returns.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Conn) -> Result<T, StorageError>) -> Result<T, StorageError> {
        let mut conn = Conn::new(self.settings.opts()).map_err(|e| {
            StorageError::Connection(format!(
                "MySQL connection to {}:{} failed: {}",
                self.settings.host, self.settings.port, e
            ))
        })?;

        if !self.schema_ready.load(Ordering::Acquire) {
            conn.query_drop(SCHEMA).map_err(query_err)?;
            self.schema_ready.store(true, Ordering::Release);
            tracing::debug!(host = %self.settings.host, "MySQL schema ensured");
        }

        f(&mut conn)
    }
}

fn query_err(e: mysql::Error) -> StorageError {
    match e {
        mysql::Error::IoError(_) => StorageError::Connection(e.to_string()),
        _ => StorageError::Query(e.to_string()),
    }
}

type RawRecord = (i64, String, String, String, Option<String>, Option<String>);

fn to_record((id, date, amount, category, notes, created_at): RawRecord) -> Result<ExpenseRecord, StorageError> {
    let created_at = created_at
        .ok_or_else(|| StorageError::Query(format!("expense {} has no created_at", id)))?;
    Ok(ExpenseRecord {
        id,
        expense_date: parse_date(&date)?,
        amount: parse_amount(&amount)?,
        category,
        notes: notes.unwrap_or_default(),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn insert_row<Q: Queryable>(q: &mut Q, date: Date, amount: Decimal, category: &str, notes: &str) -> Result<(), StorageError> {
    q.exec_drop(
        "INSERT INTO expenses (expense_date, amount, category, notes) VALUES (?, ?, ?, ?)",
        (format_date(date), round_amount(amount).to_string(), category, notes),
    )
    .map_err(query_err)
}

impl ExpenseStore for MySqlStorage {
    fn backend_name(&self) -> &'static str {
        "mysql"
    }

    fn fetch_for_date(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError> {
        tracing::debug!(%date, "MySQL fetch_for_date");
        self.with_conn(|conn| {
            let rows: Vec<RawRecord> = conn
                .exec(
                    format!("{} WHERE expense_date = ? ORDER BY id", SELECT_COLUMNS),
                    (format_date(date),),
                )
                .map_err(query_err)?;
            rows.into_iter().map(to_record).collect()
        })
    }

    fn delete_for_date(&self, date: Date) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.exec_drop("DELETE FROM expenses WHERE expense_date = ?", (format_date(date),))
                .map_err(query_err)?;
            tracing::debug!(%date, removed = conn.affected_rows(), "MySQL delete_for_date");
            Ok(())
        })
    }

    fn insert(&self, date: Date, amount: Decimal, category: &str, notes: &str) -> Result<(), StorageError> {
        tracing::debug!(%date, %amount, category, "MySQL insert");
        self.with_conn(|conn| insert_row(conn, date, amount, category, notes))
    }

    fn summary(&self, start: Date, end: Date) -> Result<Vec<SummaryRow>, StorageError> {
        tracing::debug!(%start, %end, "MySQL summary");
        self.with_conn(|conn| {
            let rows: Vec<(String, String)> = conn
                .exec(
                    "SELECT category, CAST(SUM(amount) AS CHAR)
                     FROM expenses
                     WHERE expense_date BETWEEN ? AND ?
                     GROUP BY category
                     ORDER BY category",
                    (format_date(start), format_date(end)),
                )
                .map_err(query_err)?;
            rows.into_iter()
                .map(|(category, total)| Ok(SummaryRow::new(category, parse_amount(&total)?)))
                .collect()
        })
    }

    fn replace_day(&self, date: Date, entries: &[NewExpense]) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            let mut tx = conn.start_transaction(TxOpts::default()).map_err(query_err)?;
            tx.exec_drop("DELETE FROM expenses WHERE expense_date = ?", (format_date(date),))
                .map_err(query_err)?;
            for entry in entries {
                insert_row(&mut tx, date, entry.amount, &entry.category, &entry.notes)?;
            }
            // Dropping an uncommitted transaction rolls it back
            tx.commit().map_err(query_err)?;
            tracing::debug!(%date, inserted = entries.len(), "MySQL day replaced");
            Ok(())
        })
    }

    fn fetch_all(&self) -> Result<Vec<ExpenseRecord>, StorageError> {
        self.with_conn(|conn| {
            let rows: Vec<RawRecord> = conn
                .query(format!("{} ORDER BY created_at, id", SELECT_COLUMNS))
                .map_err(query_err)?;
            rows.into_iter().map(to_record).collect()
        })
    }

    fn fetch_first(&self, limit: usize) -> Result<Vec<ExpenseRecord>, StorageError> {
        self.with_conn(|conn| {
            let rows: Vec<RawRecord> = conn
                .exec(
                    format!("{} ORDER BY created_at, id LIMIT ?", SELECT_COLUMNS),
                    (limit as u64,),
                )
                .map_err(query_err)?;
            rows.into_iter().map(to_record).collect()
        })
    }

    fn import(&self, record: &ExpenseRecord) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.exec_drop(
                "INSERT INTO expenses (expense_date, amount, category, notes, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                (
                    format_date(record.expense_date),
                    round_amount(record.amount).to_string(),
                    record.category.as_str(),
                    record.notes.as_str(),
                    format_timestamp(record.created_at),
                ),
            )
            .map_err(query_err)
        })
    }

    fn count(&self) -> Result<u64, StorageError> {
        self.with_conn(|conn| {
            let n: Option<u64> = conn.query_first("SELECT COUNT(*) FROM expenses").map_err(query_err)?;
            Ok(n.unwrap_or(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql::Opts;
    use rust_decimal_macros::dec;
    use time::Month;

    #[test]
    fn test_default_settings() {
        let settings = MySqlSettings::default();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.user, "root");
        assert_eq!(settings.password, "");
        assert_eq!(settings.database, "expense_manager");
        assert_eq!(settings.port, 3306);

        let opts: Opts = settings.opts().into();
        assert_eq!(opts.get_tcp_port(), 3306);
        assert_eq!(opts.get_db_name(), Some("expense_manager"));
    }

    #[test]
    fn test_unreachable_server_is_connection_error() {
        let storage = MySqlStorage::new(MySqlSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: Duration::from_millis(500),
            ..MySqlSettings::default()
        });
        let day = Date::from_calendar_date(2024, Month::August, 1).unwrap();
        let err = storage.fetch_for_date(day).unwrap_err();
        assert!(err.is_connection(), "unexpected error: {err:?}");
    }

    /// Runs against a live server when `SPENDLOG_TEST_MYSQL_HOST` is set.
    #[test]
    fn test_mysql_round_trip() {
        let Ok(host) = std::env::var("SPENDLOG_TEST_MYSQL_HOST") else {
            return;
        };
        let settings = MySqlSettings {
            host,
            user: std::env::var("SPENDLOG_TEST_MYSQL_USER").unwrap_or_else(|_| "root".to_string()),
            password: std::env::var("SPENDLOG_TEST_MYSQL_PASSWORD").unwrap_or_default(),
            database: std::env::var("SPENDLOG_TEST_MYSQL_DB").unwrap_or_else(|_| "expense_manager_test".to_string()),
            ..MySqlSettings::default()
        };
        let storage = MySqlStorage::new(settings);
        let day = Date::from_calendar_date(1999, Month::January, 2).unwrap();

        storage.replace_day(day, &[NewExpense::new(dec!(12.5), "Food", "Coffee")]).unwrap();
        let found = storage.fetch_for_date(day).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].amount, dec!(12.50));
        assert_eq!(found[0].notes, "Coffee");

        let rows = storage.summary(day, day).unwrap();
        assert_eq!(rows, vec![SummaryRow::new("Food", dec!(12.50))]);

        storage.delete_for_date(day).unwrap();
        storage.delete_for_date(day).unwrap();
        assert!(storage.fetch_for_date(day).unwrap().is_empty());
    }
}
