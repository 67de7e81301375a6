//! File-based backend on SQLite.
//!
//! Every operation opens the database file, runs its statements and closes the
//! handle again. `":memory:"` keeps a single shared connection instead, since an
//! in-memory database does not outlive its connection.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use time::Date;

use spendlog_core::{
    format_date, format_timestamp, parse_amount, parse_date, parse_timestamp, round_amount,
    ExpenseRecord, ExpenseStore, NewExpense, StorageError, SummaryRow,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS expenses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        expense_date DATE NOT NULL,
        amount NUMERIC(10, 2) NOT NULL,
        category TEXT NOT NULL,
        notes TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_expenses_date
        ON expenses(expense_date);
";

const SELECT_COLUMNS: &str =
    "SELECT id, expense_date, CAST(amount AS TEXT), category, notes, created_at FROM expenses";

enum Source {
    File(PathBuf),
    Memory(Mutex<Connection>),
}

pub struct SqliteStorage {
    source: Source,
    schema_ready: AtomicBool,
}

impl SqliteStorage {
    /// Opens a store at `path`, or a private in-memory database for `":memory:"`.
    ///
    /// File stores do not touch the disk until the first operation.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        if path == ":memory:" {
            let conn = Connection::open_in_memory().map_err(connection_err)?;
            conn.execute_batch(SCHEMA).map_err(query_err)?;
            return Ok(Self {
                source: Source::Memory(Mutex::new(conn)),
                schema_ready: AtomicBool::new(true),
            });
        }
        Ok(Self::open(path))
    }

    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            source: Source::File(path.as_ref().to_path_buf()),
            schema_ready: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Memory(_) => None,
        }
    }

    /// Runs `f` against a connection that is released when `f` returns.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T, StorageError>) -> Result<T, StorageError> {
        match &self.source {
            Source::File(path) => {
                let mut conn = open_file(path)?;
                if !self.schema_ready.load(Ordering::Acquire) {
                    conn.execute_batch(SCHEMA).map_err(query_err)?;
                    self.schema_ready.store(true, Ordering::Release);
                    tracing::debug!(path = %path.display(), "SQLite schema ensured");
                }
                f(&mut conn)
            }
            Source::Memory(conn) => {
                let mut conn = conn
                    .lock()
                    .map_err(|_| StorageError::Other("SQLite connection lock poisoned".to_string()))?;
                f(&mut conn)
            }
        }
    }
}

fn open_file(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).map_err(connection_err)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(connection_err)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(connection_err)?;
    Ok(conn)
}

fn connection_err(e: rusqlite::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn query_err(e: rusqlite::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

type RawRecord = (i64, String, String, String, Option<String>, Option<String>);

fn raw_record(row: &rusqlite::Row) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn to_record((id, date, amount, category, notes, created_at): RawRecord) -> Result<ExpenseRecord, StorageError> {
    let expense_date = parse_date(&date)?;
    let created_at = created_at
        .ok_or_else(|| StorageError::Query(format!("expense {} has no created_at", id)))?;
    Ok(ExpenseRecord {
        id,
        expense_date,
        amount: parse_amount(&amount)?,
        category,
        notes: notes.unwrap_or_default(),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn select_records(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ExpenseRecord>, StorageError> {
    let mut stmt = conn.prepare(sql).map_err(query_err)?;
    let rows = stmt
        .query_map(params, raw_record)
        .map_err(query_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(query_err)?;
    rows.into_iter().map(to_record).collect()
}

fn insert_row(conn: &Connection, date: Date, amount: Decimal, category: &str, notes: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO expenses (expense_date, amount, category, notes) VALUES (?1, ?2, ?3, ?4)",
        params![format_date(date), round_amount(amount).to_string(), category, notes],
    )
    .map_err(query_err)?;
    Ok(())
}

impl ExpenseStore for SqliteStorage {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn fetch_for_date(&self, date: Date) -> Result<Vec<ExpenseRecord>, StorageError> {
        tracing::debug!(%date, "SQLite fetch_for_date");
        self.with_conn(|conn| {
            select_records(
                conn,
                &format!("{} WHERE expense_date = ?1 ORDER BY id", SELECT_COLUMNS),
                params![format_date(date)],
            )
        })
    }

    fn delete_for_date(&self, date: Date) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM expenses WHERE expense_date = ?1", params![format_date(date)])
                .map_err(query_err)?;
            tracing::debug!(%date, removed, "SQLite delete_for_date");
            Ok(())
        })
    }

    fn insert(&self, date: Date, amount: Decimal, category: &str, notes: &str) -> Result<(), StorageError> {
        tracing::debug!(%date, %amount, category, "SQLite insert");
        self.with_conn(|conn| insert_row(conn, date, amount, category, notes))
    }

    fn summary(&self, start: Date, end: Date) -> Result<Vec<SummaryRow>, StorageError> {
        tracing::debug!(%start, %end, "SQLite summary");
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT category, CAST(SUM(amount) AS TEXT)
                     FROM expenses
                     WHERE expense_date BETWEEN ?1 AND ?2
                     GROUP BY category
                     ORDER BY category",
                )
                .map_err(query_err)?;
            let rows = stmt
                .query_map(params![format_date(start), format_date(end)], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(query_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(query_err)?;

            rows.into_iter()
                .map(|(category, total)| Ok(SummaryRow::new(category, parse_amount(&total)?)))
                .collect()
        })
    }

    fn replace_day(&self, date: Date, entries: &[NewExpense]) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(query_err)?;
            tx.execute("DELETE FROM expenses WHERE expense_date = ?1", params![format_date(date)])
                .map_err(query_err)?;
            for entry in entries {
                insert_row(&tx, date, entry.amount, &entry.category, &entry.notes)?;
            }
            tx.commit().map_err(query_err)?;
            tracing::debug!(%date, inserted = entries.len(), "SQLite day replaced");
            Ok(())
        })
    }

    fn fetch_all(&self) -> Result<Vec<ExpenseRecord>, StorageError> {
        self.with_conn(|conn| {
            select_records(conn, &format!("{} ORDER BY created_at, id", SELECT_COLUMNS), [])
        })
    }

    fn fetch_first(&self, limit: usize) -> Result<Vec<ExpenseRecord>, StorageError> {
        self.with_conn(|conn| {
            select_records(
                conn,
                &format!("{} ORDER BY created_at, id LIMIT ?1", SELECT_COLUMNS),
                params![limit as i64],
            )
        })
    }

    fn import(&self, record: &ExpenseRecord) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO expenses (expense_date, amount, category, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_date(record.expense_date),
                    round_amount(record.amount).to_string(),
                    record.category,
                    record.notes,
                    format_timestamp(record.created_at),
                ],
            )
            .map_err(query_err)?;
            Ok(())
        })
    }

    fn count(&self) -> Result<u64, StorageError> {
        self.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))
                .map_err(query_err)?;
            Ok(n as u64)
        })
    }
}
