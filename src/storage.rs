use std::sync::Arc;

// Re-export core storage types so callers only need crate::storage::*
pub use spendlog_core::storage::{ExpenseStore, StorageError};
pub use spendlog_memory::InMemoryStorage;
pub use spendlog_mysql::{MySqlSettings, MySqlStorage};
pub use spendlog_sqlite::SqliteStorage;

use crate::config::{BackendKind, DatabaseConfig, Environment, SecretsFile};

/// Builds the backend named by `kind`. File and network stores make no
/// connection here; `sqlite_path = ":memory:"` opens its one shared connection.
pub fn open_backend(kind: BackendKind, config: &DatabaseConfig) -> Result<Arc<dyn ExpenseStore>, StorageError> {
    let store: Arc<dyn ExpenseStore> = match kind {
        BackendKind::Sqlite => {
            let path = config.sqlite_path();
            tracing::info!(path = %path.display(), "Using SQLite backend");
            Arc::new(SqliteStorage::new(&path.to_string_lossy())?)
        }
        BackendKind::Mysql => {
            let secrets = SecretsFile::load(&config.secrets_file);
            let settings = config.mysql_settings(&[&secrets, &Environment]);
            tracing::info!(host = %settings.host, port = settings.port, database = %settings.database, "Using MySQL backend");
            Arc::new(MySqlStorage::new(settings))
        }
        BackendKind::Memory => {
            tracing::info!("Using in-memory backend; nothing will be persisted");
            Arc::new(InMemoryStorage::new())
        }
    };
    Ok(store)
}
