use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("remote API error: {0}")]
    Remote(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Text shown to a person at a terminal, with a hint on how to fix it where
    /// one exists.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Storage(e) if e.is_connection() => format!(
                "Could not connect to the expense database.\n\
                 \n\
                 To fix it:\n\
                 \x20 1. Set DB_HOST, DB_USER, DB_PASSWORD, DB_NAME and DB_PORT in the secrets file\n\
                 \x20    named by `secrets_file` under [database] (default .spendlog/secrets.toml),\n\
                 \x20    or export them as environment variables.\n\
                 \x20 2. Make sure the MySQL server is running and reachable on that port.\n\
                 \x20 3. For a local setup without a server, use `--backend sqlite`.\n\
                 \n\
                 Error details: {}",
                e
            ),
            AppError::Storage(StorageError::InvalidDate(d)) => {
                format!("'{}' is not a valid date. Use the YYYY-MM-DD format, e.g. 2024-08-01.", d)
            }
            AppError::Storage(e) => format!("The expense database rejected the request: {}", e),
            AppError::Remote(e) => format!(
                "Error connecting to API: {}\nCheck that `spendlog serve` is running at the given URL.",
                e
            ),
            other => other.to_string(),
        }
    }
}
