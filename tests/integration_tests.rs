use std::{io::Cursor, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use time::Date;
use tower::ServiceExt;

use spendlog::commands::migrate_between;
use spendlog::rest::{router, AppState};
use spendlog::storage::{ExpenseStore, InMemoryStorage, SqliteStorage, StorageError};
use spendlog_core::{parse_date, ExpenseRecord, NewExpense, SummaryRow};

fn memory_app() -> Router {
    router(AppState::new(Arc::new(InMemoryStorage::new()), None))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            request = request.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

/// Every call fails as if the database were unreachable.
struct DownStore;

impl ExpenseStore for DownStore {
    fn backend_name(&self) -> &'static str {
        "down"
    }
    fn fetch_for_date(&self, _: Date) -> Result<Vec<ExpenseRecord>, StorageError> {
        Err(StorageError::Connection("refused".into()))
    }
    fn delete_for_date(&self, _: Date) -> Result<(), StorageError> {
        Err(StorageError::Connection("refused".into()))
    }
    fn insert(&self, _: Date, _: Decimal, _: &str, _: &str) -> Result<(), StorageError> {
        Err(StorageError::Connection("refused".into()))
    }
    fn summary(&self, _: Date, _: Date) -> Result<Vec<SummaryRow>, StorageError> {
        Err(StorageError::Connection("refused".into()))
    }
    fn fetch_all(&self) -> Result<Vec<ExpenseRecord>, StorageError> {
        Err(StorageError::Connection("refused".into()))
    }
    fn import(&self, _: &ExpenseRecord) -> Result<(), StorageError> {
        Err(StorageError::Connection("refused".into()))
    }
    fn count(&self) -> Result<u64, StorageError> {
        Err(StorageError::Connection("refused".into()))
    }
}

#[tokio::test]
async fn test_root_and_health() {
    let app = memory_app();
    let (status, body) = send(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Expense Tracking API");

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn test_untouched_day_is_empty_list() {
    let (status, body) = send(&memory_app(), "GET", "/expenses/2024-08-01", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_post_drops_zero_amounts() {
    let app = memory_app();
    let (status, body) = send(
        &app,
        "POST",
        "/expenses/2024-08-01",
        Some(json!([
            {"amount": 100, "category": "Rent", "notes": ""},
            {"amount": 0, "category": "Food", "notes": "skip"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Expenses updated successfully"}));

    let (status, body) = send(&app, "GET", "/expenses/2024-08-01", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"amount": 100.0, "category": "Rent", "notes": ""}]));
}

#[tokio::test]
async fn test_post_replaces_previous_day() {
    let app = memory_app();
    send(
        &app,
        "POST",
        "/expenses/2024-08-01",
        Some(json!([{"amount": 1, "category": "Food", "notes": "a"}, {"amount": 2, "category": "Food", "notes": "b"}])),
    )
    .await;
    send(
        &app,
        "POST",
        "/expenses/2024-08-01",
        Some(json!([{"amount": 12.5, "category": "Food", "notes": "Coffee"}])),
    )
    .await;

    let (_, body) = send(&app, "GET", "/expenses/2024-08-01", None).await;
    assert_eq!(body, json!([{"amount": 12.5, "category": "Food", "notes": "Coffee"}]));
}

#[tokio::test]
async fn test_analytics_breakdown() {
    let app = memory_app();
    send(
        &app,
        "POST",
        "/expenses/2024-08-01",
        Some(json!([{"amount": 40, "category": "Food", "notes": ""}])),
    )
    .await;
    send(
        &app,
        "POST",
        "/expenses/2024-08-15",
        Some(json!([{"amount": 60, "category": "Shopping", "notes": ""}])),
    )
    .await;

    let range = json!({"start_date": "2024-08-01", "end_date": "2024-08-31"});
    let (status, body) = send(&app, "POST", "/analytics/", Some(range.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "Food": {"total": 40.0, "percentage": 40.0},
            "Shopping": {"total": 60.0, "percentage": 60.0}
        })
    );

    let (status, alias) = send(&app, "POST", "/analytics", Some(range)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alias, body);

    let (_, empty) = send(
        &app,
        "POST",
        "/analytics/",
        Some(json!({"start_date": "2023-01-01", "end_date": "2023-01-31"})),
    )
    .await;
    assert_eq!(empty, json!({}));
}

#[tokio::test]
async fn test_bad_input_is_422() {
    let app = memory_app();
    let (status, body) = send(&app, "GET", "/expenses/not-a-date", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("not-a-date"));

    let (status, body) = send(&app, "POST", "/expenses/2024-08-01", Some(json!({"amount": 1}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_storage_failure_is_500() {
    let app = router(AppState::new(Arc::new(DownStore), None));

    let (status, body) = send(&app, "GET", "/expenses/2024-08-01", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());

    let range = json!({"start_date": "2024-08-01", "end_date": "2024-08-31"});
    let (status, _) = send(&app, "POST", "/analytics/", Some(range)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_metrics_disabled_is_404() {
    let (status, _) = send(&memory_app(), "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sqlite_backed_api_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("expenses.db");

    let app = router(AppState::new(Arc::new(SqliteStorage::open(&path)), None));
    send(
        &app,
        "POST",
        "/expenses/2024-08-01",
        Some(json!([{"amount": 12.5, "category": "Food", "notes": "Coffee"}])),
    )
    .await;

    // A fresh store over the same file sees the write.
    let reopened = router(AppState::new(Arc::new(SqliteStorage::open(&path)), None));
    let (status, body) = send(&reopened, "GET", "/expenses/2024-08-01", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"amount": 12.5, "category": "Food", "notes": "Coffee"}]));
}

#[test]
fn test_migrate_memory_to_sqlite() {
    let source = InMemoryStorage::new();
    source
        .replace_day(
            parse_date("2024-08-01").unwrap(),
            &[NewExpense::new(dec!(12.5), "Food", "Coffee"), NewExpense::new(dec!(100), "Rent", "")],
        )
        .unwrap();
    source
        .replace_day(parse_date("2024-08-02").unwrap(), &[NewExpense::new(dec!(7), "Other", "")])
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let target = SqliteStorage::open(dir.path().join("migrated.db"));

    let mut input = Cursor::new(b"yes\n".to_vec());
    let mut output = Vec::new();
    migrate_between(&source, &target, false, &mut input, &mut output).unwrap();
    let output = String::from_utf8(output).unwrap();

    assert!(output.contains("Migrated 3 expenses"));
    assert!(output.contains("Counts match."));
    assert_eq!(target.count().unwrap(), 3);

    let day = target.fetch_for_date(parse_date("2024-08-01").unwrap()).unwrap();
    assert_eq!(day.len(), 2);
    assert_eq!(day[0].amount, dec!(12.5));
    assert_eq!(day[0].notes, "Coffee");
}

#[test]
fn test_migrate_cancelled_without_yes() {
    let source = InMemoryStorage::new();
    source
        .insert(parse_date("2024-08-01").unwrap(), dec!(5), "Food", "")
        .unwrap();
    let target = InMemoryStorage::new();

    let mut input = Cursor::new(b"no\n".to_vec());
    let mut output = Vec::new();
    migrate_between(&source, &target, false, &mut input, &mut output).unwrap();

    assert!(String::from_utf8(output).unwrap().contains("Migration cancelled."));
    assert_eq!(target.count().unwrap(), 0);
}

#[test]
fn test_migrate_empty_source() {
    let mut output = Vec::new();
    migrate_between(
        &InMemoryStorage::new(),
        &InMemoryStorage::new(),
        true,
        &mut Cursor::new(Vec::new()),
        &mut output,
    )
    .unwrap();
    assert!(String::from_utf8(output).unwrap().contains("No expenses to migrate."));
}
