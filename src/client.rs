//! Talks to a running `spendlog serve` instead of a local store.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde_json::Value;
use spendlog_core::NewExpense;

use crate::{analytics::Breakdown, error::AppError, rest::DateRange};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(remote_err)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn fetch_day(&self, date: &str) -> Result<Vec<NewExpense>, AppError> {
        let response = self
            .client
            .get(format!("{}/expenses/{}", self.base_url, date))
            .send()
            .map_err(remote_err)?;
        check(response)?.json().map_err(remote_err)
    }

    pub fn replace_day(&self, date: &str, entries: &[NewExpense]) -> Result<(), AppError> {
        let response = self
            .client
            .post(format!("{}/expenses/{}", self.base_url, date))
            .json(entries)
            .send()
            .map_err(remote_err)?;
        check(response)?;
        Ok(())
    }

    pub fn analytics(&self, start: &str, end: &str) -> Result<Breakdown, AppError> {
        let range = DateRange {
            start_date: start.to_string(),
            end_date: end.to_string(),
        };
        let response = self
            .client
            .post(format!("{}/analytics/", self.base_url))
            .json(&range)
            .send()
            .map_err(remote_err)?;
        check(response)?.json().map_err(remote_err)
    }
}

// Surfaces the server's `detail` field when it sent one.
fn check(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response
        .json::<Value>()
        .ok()
        .and_then(|body| body.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    Err(AppError::Remote(format!("{} ({})", detail, status)))
}

fn remote_err(e: reqwest::Error) -> AppError {
    AppError::Remote(e.to_string())
}
