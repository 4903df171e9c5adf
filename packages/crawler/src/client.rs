//! Throttled HTTP client for the external count endpoint.
//!
//! One request at a time per client: the throttle state is a single
//! check-then-act critical section, so the gate is held across the whole
//! request rather than left as a racy timestamp field. No retries — a
//! failed attempt is surfaced to the caller as-is.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::search_state::SearchState;

const COUNT_PATH: &str = "/api/search-jobs/get-total-count";

/// How much of an error body is kept for diagnosis.
const ERROR_BODY_LIMIT: usize = 400;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected count response shape: {0}")]
    UnexpectedShape(Value),
}

/// Client for the external job-search service's total-count endpoint.
pub struct CountClient {
    client: reqwest::Client,
    base_url: String,
    min_delay: Duration,
    /// Completion time of the last request. Guarded so concurrent tasks
    /// cannot race through the check-sleep-record sequence.
    last_request: Mutex<Option<Instant>>,
}

impl CountClient {
    pub fn new(base_url: &str, timeout: Duration, min_delay: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "application/json, text/plain, */*".parse().unwrap(),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        headers.insert(
            reqwest::header::REFERER,
            format!("{base_url}/")
                .parse()
                .context("base URL is not a valid Referer")?,
        );
        headers.insert(
            reqwest::header::ORIGIN,
            base_url
                .parse()
                .context("base URL is not a valid Origin")?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            min_delay,
            last_request: Mutex::new(None),
        })
    }

    /// POST the search state and return the raw JSON response.
    ///
    /// The minimum delay is measured from the completion of the previous
    /// request (through this client) to the start of this one.
    pub async fn get_total_count(&self, state: &SearchState) -> Result<Value, ClientError> {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }

        let url = format!("{}{}", self.base_url, COUNT_PATH);
        debug!(url = %url, "Requesting total count");
        let response = self
            .client
            .post(&url)
            .json(&json!({ "searchState": state }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        *last = Some(Instant::now());
        drop(last);

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        serde_json::from_str(&body).map_err(|_| {
            ClientError::UnexpectedShape(Value::String(truncate(&body, ERROR_BODY_LIMIT)))
        })
    }

    /// Fetch and extract the total, keeping the raw response for
    /// diagnostics.
    pub async fn fetch_total(&self, state: &SearchState) -> Result<(i64, Value), ClientError> {
        let raw = self.get_total_count(state).await?;
        let total = extract_total(&raw)?;
        Ok((total, raw))
    }
}

/// Pull the count out of a response: integer `total` preferred, integer
/// `count` accepted. Anything else is an unexpected shape.
pub fn extract_total(response: &Value) -> Result<i64, ClientError> {
    if let Some(object) = response.as_object() {
        for key in ["total", "count"] {
            if let Some(value) = object.get(key) {
                if let Some(total) = value.as_i64() {
                    return Ok(total);
                }
            }
        }
    }
    Err(ClientError::UnexpectedShape(response.clone()))
}

fn truncate(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    // Back off to a char boundary so slicing cannot panic.
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_total_field() {
        assert_eq!(extract_total(&json!({ "total": 842 })).unwrap(), 842);
    }

    #[test]
    fn falls_back_to_count_field() {
        assert_eq!(extract_total(&json!({ "count": 12 })).unwrap(), 12);
    }

    #[test]
    fn prefers_total_over_count() {
        assert_eq!(
            extract_total(&json!({ "total": 1, "count": 2 })).unwrap(),
            1
        );
    }

    #[test]
    fn rejects_non_integer_totals() {
        for payload in [
            json!({ "total": "842" }),
            json!({ "total": 84.2 }),
            json!({ "count": true }),
            json!({ "results": [] }),
            json!([1, 2, 3]),
        ] {
            let err = extract_total(&payload).unwrap_err();
            assert!(matches!(err, ClientError::UnexpectedShape(_)));
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let body = "é".repeat(300);
        let truncated = truncate(&body, 401);
        assert!(truncated.len() <= 401);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_spaces_out_consecutive_requests() {
        // Exercise the gate directly: two tasks racing through the
        // check-sleep-record sequence must come out at least min_delay
        // apart.
        let min_delay = Duration::from_millis(350);
        let gate: Mutex<Option<Instant>> = Mutex::new(None);

        let mut completions = Vec::new();
        for _ in 0..2 {
            let mut last = gate.lock().await;
            if let Some(previous) = *last {
                let elapsed = previous.elapsed();
                if elapsed < min_delay {
                    tokio::time::sleep(min_delay - elapsed).await;
                }
            }
            *last = Some(Instant::now());
            completions.push(Instant::now());
        }

        assert!(completions[1] - completions[0] >= min_delay);
    }
}
