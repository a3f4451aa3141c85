//! HTTP/JSON data provider
//!
//! `POST {base_url}/{component}` with `{"subject_key", "existing"}`, expecting
//! `[{"subject_key", "payload"}, ...]` back. Failures are classified here so
//! the retry policy never has to look at HTTP details.

use async_trait::async_trait;
use freshness_core::port::{DataProvider, DerivedRecord, FetchRequest, ProviderError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct FetchBody<'a> {
    subject_key: &'a str,
    existing: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RecordBody {
    subject_key: String,
    payload: serde_json::Value,
}

pub struct HttpJsonProvider {
    client: Client,
    base_url: String,
}

impl HttpJsonProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("freshness-scheduler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Permanent(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Rate limits and upstream 5xx are worth retrying; other non-success codes are not
fn classify_status(status: StatusCode) -> Option<ProviderError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Some(ProviderError::Transient(format!("upstream returned {}", status)))
    } else {
        Some(ProviderError::Permanent(format!("upstream returned {}", status)))
    }
}

fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::Permanent(err.to_string())
    }
}

#[async_trait]
impl DataProvider for HttpJsonProvider {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<DerivedRecord>, ProviderError> {
        let url = format!("{}/{}", self.base_url, request.component);
        let body = FetchBody {
            subject_key: &request.subject_key,
            existing: request.existing.as_ref().map(|r| &r.payload),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let records: Vec<RecordBody> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Transient(e.to_string())
            } else {
                ProviderError::Permanent(format!("malformed response: {}", e))
            }
        })?;

        debug!(
            component = %request.component,
            subject_key = %request.subject_key,
            records = records.len(),
            "Provider fetch done"
        );

        Ok(records
            .into_iter()
            .map(|r| DerivedRecord::new(r.subject_key, request.component, r.payload))
            .collect())
    }
}
