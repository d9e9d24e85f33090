// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Low-level HTTP client for the document database's Data API.
//!
//! Every call is a POST to `{base}/action/{name}` carrying the database
//! and collection names plus action-specific fields. Connectivity loss
//! and server errors get bounded retry with exponential backoff before
//! surfacing as `StorageUnavailable`; a failed write always propagates,
//! never a false success.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use tracing::{debug, warn};

use taskloom_core::TaskloomError;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 250;

/// Storage calls carry a single-digit-seconds timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded shared connection pool across all requests for this process.
const POOL_MAX_IDLE: usize = 10;

/// HTTP client for one remote database deployment.
#[derive(Debug, Clone)]
pub struct DataApiClient {
    client: reqwest::Client,
    base_url: String,
    database: String,
}

impl DataApiClient {
    pub fn new(base_url: &str, database: &str, api_key: &str) -> Result<Self, TaskloomError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| TaskloomError::Config(format!("invalid data API key: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE)
            .build()
            .map_err(|e| TaskloomError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            database: database.to_string(),
        })
    }

    /// Execute one Data API action with bounded retry on transient failures.
    async fn action(
        &self,
        action: &str,
        collection: &str,
        extra: Value,
    ) -> Result<Value, TaskloomError> {
        let url = format!("{}/action/{action}", self.base_url);
        let mut body = json!({
            "database": self.database,
            "collection": collection,
        });
        if let (Some(base), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }

        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                let delay = BACKOFF_BASE_MS * (1u64 << (attempt - 2));
                warn!(action, attempt, delay_ms = delay, "retrying data API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = match self.client.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("data API request failed: {e}");
                    continue;
                }
            };

            let status = response.status();
            debug!(action, status = %status, attempt, "data API response");

            if status.is_success() {
                return response.json().await.map_err(|e| TaskloomError::Storage {
                    source: format!("failed to parse data API response: {e}").into(),
                });
            }

            let text = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                last_error = format!("data API returned {status}: {text}");
                continue;
            }

            // Client errors are structural, not transient.
            return Err(TaskloomError::Storage {
                source: format!("data API returned {status}: {text}").into(),
            });
        }

        Err(TaskloomError::StorageUnavailable {
            message: last_error,
        })
    }

    pub async fn find_one(
        &self,
        collection: &str,
        filter: Value,
    ) -> Result<Option<Value>, TaskloomError> {
        let result = self
            .action("findOne", collection, json!({ "filter": filter }))
            .await?;
        match result.get("document") {
            Some(Value::Null) | None => Ok(None),
            Some(doc) => Ok(Some(doc.clone())),
        }
    }

    pub async fn find(
        &self,
        collection: &str,
        filter: Value,
        sort: Value,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>, TaskloomError> {
        let result = self
            .action(
                "find",
                collection,
                json!({ "filter": filter, "sort": sort, "skip": skip, "limit": limit }),
            )
            .await?;
        Ok(documents(result))
    }

    pub async fn insert_one(&self, collection: &str, document: Value) -> Result<(), TaskloomError> {
        self.action("insertOne", collection, json!({ "document": document }))
            .await?;
        Ok(())
    }

    /// Returns the number of matched documents (before any upsert insert).
    pub async fn update_one(
        &self,
        collection: &str,
        filter: Value,
        update: Value,
        upsert: bool,
    ) -> Result<u64, TaskloomError> {
        let result = self
            .action(
                "updateOne",
                collection,
                json!({ "filter": filter, "update": update, "upsert": upsert }),
            )
            .await?;
        Ok(result
            .get("matchedCount")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    /// Returns the number of deleted documents.
    pub async fn delete_many(
        &self,
        collection: &str,
        filter: Value,
    ) -> Result<u64, TaskloomError> {
        let result = self
            .action("deleteMany", collection, json!({ "filter": filter }))
            .await?;
        Ok(result
            .get("deletedCount")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    pub async fn aggregate(
        &self,
        collection: &str,
        pipeline: Value,
    ) -> Result<Vec<Value>, TaskloomError> {
        let result = self
            .action("aggregate", collection, json!({ "pipeline": pipeline }))
            .await?;
        Ok(documents(result))
    }
}

fn documents(result: Value) -> Vec<Value> {
    match result.get("documents") {
        Some(Value::Array(docs)) => docs.clone(),
        _ => Vec::new(),
    }
}
