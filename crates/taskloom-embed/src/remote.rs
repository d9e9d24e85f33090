// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hosted embedding API provider, 1024-dim.
//!
//! Batches requests under the API's per-call cap, retries transient
//! failures with exponential backoff, honors rate-limit hints, and marks
//! individual malformed items as embedding-failed instead of aborting
//! the rest of the batch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use taskloom_core::error::TaskloomError;
use taskloom_core::traits::EmbeddingProvider;
use taskloom_core::types::{EmbeddingResult, REMOTE_EMBEDDING_DIM};

/// Hard cap on texts per API call.
const MAX_BATCH_TEXTS: usize = 100;

/// Transient-failure attempts per chunk (network error or 5xx).
const MAX_ATTEMPTS: u32 = 3;

/// Additional sleep-and-retry allowance for rate-limit responses.
const MAX_RATE_LIMIT_WAITS: u32 = 3;

const BACKOFF_BASE_MS: u64 = 500;

/// Request timeout; embedding batches are allowed tens of seconds.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Option<Vec<f32>>,
}

/// Client for the hosted embedding API.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl RemoteEmbedder {
    /// Creates a new remote embedder.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, TaskloomError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| TaskloomError::Config(format!("invalid embedding API key: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TaskloomError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Embed one chunk (≤ MAX_BATCH_TEXTS) with retry and rate-limit handling.
    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>, TaskloomError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut attempts = 0u32;
        let mut rate_limit_waits = 0u32;
        let mut last_error = String::new();

        loop {
            let response = match self.client.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    attempts += 1;
                    last_error = format!("HTTP request failed: {e}");
                    if attempts >= MAX_ATTEMPTS {
                        break;
                    }
                    let delay = BACKOFF_BASE_MS * (1u64 << (attempts - 1));
                    warn!(attempts, delay_ms = delay, "embedding request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    continue;
                }
            };

            let status = response.status();
            debug!(status = %status, "embedding response received");

            if status == StatusCode::TOO_MANY_REQUESTS {
                rate_limit_waits += 1;
                if rate_limit_waits > MAX_RATE_LIMIT_WAITS {
                    last_error = "rate limit persisted after retries".to_string();
                    break;
                }
                let delay = retry_after_hint(&response)
                    .unwrap_or(Duration::from_millis(BACKOFF_BASE_MS * u64::from(rate_limit_waits)));
                warn!(wait = ?delay, "embedding API rate limited, sleeping");
                tokio::time::sleep(delay).await;
                continue;
            }

            if status.is_server_error() {
                attempts += 1;
                let text = response.text().await.unwrap_or_default();
                last_error = format!("API returned {status}: {}", truncate(&text, 200));
                if attempts >= MAX_ATTEMPTS {
                    break;
                }
                let delay = BACKOFF_BASE_MS * (1u64 << (attempts - 1));
                warn!(attempts, delay_ms = delay, "embedding API server error, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                continue;
            }

            if !status.is_success() {
                // Client errors are not retryable.
                let text = response.text().await.unwrap_or_default();
                return Err(TaskloomError::EmbeddingUnavailable {
                    message: format!("API returned {status}: {}", truncate(&text, 200)),
                });
            }

            let parsed: EmbeddingResponse =
                response.json().await.map_err(|e| TaskloomError::EmbeddingUnavailable {
                    message: format!("failed to parse embedding response: {e}"),
                })?;

            return Ok(assemble_results(texts.len(), parsed));
        }

        Err(TaskloomError::EmbeddingUnavailable {
            message: last_error,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    fn name(&self) -> &str {
        "remote-api"
    }

    fn dimensions(&self) -> usize {
        REMOTE_EMBEDDING_DIM
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>, TaskloomError> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_TEXTS) {
            results.extend(self.embed_chunk(chunk).await?);
        }
        Ok(results)
    }
}

/// Match response items back to input slots by index.
///
/// A missing slot, null embedding, or wrong dimensionality becomes a
/// `Failed` marker for that item only.
fn assemble_results(input_len: usize, response: EmbeddingResponse) -> Vec<EmbeddingResult> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; input_len];
    for item in response.data {
        if item.index < input_len {
            if let Some(vector) = item.embedding {
                slots[item.index] = Some(vector);
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| match slot {
            Some(vector) if vector.len() == REMOTE_EMBEDDING_DIM => {
                EmbeddingResult::Embedded(vector)
            }
            Some(vector) => EmbeddingResult::Failed {
                reason: format!(
                    "provider returned {}-dim vector, expected {REMOTE_EMBEDDING_DIM}",
                    vector.len()
                ),
            },
            None => EmbeddingResult::Failed {
                reason: "provider returned no embedding for this item".to_string(),
            },
        })
        .collect()
}

/// Parse a `Retry-After` seconds hint if present.
fn retry_after_hint(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Responds with one correct-dimension embedding per input text.
    struct EchoEmbeddings;

    impl Respond for EchoEmbeddings {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
            let data: Vec<serde_json::Value> = (0..count)
                .map(|i| {
                    let mut vector = vec![0.0f32; REMOTE_EMBEDDING_DIM];
                    vector[i % REMOTE_EMBEDDING_DIM] = 1.0;
                    serde_json::json!({ "index": i, "embedding": vector })
                })
                .collect();
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": data }))
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {i}")).collect()
    }

    fn make_vector(hot: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; REMOTE_EMBEDDING_DIM];
        v[hot] = 1.0;
        v
    }

    #[tokio::test]
    async fn batch_success_preserves_input_order() {
        let server = MockServer::start().await;
        // Response items deliberately out of order; index field wins.
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "index": 1, "embedding": make_vector(1) },
                    { "index": 0, "embedding": make_vector(0) },
                ]
            })))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&server.uri(), "key", "embed-large-v3").unwrap();
        let results = embedder.embed(&texts(2)).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].vector().unwrap()[0], 1.0);
        assert_eq!(results[1].vector().unwrap()[1], 1.0);
    }

    #[tokio::test]
    async fn missing_item_marked_failed_without_aborting_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "index": 0, "embedding": make_vector(0) },
                    { "index": 1, "embedding": null },
                    { "index": 2, "embedding": make_vector(2) },
                ]
            })))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&server.uri(), "key", "embed-large-v3").unwrap();
        let results = embedder.embed(&texts(3)).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_failed());
        assert!(results[1].is_failed());
        assert!(!results[2].is_failed());
    }

    #[tokio::test]
    async fn wrong_dimension_marked_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "index": 0, "embedding": [0.1, 0.2, 0.3] } ]
            })))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&server.uri(), "key", "embed-large-v3").unwrap();
        let results = embedder.embed(&texts(1)).await.unwrap();
        assert!(results[0].is_failed());
    }

    #[tokio::test]
    async fn rate_limit_sleeps_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "0"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(EchoEmbeddings)
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&server.uri(), "key", "embed-large-v3").unwrap();
        let results = embedder.embed(&texts(2)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.is_failed()));
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&server.uri(), "key", "embed-large-v3").unwrap();
        let err = embedder.embed(&texts(1)).await.unwrap_err();
        assert!(matches!(err, TaskloomError::EmbeddingUnavailable { .. }));
    }

    #[tokio::test]
    async fn client_error_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&server.uri(), "key", "embed-large-v3").unwrap();
        let err = embedder.embed(&texts(1)).await.unwrap_err();
        assert!(matches!(err, TaskloomError::EmbeddingUnavailable { .. }));
    }

    #[tokio::test]
    async fn large_input_is_chunked_under_batch_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(EchoEmbeddings)
            .expect(2)
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&server.uri(), "key", "embed-large-v3").unwrap();
        let results = embedder.embed(&texts(150)).await.unwrap();
        assert_eq!(results.len(), 150);
    }
}
