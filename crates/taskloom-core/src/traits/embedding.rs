// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider trait for vector generation.

use async_trait::async_trait;

use crate::error::TaskloomError;
use crate::types::EmbeddingResult;

/// Turns text into fixed-length vectors.
///
/// Implementations are stateless beyond their model/connection handles and
/// return one [`EmbeddingResult`] per input, same length and order. A
/// provider-wide outage (retries exhausted) surfaces as
/// [`TaskloomError::EmbeddingUnavailable`]; a single malformed item becomes
/// a `Failed` entry without aborting the rest of the batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Fixed output dimensionality of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>, TaskloomError>;
}
