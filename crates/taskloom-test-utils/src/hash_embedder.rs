// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedding providers for tests.

use async_trait::async_trait;

use taskloom_core::error::TaskloomError;
use taskloom_core::traits::EmbeddingProvider;
use taskloom_core::types::EmbeddingResult;

/// Bag-of-words hashing embedder.
///
/// Each whitespace token bumps one dimension chosen by FNV-1a, then the
/// vector is L2-normalized. Identical text embeds identically (cosine
/// 1.0); texts sharing tokens land near each other. Any dimensionality,
/// so it stands in for both the 384-dim and 1024-dim providers.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text.split_whitespace() {
            let slot = (fnv1a(token.as_bytes()) as usize) % self.dims;
            vector[slot] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>, TaskloomError> {
        Ok(texts
            .iter()
            .map(|t| EmbeddingResult::Embedded(self.embed_text(t)))
            .collect())
    }
}

/// Provider that always reports an outage, for degradation tests.
pub struct FailingEmbedder {
    dims: usize,
}

impl FailingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<EmbeddingResult>, TaskloomError> {
        Err(TaskloomError::EmbeddingUnavailable {
            message: "injected provider outage".to_string(),
        })
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
