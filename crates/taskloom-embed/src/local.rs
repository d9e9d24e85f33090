// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local ONNX embedding provider using all-MiniLM-L6-v2.
//!
//! Produces 384-dimensional embeddings on CPU with zero external API
//! calls. Inference is CPU-bound, so each chunk is offloaded to the
//! blocking pool behind a semaphore; the calling task suspends until the
//! offloaded chunk completes and the async scheduler keeps running.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use tokio::sync::Semaphore;

use taskloom_core::error::TaskloomError;
use taskloom_core::traits::EmbeddingProvider;
use taskloom_core::types::{EmbeddingResult, LOCAL_EMBEDDING_DIM};

/// ONNX model and tokenizer, shared across blocking inference tasks.
struct Inner {
    /// ONNX Runtime session (not Send, wrapped in Mutex for safety).
    session: Mutex<Session>,
    /// HuggingFace tokenizer.
    tokenizer: tokenizers::Tokenizer,
}

// Safety: Session is accessed through Mutex which provides synchronization.
// The tokenizer is thread-safe for encoding operations.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

/// Local embedding provider backed by an ONNX session.
pub struct LocalEmbedder {
    inner: Arc<Inner>,
    /// Bounds concurrent blocking inference tasks.
    permits: Arc<Semaphore>,
    /// Texts per offloaded chunk.
    batch_size: usize,
}

impl LocalEmbedder {
    /// Load the model and tokenizer from a directory containing
    /// `model.onnx` and `tokenizer.json`.
    pub fn new(model_dir: &Path, batch_size: usize, workers: usize) -> Result<Self, TaskloomError> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            TaskloomError::Internal(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let model_path = model_dir.join("model.onnx");
        let session = Session::builder()
            .map_err(|e| TaskloomError::Internal(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| TaskloomError::Internal(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| TaskloomError::Internal(format!("failed to set thread count: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                TaskloomError::Internal(format!(
                    "failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                session: Mutex::new(session),
                tokenizer,
            }),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            batch_size: batch_size.max(1),
        })
    }
}

impl Inner {
    /// Embed one chunk of texts synchronously. Per-text failures become
    /// `Failed` markers; only session-level faults abort the chunk.
    fn embed_chunk(&self, texts: &[String]) -> Vec<EmbeddingResult> {
        texts
            .iter()
            .map(|text| match self.embed_text(text) {
                Ok(vec) => EmbeddingResult::Embedded(vec),
                Err(e) => EmbeddingResult::Failed {
                    reason: e.to_string(),
                },
            })
            .collect()
    }

    /// Embed a single text string, returning a 384-dim f32 vector.
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, TaskloomError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| TaskloomError::Internal(format!("tokenization failed: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| t as i64)
            .collect();

        let seq_len = input_ids.len();

        let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| TaskloomError::Internal(format!("failed to create input_ids tensor: {e}")))?;
        let attention_mask_array = Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(|e| {
                TaskloomError::Internal(format!("failed to create attention_mask tensor: {e}"))
            })?;
        let token_type_ids_array = Array2::from_shape_vec((1, seq_len), token_type_ids)
            .map_err(|e| {
                TaskloomError::Internal(format!("failed to create token_type_ids tensor: {e}"))
            })?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| TaskloomError::Internal(format!("failed to lock ONNX session: {e}")))?;

        let input_ids_tensor = TensorRef::from_array_view(&input_ids_array)
            .map_err(|e| TaskloomError::Internal(format!("failed to create input_ids TensorRef: {e}")))?;
        let attention_mask_tensor = TensorRef::from_array_view(&attention_mask_array)
            .map_err(|e| {
                TaskloomError::Internal(format!("failed to create attention_mask TensorRef: {e}"))
            })?;
        let token_type_ids_tensor = TensorRef::from_array_view(&token_type_ids_array)
            .map_err(|e| {
                TaskloomError::Internal(format!("failed to create token_type_ids TensorRef: {e}"))
            })?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
            .map_err(|e| TaskloomError::Internal(format!("ONNX inference failed: {e}")))?;

        // Extract output: shape [1, seq_len, 384]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| TaskloomError::Internal(format!("failed to extract output tensor: {e}")))?;

        let hidden_size = shape[shape.len() - 1] as usize;
        let pooled = mean_pool_with_attention(data, &attention_mask, seq_len, hidden_size);

        Ok(l2_normalize(&pooled))
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn name(&self) -> &str {
        "local-onnx"
    }

    fn dimensions(&self) -> usize {
        LOCAL_EMBEDDING_DIM
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>, TaskloomError> {
        let mut results = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| TaskloomError::Internal(format!("embed pool closed: {e}")))?;

            let inner = Arc::clone(&self.inner);
            let chunk_texts = chunk.to_vec();
            let chunk_results = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                inner.embed_chunk(&chunk_texts)
            })
            .await
            .map_err(|e| TaskloomError::Internal(format!("embed task panicked: {e}")))?;

            results.extend(chunk_results);
        }

        Ok(results)
    }
}

/// Apply attention-masked mean pooling over token embeddings.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for i in 0..seq_len {
        if attention_mask[i] > 0 {
            for j in 0..hidden_size {
                sum[j] += embeddings[i * hidden_size + j];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut sum {
            *val /= count;
        }
    }

    sum
}

/// L2-normalize a vector.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}
