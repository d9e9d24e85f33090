// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run download of the local ONNX embedding model.
//!
//! Fetches the quantized all-MiniLM-L6-v2 model and its tokenizer from
//! HuggingFace into the configured model directory, verifying a pinned
//! SHA-256 digest when one is configured.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use taskloom_core::error::TaskloomError;

const MODEL_URL: &str =
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Manages ONNX model download and path resolution.
pub struct ModelFetcher {
    model_dir: PathBuf,
    /// Pinned digest of `model.onnx`, verified after download when set.
    expected_sha256: Option<String>,
}

impl ModelFetcher {
    pub fn new(model_dir: PathBuf, expected_sha256: Option<String>) -> Self {
        Self {
            model_dir,
            expected_sha256,
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join("tokenizer.json")
    }

    /// True if both model and tokenizer files exist.
    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Ensures the model is downloaded and available.
    ///
    /// Downloads from HuggingFace on first run; subsequent calls are no-ops.
    pub async fn ensure_model(&self) -> Result<PathBuf, TaskloomError> {
        if self.is_model_available() {
            return Ok(self.model_dir.clone());
        }

        info!("embedding model not found, downloading");

        tokio::fs::create_dir_all(&self.model_dir)
            .await
            .map_err(|e| TaskloomError::Internal(format!("failed to create model directory: {e}")))?;

        let files = [("model.onnx", MODEL_URL), ("tokenizer.json", TOKENIZER_URL)];

        for (filename, url) in &files {
            let dest = self.model_dir.join(filename);
            if dest.exists() {
                continue;
            }

            info!(file = filename, "downloading model file");
            match download_file(url, &dest).await {
                Ok(size) => {
                    info!(file = filename, bytes = size, "download complete");
                }
                Err(e) => {
                    // Clean up partial download
                    let _ = tokio::fs::remove_file(&dest).await;
                    return Err(e);
                }
            }
        }

        if let Some(expected) = &self.expected_sha256 {
            let actual = sha256_file(&self.model_path()).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(self.model_path()).await;
                return Err(TaskloomError::Internal(format!(
                    "model checksum mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        info!(dir = %self.model_dir.display(), "embedding model ready");
        Ok(self.model_dir.clone())
    }
}

/// Download a file from a URL to a local path.
async fn download_file(url: &str, dest: &Path) -> Result<usize, TaskloomError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| TaskloomError::Internal(format!("failed to download {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(TaskloomError::Internal(format!(
            "download failed with status {}: {url}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TaskloomError::Internal(format!("failed to read response body from {url}: {e}")))?;

    let size = bytes.len();
    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| TaskloomError::Internal(format!("failed to write {}: {e}", dest.display())))?;

    Ok(size)
}

/// Hex-encoded SHA-256 of a file's contents.
async fn sha256_file(path: &Path) -> Result<String, TaskloomError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| TaskloomError::Internal(format!("failed to read {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
