// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding providers for the Taskloom memory core.
//!
//! Two interchangeable implementations of the
//! [`taskloom_core::EmbeddingProvider`] contract:
//!
//! - **LocalEmbedder**: ONNX all-MiniLM-L6-v2 inference on CPU, 384-dim,
//!   no network. CPU-bound work runs on a bounded blocking pool so the
//!   async scheduler never stalls.
//! - **RemoteEmbedder**: hosted embedding API, 1024-dim, batched with
//!   bounded retry, rate-limit handling, and per-item failure markers.
//!
//! `ModelFetcher` downloads the local model files on first run.

pub mod local;
pub mod model_fetch;
pub mod remote;

pub use local::LocalEmbedder;
pub use model_fetch::ModelFetcher;
pub use remote::RemoteEmbedder;
