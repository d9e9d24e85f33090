// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process wiring: open storage, build providers, assemble the service.
//!
//! Provider and backend instances are created once here and passed down
//! explicitly; nothing in the core reads ambient global state.

use std::path::Path;
use std::sync::Arc;

use taskloom_config::model::TaskloomConfig;
use taskloom_core::traits::{EmbeddingProvider, StorageBackend};
use taskloom_core::TaskloomError;
use taskloom_embed::{LocalEmbedder, ModelFetcher, RemoteEmbedder};
use taskloom_memory::{ExtractiveSummarizer, MemoryService};
use taskloom_storage::{BackendFactory, DataApiClient, Database, RemoteBackend, SqliteBackend};

/// Open the embedded database and project registry.
pub async fn open_registry(config: &TaskloomConfig) -> Result<Arc<SqliteBackend>, TaskloomError> {
    let db = Database::open(&config.storage.database_path).await?;
    Ok(Arc::new(SqliteBackend::new(db)))
}

/// Build the remote backend and provider when the process is configured
/// for them; `None` pins every project to the embedded backend.
pub fn remote_parts(
    config: &TaskloomConfig,
) -> Result<Option<(Arc<RemoteBackend>, Arc<RemoteEmbedder>)>, TaskloomError> {
    let remote = &config.remote;
    if !remote.is_configured() {
        return Ok(None);
    }

    // is_configured() guarantees these are present.
    let data_api_url = remote.data_api_url.as_deref().unwrap_or_default();
    let database = remote.database.as_deref().unwrap_or_default();
    let api_key = remote.api_key.as_deref().unwrap_or_default();
    let embed_api_key = remote.embed_api_key.as_deref().unwrap_or_default();

    let client = DataApiClient::new(data_api_url, database, api_key)?;
    let backend = Arc::new(RemoteBackend::new(
        client,
        remote.vector_index.clone(),
        config.memory.candidate_multiplier,
    ));
    let embedder = Arc::new(RemoteEmbedder::new(
        &remote.embed_api_url,
        embed_api_key,
        &remote.embed_model,
    )?);
    Ok(Some((backend, embedder)))
}

/// Load (downloading on first run) the local embedding model.
pub async fn local_embedder(config: &TaskloomConfig) -> Result<Arc<LocalEmbedder>, TaskloomError> {
    let fetcher = ModelFetcher::new(
        Path::new(&config.memory.model_dir).to_path_buf(),
        config.memory.model_sha256.clone(),
    );
    let model_dir = fetcher.ensure_model().await?;
    Ok(Arc::new(LocalEmbedder::new(
        &model_dir,
        config.memory.local_batch_size,
        config.memory.embed_workers,
    )?))
}

/// Assemble the factory binding backends and providers per project.
pub async fn factory(
    config: &TaskloomConfig,
    registry: Arc<SqliteBackend>,
) -> Result<Arc<BackendFactory>, TaskloomError> {
    let local = local_embedder(config).await?;
    let (remote_backend, remote_embedder) = match remote_parts(config)? {
        Some((backend, embedder)) => (
            Some(backend as Arc<dyn StorageBackend>),
            Some(embedder as Arc<dyn EmbeddingProvider>),
        ),
        None => (None, None),
    };

    Ok(Arc::new(BackendFactory::new(
        registry,
        local,
        remote_backend,
        remote_embedder,
    )))
}

/// The full memory service for commands that read or write memory.
///
/// The factory handle is returned alongside so short-lived commands can
/// settle embedding fulfillment before the process exits.
pub async fn memory_service(
    config: &TaskloomConfig,
) -> Result<(MemoryService, Arc<BackendFactory>), TaskloomError> {
    let registry = open_registry(config).await?;
    let factory = factory(config, registry).await?;
    let service = MemoryService::new(
        Arc::clone(&factory),
        Box::new(ExtractiveSummarizer),
        config.memory.clone(),
    );
    Ok((service, factory))
}
