// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory commands: remember, recall, summarize, context.

use taskloom_config::model::TaskloomConfig;
use taskloom_core::types::{MemoryRole, RecordFilter};

use crate::bootstrap;

pub async fn remember(
    config: &TaskloomConfig,
    project_id: &str,
    content: &str,
    session: &str,
    task: Option<&str>,
    role: &str,
) -> i32 {
    let (service, factory) = match bootstrap::memory_service(config).await {
        Ok(parts) => parts,
        Err(e) => return fail(&e),
    };

    let role = MemoryRole::from_str_value(role);
    let record = match service
        .record_message(project_id, session, task, role, content, None)
        .await
    {
        Ok(record) => record,
        Err(e) => return fail(&e),
    };

    // This process exits right after the command; settle the embedding
    // now instead of leaving the background task behind.
    match factory.bind(project_id).await {
        Ok(binding) => service.fulfill_embedding(&binding, &record).await,
        Err(e) => return fail(&e),
    }

    println!("stored {} ({} bytes)", record.id, content.len());
    0
}

pub async fn recall(config: &TaskloomConfig, project_id: &str, query: &str, k: usize) -> i32 {
    let (service, _factory) = match bootstrap::memory_service(config).await {
        Ok(parts) => parts,
        Err(e) => return fail(&e),
    };

    let hits = match service
        .search_memory(project_id, query, k, &RecordFilter::default())
        .await
    {
        Ok(hits) => hits,
        Err(e) => return fail(&e),
    };

    if hits.is_empty() {
        println!("no matching memory");
        return 0;
    }
    for hit in &hits {
        println!(
            "{:.3}  [{}] {}  {}",
            hit.score,
            hit.record.role.as_str(),
            hit.record.created_at,
            hit.record.content,
        );
    }
    0
}

pub async fn summarize(config: &TaskloomConfig, project_id: &str, trigger: &str) -> i32 {
    let (service, _factory) = match bootstrap::memory_service(config).await {
        Ok(parts) => parts,
        Err(e) => return fail(&e),
    };

    match service.update_summary(project_id, trigger).await {
        Ok(summary) => {
            println!("{}", summary.summary);
            0
        }
        Err(e) => fail(&e),
    }
}

pub async fn context(config: &TaskloomConfig, project_id: &str, query: Option<&str>) -> i32 {
    let (service, _factory) = match bootstrap::memory_service(config).await {
        Ok(parts) => parts,
        Err(e) => return fail(&e),
    };

    let context = match service.project_context(project_id, query).await {
        Ok(context) => context,
        Err(e) => return fail(&e),
    };

    if let Some(summary) = &context.summary {
        println!("## Summary ({})\n{}", summary.updated_at, summary.summary);
    }
    println!("## Recent ({} turns)", context.recent.len());
    for record in &context.recent {
        println!("[{}] {}", record.role.as_str(), record.content);
    }
    if !context.relevant.is_empty() {
        println!("## Relevant");
        for hit in &context.relevant {
            println!("{:.3}  {}", hit.score, hit.record.content);
        }
    }
    0
}

fn fail(error: &taskloom_core::TaskloomError) -> i32 {
    eprintln!("taskloom: {error}");
    1
}
