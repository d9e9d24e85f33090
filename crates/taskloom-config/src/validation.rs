// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic validation beyond what serde can express.

use crate::model::TaskloomConfig;

/// Validate cross-field constraints. Returns human-readable problems;
/// an empty Vec means the config is usable.
pub fn validate(config: &TaskloomConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.migration.batch_size == 0 {
        problems.push("migration.batch_size must be at least 1".to_string());
    }
    if config.memory.embed_workers == 0 {
        problems.push("memory.embed_workers must be at least 1".to_string());
    }
    if config.memory.local_batch_size == 0 {
        problems.push("memory.local_batch_size must be at least 1".to_string());
    }
    if config.memory.candidate_multiplier == 0 {
        problems.push("memory.candidate_multiplier must be at least 1".to_string());
    }

    // Partial remote credentials are a misconfiguration worth flagging early:
    // the capability query would silently report "not configured".
    let r = &config.remote;
    let any_remote = r.data_api_url.is_some() || r.database.is_some() || r.api_key.is_some();
    if any_remote && !r.is_configured() {
        problems.push(
            "remote storage is partially configured; set remote.data_api_url, \
             remote.database, remote.api_key, and remote.embed_api_key together"
                .to_string(),
        );
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn default_config_is_valid() {
        let config = TaskloomConfig::default();
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn zero_batch_size_flagged() {
        let config = load_config_from_str("[migration]\nbatch_size = 0").unwrap();
        let problems = validate(&config);
        assert!(problems.iter().any(|p| p.contains("batch_size")));
    }

    #[test]
    fn partial_remote_credentials_flagged() {
        let config = load_config_from_str(
            r#"
            [remote]
            data_api_url = "https://data.example.com/v1"
            "#,
        )
        .unwrap();
        let problems = validate(&config);
        assert!(problems.iter().any(|p| p.contains("partially configured")));
    }
}
