// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./taskloom.toml` > `~/.config/taskloom/taskloom.toml`
//! > `/etc/taskloom/taskloom.toml` with environment variable overrides via
//! `TASKLOOM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TaskloomConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/taskloom/taskloom.toml` (system-wide)
/// 3. `~/.config/taskloom/taskloom.toml` (user XDG config)
/// 4. `./taskloom.toml` (local directory)
/// 5. `TASKLOOM_*` environment variables
pub fn load_config() -> Result<TaskloomConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaskloomConfig::default()))
        .merge(Toml::file("/etc/taskloom/taskloom.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("taskloom/taskloom.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("taskloom.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<TaskloomConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaskloomConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TaskloomConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaskloomConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `TASKLOOM_STORAGE_DATABASE_PATH` must
/// map to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("TASKLOOM_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("storage_", "storage.", 1)
            .replacen("remote_", "remote.", 1)
            .replacen("memory_", "memory.", 1)
            .replacen("migration_", "migration.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_file() {
        let config = load_config_from_str("").unwrap();
        assert!(config.storage.wal_mode);
        assert_eq!(config.migration.batch_size, 100);
        assert_eq!(config.memory.candidate_multiplier, 5);
        assert!(!config.remote.is_configured());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [storage]
            database_path = "/tmp/board.db"
            wal_mode = false

            [migration]
            batch_size = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.database_path, "/tmp/board.db");
        assert!(!config.storage.wal_mode);
        assert_eq!(config.migration.batch_size, 25);
    }

    #[test]
    fn remote_configured_requires_all_credentials() {
        let partial = load_config_from_str(
            r#"
            [remote]
            data_api_url = "https://data.example.com/v1"
            database = "taskloom"
            "#,
        )
        .unwrap();
        assert!(!partial.remote.is_configured());

        let full = load_config_from_str(
            r#"
            [remote]
            data_api_url = "https://data.example.com/v1"
            database = "taskloom"
            api_key = "k1"
            embed_api_key = "k2"
            "#,
        )
        .unwrap();
        assert!(full.remote.is_configured());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
            [storage]
            databse_path = "/tmp/oops.db"
            "#,
        );
        assert!(result.is_err(), "typoed key should fail extraction");
    }
}
