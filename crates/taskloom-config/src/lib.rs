// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading for Taskloom.
//!
//! TOML files merged through a layered hierarchy with `TASKLOOM_`
//! environment variable overrides. All sections default to sensible
//! values; the remote section is entirely optional and its absence pins
//! every project to the embedded backend and local embedding provider.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::TaskloomConfig;
pub use validation::validate;
