//! Configuration utilities.

/// TOML configuration (`atlas.toml`) and the snapshot manager.
pub mod toml_config;
