//! Plugin configuration for the CLI: a TOML file, `--set` overrides and
//! command-line flags merged over built-in presets.

pub mod builder;
pub mod defaults;
pub mod file;
pub mod models;

pub use builder::build_config;
pub use models::AppConfig;
