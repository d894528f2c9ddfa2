//! eim-apply library: Exposes the CLI's building blocks for testing.
//!
//! This is a thin layer over eim-core that reads items and record sets from
//! JSON files and writes the mutated item back out.

pub mod config;
pub mod files;

pub use config::{Config, ConfigError};
pub use files::{ApplyOutcome, ApplyRequest, apply_files, load_json, save_json};
