//! Configuration management
//!
//! Data locations and mining parameters, layered from defaults, an optional
//! `ledger.toml` and `LEDGER_*` environment variables.

pub mod settings;

pub use settings::{Config, DEFAULT_MINING_WORKERS, DEFAULT_TARGET_BITS};
