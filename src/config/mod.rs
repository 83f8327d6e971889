//! Configuration management
//!
//! Process-wide settings for the node: data directory, listen address,
//! and peer socket tuning. Seeded from environment variables.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
