//! Common types and utilities shared across the package layers.

pub mod config;
pub mod xml;

pub use config::{Compression, ConfigError, EngineConfig};
