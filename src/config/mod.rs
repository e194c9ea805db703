//! Configuration module.
//!
//! Provides configuration management with support for:
//! - JSON configuration files
//! - Environment variable overrides
//! - Sensible defaults
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`game`]: Per-room game rule configuration
//! - [`lifecycle`]: Room lifecycle cleaner settings
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod game;
pub mod lifecycle;
pub mod loader;
pub mod logging;
pub mod types;
pub mod validation;

pub use game::GameRulesConfig;

pub use lifecycle::LifecycleConfig;

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use types::Config;

pub use validation::validate_config;
