//! Configuration module for mc-manager.
//!
//! This module handles parsing, validation, and access to the manager's
//! settings: where instance data lives, the default heap budget handed to
//! new servers, the monitor cadences, and the catalog manifest location.
//! Configurations are loaded from JSON files or strings.
//!
//! # Examples
//!
//! ```
//! use mc_manager::config::ManagerConfig;
//!
//! let config = ManagerConfig::parse_from_str(r#"{ "dataDir": "/tmp/mc" }"#).unwrap();
//! assert_eq!(config.default_heap_mb, 1024);
//! ```
mod parser;
pub mod validator;

pub use parser::ManagerConfig;
pub use validator::validate_config;
