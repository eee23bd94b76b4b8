//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and TOML loading
//! - [`defaults`]: Default values for every tunable
//! - [`env`]: Environment variable overrides applied after the file
//! - [`validation`]: Startup validation collecting every problem at once

mod defaults;
mod env;
mod types;
mod validation;

pub use types::{Config, FirewallConfig, ResolverConfig, VpnConfig};
pub use validation::validate;
