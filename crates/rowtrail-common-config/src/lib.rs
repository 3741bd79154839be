//! Configuration types for Rowtrail.
//!
//! This crate provides the configuration read from `.rowtrail/config.yaml`
//! and its conversion into capture settings, table registrations and
//! logging setup.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;
