//! # Inspection Common Library
//!
//! Shared code for the inspection tooling including:
//! - Bootstrap configuration loading (TOML + environment)
//! - Common error types

pub mod config;
pub mod error;

pub use error::{Error, Result};
