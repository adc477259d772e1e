//! # Docflow Common Library
//!
//! Shared code for the docflow pipeline crates:
//! - Error and result types
//! - Bootstrap configuration loading (TOML + environment)
//! - Timestamp and identifier helpers

pub mod config;
pub mod error;
pub mod ids;
pub mod time;

pub use error::{Error, Result};
