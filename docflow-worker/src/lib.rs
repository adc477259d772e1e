//! docflow-worker library interface
//!
//! Two-stage document pipeline:
//! - Stage 1 (`document:process`) runs offline analysis and applies the
//!   quality gate
//! - Stage 2 (`enrich:text`, `enrich:image`) enriches gated documents through
//!   the AI provider
//!
//! Exposed as a library so integration tests can assemble a worker against a
//! temporary database and fake collaborators.

pub mod ai;
pub mod analyzer;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod quality;
pub mod queue;
pub mod store;
pub mod tasks;
pub mod trace;
pub mod utils;
pub mod worker;

pub use crate::error::{TaskError, TaskResult};
