//! Task dispatch: worker pool, retry policy and settings

pub mod config;
pub mod dispatcher;
pub mod retry;

pub use config::WorkerConfig;
pub use dispatcher::{weighted_queue_order, Dispatcher};
pub use retry::retry_delay;
