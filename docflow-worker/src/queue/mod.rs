//! Task queue: broker abstraction, SQLite broker and producer client

pub mod broker;
pub mod client;
pub mod sqlite;

pub use broker::{Broker, ClaimedTask, NewTask, QueueStats, TaskInfo, TaskState};
pub use client::TaskClient;
pub use sqlite::SqliteBroker;
