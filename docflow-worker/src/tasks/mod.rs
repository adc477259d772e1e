//! Task definitions shared by producers and the worker

pub mod markup;
pub mod options;
pub mod payload;

pub use markup::{decode_markup, encode_markup, MarkupError};
pub use options::{QueueName, TaskKind, TaskOptions};
pub use payload::{
    EnrichImagePayload, EnrichTextPayload, ProcessDocumentPayload, TaskPayload, TraceFields,
};
