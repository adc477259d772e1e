//! Analysis record persistence

pub mod sqlite;

use async_trait::async_trait;
use docflow_common::Result;
use uuid::Uuid;

use crate::models::{AnalysisRecord, EnrichmentPatch, ImageMetadata};

pub use sqlite::SqliteAnalysisStore;

/// Persistence for analysis records
///
/// Implementations must be safe for concurrent use: sibling tasks for the
/// same analysis may write at the same time. Each write touches only the
/// field set its stage owns, so a sibling's fields are never overwritten
/// from a stale snapshot.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Create the record, or replace the offline analysis fields of an
    /// existing one
    ///
    /// Enrichment fields (synopsis, editorial, AI detection, tags, images)
    /// are written only on create.
    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()>;

    /// Merge text enrichment into an existing record
    ///
    /// `None` fields and an empty tag set leave the stored value alone.
    /// `Error::NotFound` when no record has this id.
    async fn apply_enrichment(&self, id: Uuid, patch: &EnrichmentPatch) -> Result<()>;

    /// Add image metadata, replacing an entry with the same URL
    ///
    /// `Error::NotFound` when no record has this id.
    async fn merge_image(&self, id: Uuid, image: &ImageMetadata) -> Result<()>;

    /// Load a record; `Error::NotFound` when no record has this id
    async fn get_analysis(&self, id: Uuid) -> Result<AnalysisRecord>;
}
