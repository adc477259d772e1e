//! SQLite analysis store
//!
//! Structured parts of a record are stored as JSON text columns, tags in the
//! `analysis_tags` side table. Every write runs in one transaction so that a
//! failed write never leaves the record and its tags out of step, and each
//! write only touches the columns of the stage that owns them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::AnalysisStore;
use crate::models::{merge_image, AnalysisRecord, EnrichmentPatch, ImageMetadata};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

#[derive(Clone)]
pub struct SqliteAnalysisStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteAnalysisStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }
}

fn to_json<T: Serialize>(value: &T, field: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", field, e)))
}

fn from_json<T: DeserializeOwned>(value: &str, field: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", field, e)))
}

fn opt_to_json<T: Serialize>(value: &Option<T>, field: &str) -> Result<Option<String>> {
    value.as_ref().map(|v| to_json(v, field)).transpose()
}

fn opt_from_json<T: DeserializeOwned>(value: Option<String>, field: &str) -> Result<Option<T>> {
    value.map(|v| from_json(&v, field)).transpose()
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

async fn write_tags(conn: &mut SqliteConnection, id: &str, tags: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM analysis_tags WHERE analysis_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    for (position, tag) in tags.iter().enumerate() {
        sqlx::query("INSERT INTO analysis_tags (analysis_id, position, tag) VALUES (?, ?, ?)")
            .bind(id)
            .bind(position as i64)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Bump `updated_at`, failing with `NotFound` when the row is missing
///
/// Run first in a write transaction so the write lock is held before any
/// read that the transaction depends on.
async fn touch(conn: &mut SqliteConnection, id: &str, updated_at: &str) -> Result<()> {
    let result = sqlx::query("UPDATE analyses SET updated_at = ? WHERE id = ?")
        .bind(updated_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("analysis {}", id)));
    }
    Ok(())
}

#[async_trait]
impl AnalysisStore for SqliteAnalysisStore {
    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        // Prepare all data before touching the database
        let id = record.id.to_string();
        let created_at = record.created_at.to_rfc3339();
        let updated_at = record.updated_at.to_rfc3339();
        let statistics = to_json(&record.statistics, "statistics")?;
        let sentiment = opt_to_json(&record.sentiment, "sentiment")?;
        let readability = opt_to_json(&record.readability, "readability")?;
        let quality_score = record.quality_score.as_ref().map(|q| q.score);
        let quality = opt_to_json(&record.quality_score, "quality score")?;
        let synopsis = opt_to_json(&record.synopsis, "synopsis")?;
        let editorial = opt_to_json(&record.editorial, "editorial")?;
        let ai_detection = opt_to_json(&record.ai_detection, "ai detection")?;
        let images = to_json(&record.images, "images")?;

        let pool = &self.pool;
        let id = &id;
        let tags = &record.tags;
        let cleaned_text = &record.cleaned_text;
        let offline = (&updated_at, &statistics, &sentiment, &readability, &quality);
        let enrichment = (&created_at, &synopsis, &editorial, &ai_detection, &images);

        let created = retry_on_lock("save analysis", self.max_lock_wait_ms, || async move {
            let (updated_at, statistics, sentiment, readability, quality) = offline;
            let (created_at, synopsis, editorial, ai_detection, images) = enrichment;

            let mut tx = pool.begin().await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO analyses (
                    id, created_at, updated_at, statistics, sentiment, readability,
                    quality_score, quality, cleaned_text, synopsis, editorial,
                    ai_detection, images
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(created_at)
            .bind(updated_at)
            .bind(statistics)
            .bind(sentiment)
            .bind(readability)
            .bind(quality_score)
            .bind(quality)
            .bind(cleaned_text)
            .bind(synopsis)
            .bind(editorial)
            .bind(ai_detection)
            .bind(images)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;

            if inserted {
                write_tags(&mut *tx, id, tags).await?;
            } else {
                sqlx::query(
                    r#"
                    UPDATE analyses SET
                        updated_at = ?,
                        statistics = ?,
                        sentiment = ?,
                        readability = ?,
                        quality_score = ?,
                        quality = ?,
                        cleaned_text = ?
                    WHERE id = ?
                    "#,
                )
                .bind(updated_at)
                .bind(statistics)
                .bind(sentiment)
                .bind(readability)
                .bind(quality_score)
                .bind(quality)
                .bind(cleaned_text)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok::<bool, Error>(inserted)
        })
        .await?;

        tracing::debug!(analysis_id = %record.id, created, "Analysis saved");
        Ok(())
    }

    async fn apply_enrichment(&self, id: Uuid, patch: &EnrichmentPatch) -> Result<()> {
        let id_str = id.to_string();
        let updated_at = docflow_common::time::now().to_rfc3339();
        let synopsis = opt_to_json(&patch.synopsis, "synopsis")?;
        let editorial = opt_to_json(&patch.editorial, "editorial")?;
        let ai_detection = opt_to_json(&patch.ai_detection, "ai detection")?;

        let pool = &self.pool;
        let id_ref = &id_str;
        let updated_at = &updated_at;
        let cleaned_text = &patch.cleaned_text;
        let tags = &patch.tags;
        let columns = (&synopsis, &editorial, &ai_detection);

        retry_on_lock("apply enrichment", self.max_lock_wait_ms, || async move {
            let (synopsis, editorial, ai_detection) = columns;

            let mut tx = pool.begin().await?;

            let result = sqlx::query(
                r#"
                UPDATE analyses SET
                    updated_at = ?,
                    synopsis = COALESCE(?, synopsis),
                    cleaned_text = COALESCE(?, cleaned_text),
                    editorial = COALESCE(?, editorial),
                    ai_detection = COALESCE(?, ai_detection)
                WHERE id = ?
                "#,
            )
            .bind(updated_at)
            .bind(synopsis)
            .bind(cleaned_text)
            .bind(editorial)
            .bind(ai_detection)
            .bind(id_ref)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(Error::NotFound(format!("analysis {}", id_ref)));
            }

            if !tags.is_empty() {
                write_tags(&mut *tx, id_ref, tags).await?;
            }

            tx.commit().await?;
            Ok::<(), Error>(())
        })
        .await?;

        tracing::debug!(analysis_id = %id, tags = patch.tags.len(), "Enrichment applied");
        Ok(())
    }

    async fn merge_image(&self, id: Uuid, image: &ImageMetadata) -> Result<()> {
        let id_str = id.to_string();
        let updated_at = docflow_common::time::now().to_rfc3339();

        let pool = &self.pool;
        let id_ref = &id_str;
        let updated_at = &updated_at;

        let count = retry_on_lock("merge image", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;

            // Take the write lock before reading the image list
            touch(&mut *tx, id_ref, updated_at).await?;

            let stored: String = sqlx::query_scalar("SELECT images FROM analyses WHERE id = ?")
                .bind(id_ref)
                .fetch_one(&mut *tx)
                .await?;
            let mut images: Vec<ImageMetadata> = from_json(&stored, "images")?;
            merge_image(&mut images, image.clone());

            sqlx::query("UPDATE analyses SET images = ? WHERE id = ?")
                .bind(to_json(&images, "images")?)
                .bind(id_ref)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<usize, Error>(images.len())
        })
        .await?;

        tracing::debug!(analysis_id = %id, url = %image.url, images = count, "Image merged");
        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> Result<AnalysisRecord> {
        let id_str = id.to_string();

        let row = sqlx::query(
            r#"
            SELECT created_at, updated_at, statistics, sentiment, readability,
                   quality, cleaned_text, synopsis, editorial, ai_detection, images
            FROM analyses
            WHERE id = ?
            "#,
        )
        .bind(&id_str)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("analysis {}", id)))?;

        let tags: Vec<String> = sqlx::query_scalar(
            "SELECT tag FROM analysis_tags WHERE analysis_id = ? ORDER BY position",
        )
        .bind(&id_str)
        .fetch_all(&self.pool)
        .await?;

        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");
        let statistics: String = row.get("statistics");
        let images: String = row.get("images");

        Ok(AnalysisRecord {
            id,
            created_at: parse_timestamp(&created_at, "created_at")?,
            updated_at: parse_timestamp(&updated_at, "updated_at")?,
            statistics: from_json(&statistics, "statistics")?,
            sentiment: opt_from_json(row.get("sentiment"), "sentiment")?,
            readability: opt_from_json(row.get("readability"), "readability")?,
            quality_score: opt_from_json(row.get("quality"), "quality score")?,
            cleaned_text: row.get("cleaned_text"),
            synopsis: opt_from_json(row.get("synopsis"), "synopsis")?,
            editorial: opt_from_json(row.get("editorial"), "editorial")?,
            ai_detection: opt_from_json(row.get("ai_detection"), "ai detection")?,
            tags,
            images: from_json(&images, "images")?,
        })
    }
}
