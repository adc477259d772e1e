//! SQLite-backed broker
//!
//! Tasks live in the `tasks` table. A claim is a conditional state update
//! (`pending`/`retry` to `active`) inside a transaction, so two workers can
//! never both win the same task. Timestamps are Unix milliseconds.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use docflow_common::{ids, time, Error, Result};
use sqlx::{Row, SqlitePool};

use super::broker::{Broker, ClaimedTask, NewTask, QueueStats, TaskInfo, TaskState};
use crate::tasks::QueueName;
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Stored view of a task, for inspection
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTask {
    pub id: String,
    pub task_type: String,
    pub queue: String,
    pub payload: String,
    pub state: TaskState,
    pub retried: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub process_at: i64,
}

#[derive(Clone)]
pub struct SqliteBroker {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteBroker {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Load a task by id
    pub async fn get_task(&self, id: &str) -> Result<Option<StoredTask>> {
        let row = sqlx::query(
            r#"
            SELECT id, task_type, queue, payload, state, retried, max_retries,
                   last_error, process_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let state: String = row.get("state");
            Ok(StoredTask {
                id: row.get("id"),
                task_type: row.get("task_type"),
                queue: row.get("queue"),
                payload: row.get("payload"),
                state: TaskState::parse(&state)
                    .ok_or_else(|| Error::Internal(format!("Unknown task state: {}", state)))?,
                retried: row.get::<i64, _>("retried") as u32,
                max_retries: row.get::<i64, _>("max_retries") as u32,
                last_error: row.get("last_error"),
                process_at: row.get("process_at"),
            })
        })
        .transpose()
    }

    /// Run a single-row state update, failing with NotFound when no row matched
    async fn update_task(
        &self,
        operation: &str,
        id: &str,
        query: &str,
        binds: UpdateBinds<'_>,
    ) -> Result<()> {
        let pool = &self.pool;
        let affected = retry_on_lock(operation, self.max_lock_wait_ms, || async move {
            let mut q = sqlx::query(query);
            if let Some(error) = binds.error {
                q = q.bind(error);
            }
            if let Some(at) = binds.at {
                q = q.bind(at);
            }
            let result = q.bind(id).execute(pool).await?;
            Ok::<u64, Error>(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Err(Error::NotFound(format!("task {}", id)));
        }
        Ok(())
    }
}

/// Positional parameters bound ahead of the task id
#[derive(Clone, Copy)]
struct UpdateBinds<'a> {
    error: Option<&'a str>,
    at: Option<i64>,
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl Broker for SqliteBroker {
    async fn enqueue(&self, task: NewTask) -> Result<TaskInfo> {
        let id = ids::generate().to_string();
        let now = time::now_millis();
        let options = task.options;

        let pool = &self.pool;
        let id_ref = &id;
        let task_ref = &task;
        retry_on_lock("enqueue task", self.max_lock_wait_ms, || async move {
            sqlx::query(
                r#"
                INSERT INTO tasks (
                    id, task_type, queue, payload, state, retried, max_retries,
                    timeout_secs, retention_secs, process_at, created_at
                ) VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id_ref)
            .bind(task_ref.kind.as_str())
            .bind(options.queue.as_str())
            .bind(&task_ref.payload)
            .bind(options.max_retries as i64)
            .bind(options.timeout.as_secs() as i64)
            .bind(options.retention.as_secs() as i64)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
            Ok::<(), Error>(())
        })
        .await?;

        Ok(TaskInfo {
            id,
            kind: task.kind,
            queue: options.queue,
            state: TaskState::Pending,
            max_retries: options.max_retries,
        })
    }

    async fn dequeue(&self, queue: QueueName) -> Result<Option<ClaimedTask>> {
        let pool = &self.pool;
        retry_on_lock("claim task", self.max_lock_wait_ms, || async move {
            let now = time::now_millis();
            let mut tx = pool.begin().await?;

            let row = sqlx::query(
                r#"
                SELECT id, task_type, payload, retried, max_retries, timeout_secs
                FROM tasks
                WHERE queue = ? AND state IN ('pending', 'retry') AND process_at <= ?
                ORDER BY process_at ASC, created_at ASC
                LIMIT 1
                "#,
            )
            .bind(queue.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                tx.rollback().await?;
                return Ok(None);
            };

            let id: String = row.get("id");
            let updated = sqlx::query(
                "UPDATE tasks SET state = 'active' WHERE id = ? AND state IN ('pending', 'retry')",
            )
            .bind(&id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            tx.commit().await?;

            if updated != 1 {
                // Claimed by another worker between select and update
                return Ok(None);
            }

            Ok::<Option<ClaimedTask>, Error>(Some(ClaimedTask {
                id,
                task_type: row.get("task_type"),
                queue,
                payload: row.get("payload"),
                retried: row.get::<i64, _>("retried") as u32,
                max_retries: row.get::<i64, _>("max_retries") as u32,
                timeout: Duration::from_secs(row.get::<i64, _>("timeout_secs").max(0) as u64),
            }))
        })
        .await
    }

    async fn complete(&self, id: &str) -> Result<()> {
        self.update_task(
            "complete task",
            id,
            "UPDATE tasks SET state = 'completed', last_error = NULL, finished_at = ? WHERE id = ?",
            UpdateBinds {
                error: None,
                at: Some(time::now_millis()),
            },
        )
        .await
    }

    async fn retry(&self, id: &str, delay: Duration, error: &str) -> Result<()> {
        self.update_task(
            "retry task",
            id,
            "UPDATE tasks SET state = 'retry', retried = retried + 1, last_error = ?, process_at = ? WHERE id = ?",
            UpdateBinds {
                error: Some(error),
                at: Some(time::now_millis().saturating_add(duration_millis(delay))),
            },
        )
        .await
    }

    async fn archive(&self, id: &str, error: &str) -> Result<()> {
        self.update_task(
            "archive task",
            id,
            "UPDATE tasks SET state = 'archived', last_error = ?, finished_at = ? WHERE id = ?",
            UpdateBinds {
                error: Some(error),
                at: Some(time::now_millis()),
            },
        )
        .await
    }

    async fn recover_orphans(&self) -> Result<u64> {
        let pool = &self.pool;
        let now = time::now_millis();

        // The abandoned run counts as an attempt
        let (recovered, archived) =
            retry_on_lock("recover orphaned tasks", self.max_lock_wait_ms, || async move {
                let mut tx = pool.begin().await?;

                let archived = sqlx::query(
                    r#"
                    UPDATE tasks
                    SET state = 'archived',
                        retried = retried + 1,
                        last_error = 'abandoned by worker with no retries left',
                        finished_at = ?
                    WHERE state = 'active' AND retried >= max_retries
                    "#,
                )
                .bind(now)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                let recovered = sqlx::query(
                    r#"
                    UPDATE tasks
                    SET state = 'pending',
                        retried = retried + 1,
                        last_error = 'abandoned by worker'
                    WHERE state = 'active'
                    "#,
                )
                .execute(&mut *tx)
                .await?
                .rows_affected();

                tx.commit().await?;
                Ok::<(u64, u64), Error>((recovered, archived))
            })
            .await?;

        if recovered > 0 || archived > 0 {
            tracing::warn!(
                recovered,
                archived,
                "Recovered tasks left active by a previous worker"
            );
        }
        Ok(recovered)
    }

    async fn purge_expired(&self, now_millis: i64) -> Result<u64> {
        let pool = &self.pool;
        let purged = retry_on_lock("purge expired tasks", self.max_lock_wait_ms, || async move {
            let result = sqlx::query(
                r#"
                DELETE FROM tasks
                WHERE state IN ('completed', 'archived')
                  AND finished_at IS NOT NULL
                  AND finished_at + retention_secs * 1000 <= ?
                "#,
            )
            .bind(now_millis)
            .execute(pool)
            .await?;
            Ok::<u64, Error>(result.rows_affected())
        })
        .await?;

        if purged > 0 {
            tracing::debug!(purged, "Purged expired tasks");
        }
        Ok(purged)
    }

    async fn queue_stats(&self) -> Result<Vec<QueueStats>> {
        let rows = sqlx::query(
            "SELECT queue, state, COUNT(*) AS n FROM tasks GROUP BY queue, state ORDER BY queue",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats: BTreeMap<String, QueueStats> = BTreeMap::new();
        for row in rows {
            let queue: String = row.get("queue");
            let state: String = row.get("state");
            let count = row.get::<i64, _>("n").max(0) as u64;

            let entry = stats.entry(queue.clone()).or_insert_with(|| QueueStats {
                queue,
                ..Default::default()
            });
            match TaskState::parse(&state) {
                Some(TaskState::Pending) => entry.pending += count,
                Some(TaskState::Active) => entry.active += count,
                Some(TaskState::Retry) => entry.retry += count,
                Some(TaskState::Completed) => entry.completed += count,
                Some(TaskState::Archived) => entry.archived += count,
                None => tracing::warn!(state = %state, "Unknown task state in queue stats"),
            }
        }

        Ok(stats.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use crate::tasks::TaskKind;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn setup() -> (TempDir, SqliteBroker) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database_pool(&temp_dir.path().join("queue.db"), 4)
            .await
            .unwrap();
        (temp_dir, SqliteBroker::new(pool))
    }

    fn new_task(kind: TaskKind, body: &str) -> NewTask {
        NewTask {
            kind,
            payload: body.to_string(),
            options: kind.default_options(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_then_dequeue() {
        let (_dir, broker) = setup().await;
        let info = broker
            .enqueue(new_task(TaskKind::EnrichText, r#"{"a":1}"#))
            .await
            .unwrap();
        assert_eq!(info.queue, QueueName::TextEnrichment);
        assert_eq!(info.state, TaskState::Pending);
        assert!(Uuid::parse_str(&info.id).is_ok());

        // Wrong queue sees nothing
        assert!(broker.dequeue(QueueName::ImageEnrichment).await.unwrap().is_none());

        let claimed = broker.dequeue(QueueName::TextEnrichment).await.unwrap().unwrap();
        assert_eq!(claimed.id, info.id);
        assert_eq!(claimed.task_type, "enrich:text");
        assert_eq!(claimed.payload, r#"{"a":1}"#);
        assert_eq!(claimed.max_retries, 10);
        assert_eq!(claimed.timeout, Duration::from_secs(600));

        // Claimed tasks are not handed out twice
        assert!(broker.dequeue(QueueName::TextEnrichment).await.unwrap().is_none());
        let stored = broker.get_task(&info.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Active);
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo_within_queue() {
        let (_dir, broker) = setup().await;
        let first = broker.enqueue(new_task(TaskKind::ProcessDocument, "1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = broker.enqueue(new_task(TaskKind::ProcessDocument, "2")).await.unwrap();

        let a = broker.dequeue(QueueName::OfflineProcessing).await.unwrap().unwrap();
        let b = broker.dequeue(QueueName::OfflineProcessing).await.unwrap().unwrap();
        assert_eq!(a.id, first.id);
        assert_eq!(b.id, second.id);
    }

    #[tokio::test]
    async fn test_retry_delays_next_claim() {
        let (_dir, broker) = setup().await;
        let info = broker.enqueue(new_task(TaskKind::EnrichImage, "{}")).await.unwrap();
        let claimed = broker.dequeue(QueueName::ImageEnrichment).await.unwrap().unwrap();

        broker
            .retry(&claimed.id, Duration::from_secs(3600), "connection refused")
            .await
            .unwrap();
        assert!(broker.dequeue(QueueName::ImageEnrichment).await.unwrap().is_none());

        let stored = broker.get_task(&info.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Retry);
        assert_eq!(stored.retried, 1);
        assert_eq!(stored.last_error.as_deref(), Some("connection refused"));

        // A zero delay makes it immediately claimable again
        sqlx::query("UPDATE tasks SET process_at = 0 WHERE id = ?")
            .bind(&info.id)
            .execute(&broker.pool)
            .await
            .unwrap();
        let again = broker.dequeue(QueueName::ImageEnrichment).await.unwrap().unwrap();
        assert_eq!(again.retried, 1);
    }

    #[tokio::test]
    async fn test_complete_and_archive() {
        let (_dir, broker) = setup().await;
        let done = broker.enqueue(new_task(TaskKind::ProcessDocument, "a")).await.unwrap();
        let failed = broker.enqueue(new_task(TaskKind::ProcessDocument, "b")).await.unwrap();
        broker.dequeue(QueueName::OfflineProcessing).await.unwrap();
        broker.dequeue(QueueName::OfflineProcessing).await.unwrap();

        broker.complete(&done.id).await.unwrap();
        broker.archive(&failed.id, "bad payload").await.unwrap();

        assert_eq!(
            broker.get_task(&done.id).await.unwrap().unwrap().state,
            TaskState::Completed
        );
        let archived = broker.get_task(&failed.id).await.unwrap().unwrap();
        assert_eq!(archived.state, TaskState::Archived);
        assert_eq!(archived.last_error.as_deref(), Some("bad payload"));
    }

    #[tokio::test]
    async fn test_update_unknown_task_is_not_found() {
        let (_dir, broker) = setup().await;
        let err = broker.complete("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_recover_orphans() {
        let (_dir, broker) = setup().await;
        let info = broker.enqueue(new_task(TaskKind::EnrichText, "{}")).await.unwrap();
        broker.dequeue(QueueName::TextEnrichment).await.unwrap().unwrap();

        assert_eq!(broker.recover_orphans().await.unwrap(), 1);
        let task = broker.get_task(&info.id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.retried, 1);
        assert!(broker.dequeue(QueueName::TextEnrichment).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_repeatedly_orphaned_task_exhausts_retries() {
        let (_dir, broker) = setup().await;
        let mut task = new_task(TaskKind::EnrichText, "{}");
        task.options.max_retries = 2;
        let info = broker.enqueue(task).await.unwrap();

        for _ in 0..2 {
            broker.dequeue(QueueName::TextEnrichment).await.unwrap().unwrap();
            assert_eq!(broker.recover_orphans().await.unwrap(), 1);
        }

        broker.dequeue(QueueName::TextEnrichment).await.unwrap().unwrap();
        assert_eq!(broker.recover_orphans().await.unwrap(), 0);

        let stored = broker.get_task(&info.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Archived);
        assert_eq!(stored.retried, 3);
        assert!(stored.last_error.unwrap().contains("abandoned"));
        assert!(broker.dequeue(QueueName::TextEnrichment).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_respects_retention() {
        let (_dir, broker) = setup().await;
        let info = broker.enqueue(new_task(TaskKind::ProcessDocument, "{}")).await.unwrap();
        broker.dequeue(QueueName::OfflineProcessing).await.unwrap();
        broker.complete(&info.id).await.unwrap();

        let now = time::now_millis();
        assert_eq!(broker.purge_expired(now).await.unwrap(), 0);

        let eight_days = 8 * 24 * 60 * 60 * 1000;
        assert_eq!(broker.purge_expired(now + eight_days).await.unwrap(), 1);
        assert!(broker.get_task(&info.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_stats() {
        let (_dir, broker) = setup().await;
        broker.enqueue(new_task(TaskKind::EnrichText, "{}")).await.unwrap();
        broker.enqueue(new_task(TaskKind::EnrichText, "{}")).await.unwrap();
        broker.enqueue(new_task(TaskKind::EnrichImage, "{}")).await.unwrap();
        broker.dequeue(QueueName::TextEnrichment).await.unwrap();

        let stats = broker.queue_stats().await.unwrap();
        let text = stats.iter().find(|s| s.queue == "text-enrichment").unwrap();
        assert_eq!(text.pending, 1);
        assert_eq!(text.active, 1);
        let image = stats.iter().find(|s| s.queue == "image-enrichment").unwrap();
        assert_eq!(image.pending, 1);
    }
}
