//! Shared fixtures for worker integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use docflow_worker::ai::{AiError, AiProvider, AiResult, Reference};
use docflow_worker::analyzer::{DocumentAnalyzer, OfflineAnalysis, OfflineAnalyzer};
use docflow_worker::db::init_database_pool;
use docflow_worker::handlers::{
    EnrichImageHandler, EnrichTextHandler, ProcessDocumentHandler, TaskRouter,
};
use docflow_worker::metrics::CounterMetrics;
use docflow_worker::models::{AiDetection, EditorialAnalysis, Synopsis, TextQualityScore};
use docflow_common::{Error, Result};
use docflow_worker::queue::{
    Broker, ClaimedTask, NewTask, QueueStats, SqliteBroker, TaskClient, TaskInfo,
};
use docflow_worker::store::SqliteAnalysisStore;
use docflow_worker::tasks::QueueName;
use docflow_worker::worker::{Dispatcher, WorkerConfig};

pub const ARTICLE: &str = "The city council approved a new budget for public transit on Tuesday. \
The plan adds three bus routes and extends evening service across the northern districts.\n\n\
Officials said the changes respond to rider surveys collected over the past year. \
Most respondents asked for more frequent buses and better connections to the rail line.";

/// Runs the real offline analyzer but pins the quality score
pub struct FixedScoreAnalyzer(pub f64);

impl DocumentAnalyzer for FixedScoreAnalyzer {
    fn analyze(&self, text: &str) -> OfflineAnalysis {
        let mut analysis = OfflineAnalyzer.analyze(text);
        analysis.quality = TextQualityScore::new(
            self.0,
            "fixed for test",
            vec![],
            vec![],
            vec![],
            false,
        );
        analysis
    }
}

/// How every [`FakeAi`] call behaves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FakeMode {
    Succeed,
    Transient,
    Permanent,
    /// Succeeds after a delay on every call
    Slow(Duration),
    /// Never answers within a test's lifetime
    Hang,
    Panic,
}

/// In-memory AI provider recording which cleaning path was used
pub struct FakeAi {
    pub mode: FakeMode,
    pub tags: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeAi {
    pub fn new(mode: FakeMode, tags: &[&str]) -> Self {
        Self {
            mode,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond<T>(&self, operation: &str, value: T) -> AiResult<T> {
        self.calls.lock().unwrap().push(operation.to_string());
        match self.mode {
            FakeMode::Succeed => Ok(value),
            FakeMode::Transient => Err(AiError::Status(503, "overloaded".to_string())),
            FakeMode::Permanent => Err(AiError::Status(401, "invalid api key".to_string())),
            FakeMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            FakeMode::Panic => panic!("provider client bug in {}", operation),
            FakeMode::Hang => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(value)
            }
        }
    }
}

#[async_trait]
impl AiProvider for FakeAi {
    async fn generate_synopsis(&self, _text: &str) -> AiResult<Synopsis> {
        let synopsis = Synopsis {
            summary: "Council expands bus service".to_string(),
            key_points: vec!["three new routes".to_string()],
        };
        self.respond("synopsis", synopsis).await
    }

    async fn clean_text(&self, text: &str) -> AiResult<String> {
        self.respond("clean_text", format!("plain-cleaned: {}", text.len()))
            .await
    }

    async fn clean_text_with_context(
        &self,
        _text: &str,
        offline_template: &str,
        original_markup: &str,
    ) -> AiResult<String> {
        let cleaned = format!(
            "context-cleaned: {} / {}",
            offline_template.len(),
            original_markup
        );
        self.respond("clean_text_with_context", cleaned).await
    }

    async fn editorial_analysis(&self, _text: &str) -> AiResult<EditorialAnalysis> {
        let editorial = EditorialAnalysis {
            stance: "neutral".to_string(),
            bias_indicators: vec![],
            credibility: 0.8,
            notes: String::new(),
        };
        self.respond("editorial_analysis", editorial).await
    }

    async fn generate_tags(&self, _text: &str) -> AiResult<Vec<String>> {
        self.respond("generate_tags", self.tags.clone()).await
    }

    async fn extract_references(&self, _text: &str) -> AiResult<Vec<Reference>> {
        self.respond("extract_references", Vec::new()).await
    }

    async fn detect_ai_content(&self, _text: &str) -> AiResult<AiDetection> {
        let detection = AiDetection {
            likely_ai_generated: false,
            confidence: 0.9,
            signals: vec![],
        };
        self.respond("detect_ai_content", detection).await
    }

    async fn score_text_quality(&self, text: &str) -> AiResult<TextQualityScore> {
        let score = TextQualityScore::new(0.8, text.len().to_string(), vec![], vec![], vec![], true);
        self.respond("score_text_quality", score).await
    }
}

/// Temporary database with a broker, store and counting metrics
pub struct TestEnv {
    _dir: TempDir,
    pub broker: Arc<SqliteBroker>,
    pub store: Arc<SqliteAnalysisStore>,
    pub metrics: Arc<CounterMetrics>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("worker.db"), 4)
            .await
            .unwrap();
        Self {
            _dir: dir,
            broker: Arc::new(SqliteBroker::new(pool.clone())),
            store: Arc::new(SqliteAnalysisStore::new(pool)),
            metrics: Arc::new(CounterMetrics::new()),
        }
    }

    pub fn client(&self) -> TaskClient {
        TaskClient::new(self.broker.clone())
    }

    pub fn dispatcher(&self, analyzer: Arc<dyn DocumentAnalyzer>, ai: Arc<FakeAi>) -> Dispatcher {
        self.dispatcher_with_config(analyzer, ai, test_config())
    }

    pub fn dispatcher_with_config(
        &self,
        analyzer: Arc<dyn DocumentAnalyzer>,
        ai: Arc<FakeAi>,
        config: WorkerConfig,
    ) -> Dispatcher {
        self.build_dispatcher(analyzer, ai, self.client(), config)
    }

    /// Dispatcher whose Stage 1 handler enqueues follow-ons through `client`
    pub fn dispatcher_with_client(
        &self,
        analyzer: Arc<dyn DocumentAnalyzer>,
        ai: Arc<FakeAi>,
        client: TaskClient,
    ) -> Dispatcher {
        self.build_dispatcher(analyzer, ai, client, test_config())
    }

    fn build_dispatcher(
        &self,
        analyzer: Arc<dyn DocumentAnalyzer>,
        ai: Arc<FakeAi>,
        client: TaskClient,
        config: WorkerConfig,
    ) -> Dispatcher {
        let router = TaskRouter {
            process_document: ProcessDocumentHandler::new(
                analyzer,
                self.store.clone(),
                client,
                self.metrics.clone(),
            ),
            enrich_text: EnrichTextHandler::new(self.store.clone(), ai, self.metrics.clone()),
            enrich_image: EnrichImageHandler::new(self.store.clone(), self.metrics.clone()),
        };
        Dispatcher::new(self.broker.clone(), router, self.metrics.clone(), config)
    }

    /// Counts for one queue, zero when it has never held a task
    pub async fn stats(&self, queue: QueueName) -> QueueStats {
        self.broker
            .queue_stats()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.queue == queue.as_str())
            .unwrap_or_default()
    }
}

/// Broker that refuses to enqueue any task mentioning one URL
pub struct RejectingBroker {
    pub inner: Arc<SqliteBroker>,
    pub reject: String,
}

#[async_trait]
impl Broker for RejectingBroker {
    async fn enqueue(&self, task: NewTask) -> Result<TaskInfo> {
        if task.payload.contains(&self.reject) {
            return Err(Error::Internal("broker unavailable".to_string()));
        }
        self.inner.enqueue(task).await
    }

    async fn dequeue(&self, queue: QueueName) -> Result<Option<ClaimedTask>> {
        self.inner.dequeue(queue).await
    }

    async fn complete(&self, id: &str) -> Result<()> {
        self.inner.complete(id).await
    }

    async fn retry(&self, id: &str, delay: Duration, error: &str) -> Result<()> {
        self.inner.retry(id, delay, error).await
    }

    async fn archive(&self, id: &str, error: &str) -> Result<()> {
        self.inner.archive(id, error).await
    }

    async fn recover_orphans(&self) -> Result<u64> {
        self.inner.recover_orphans().await
    }

    async fn purge_expired(&self, now_millis: i64) -> Result<u64> {
        self.inner.purge_expired(now_millis).await
    }

    async fn queue_stats(&self) -> Result<Vec<QueueStats>> {
        self.inner.queue_stats().await
    }
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 2,
        poll_interval: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(2),
        ..WorkerConfig::default()
    }
}

/// Process tasks inline until every queue is empty
pub async fn drain(dispatcher: &Dispatcher) -> usize {
    let mut processed = 0;
    while dispatcher.process_next().await.unwrap() {
        processed += 1;
    }
    processed
}
