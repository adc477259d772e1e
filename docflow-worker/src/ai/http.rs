//! JSON-over-HTTP AI provider client
//!
//! Every operation is a `POST {base_url}/v1/{operation}` with a JSON body
//! and a JSON response. Requests are rate limited client-side with a token
//! bucket so a burst of enrichment tasks cannot overrun the provider.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::{
    ContextCleanRequest, QualityResponse, ReferencesResponse, TagsResponse, TextRequest,
    TextResponse,
};
use super::{AiError, AiProvider, AiResult, Reference};
use crate::models::{AiDetection, EditorialAnalysis, Synopsis, TextQualityScore};

/// Longest response body excerpt kept in status errors
const ERROR_BODY_LIMIT: usize = 200;

/// Connection settings for [`HttpAiProvider`]
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub requests_per_second: u32,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for AiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            requests_per_second: 5,
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

pub struct HttpAiProvider {
    /// HTTP client with configured timeouts
    client: Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HttpAiProvider {
    /// Build a client from configuration
    ///
    /// A zero `requests_per_second` is treated as 1.
    pub fn new(config: AiClientConfig) -> AiResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.filter(|k| !k.is_empty()),
            rate_limiter,
        })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/v1/{}", self.base_url, operation)
    }

    async fn post<B, R>(&self, operation: &str, body: &B) -> AiResult<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        // Wait for a rate limiter permit
        self.rate_limiter.until_ready().await;

        let url = self.endpoint(operation);
        tracing::debug!(operation, url = %url, "Calling AI provider");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::warn!(operation, status = status.as_u16(), "AI provider returned error status");
            return Err(AiError::Status(status.as_u16(), excerpt));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| AiError::Parse(format!("{} response: {}", operation, e)))
    }
}

fn map_request_error(err: reqwest::Error) -> AiError {
    if err.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Network(err.to_string())
    }
}

#[async_trait]
impl AiProvider for HttpAiProvider {
    async fn generate_synopsis(&self, text: &str) -> AiResult<Synopsis> {
        self.post("synopsis", &TextRequest { text }).await
    }

    async fn clean_text(&self, text: &str) -> AiResult<String> {
        let response: TextResponse = self.post("clean-text", &TextRequest { text }).await?;
        Ok(response.text)
    }

    async fn clean_text_with_context(
        &self,
        text: &str,
        offline_template: &str,
        original_markup: &str,
    ) -> AiResult<String> {
        let request = ContextCleanRequest {
            text,
            offline_template,
            original_markup,
        };
        let response: TextResponse = self.post("clean-text-with-context", &request).await?;
        Ok(response.text)
    }

    async fn editorial_analysis(&self, text: &str) -> AiResult<EditorialAnalysis> {
        self.post("editorial-analysis", &TextRequest { text }).await
    }

    async fn generate_tags(&self, text: &str) -> AiResult<Vec<String>> {
        let response: TagsResponse = self.post("tags", &TextRequest { text }).await?;
        Ok(response.tags)
    }

    async fn extract_references(&self, text: &str) -> AiResult<Vec<Reference>> {
        let response: ReferencesResponse = self.post("references", &TextRequest { text }).await?;
        Ok(response.references)
    }

    async fn detect_ai_content(&self, text: &str) -> AiResult<AiDetection> {
        self.post("detect-ai", &TextRequest { text }).await
    }

    async fn score_text_quality(&self, text: &str) -> AiResult<TextQualityScore> {
        let response: QualityResponse = self.post("quality", &TextRequest { text }).await?;
        Ok(TextQualityScore::new(
            response.score,
            response.reason,
            response.categories,
            response.quality_indicators,
            response.problems_detected,
            true,
        ))
    }
}
