//! HTTP client for a remote rating service.
//!
//! The service receives the story, the enabled dimensions, the model name
//! and the project's domain context as JSON and answers with
//! `{"dimension_scores": {...}, "rationale": "...", "suggestions": [...]}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::collaborators::{RatingError, RatingService, RawRating};
use crate::domain::{RubricDimension, Story};

const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Rating service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingClientConfig {
    /// Full URL the rating request is POSTed to.
    pub endpoint: String,
    /// Bearer token, if the service needs one.
    pub api_key: Option<String>,
    /// Model the service should rate with.
    pub model: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl Default for RatingClientConfig {
    fn default() -> Self {
        let timeout_secs = std::env::var("STORYGRADE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        RatingClientConfig {
            endpoint: std::env::var("STORYGRADE_RATING_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8787/rate".to_string()),
            api_key: std::env::var("STORYGRADE_API_KEY").ok(),
            model: std::env::var("STORYGRADE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl RatingClientConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(endpoint: &str) -> Self {
        RatingClientConfig {
            endpoint: endpoint.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct RateRequest<'a> {
    model: &'a str,
    story: &'a Story,
    dimensions: Vec<DimensionPrompt<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain_context: Option<&'a str>,
}

#[derive(Serialize)]
struct DimensionPrompt<'a> {
    id: &'a str,
    name: &'a str,
    weight: u32,
}

#[derive(Deserialize)]
struct RateResponse {
    dimension_scores: std::collections::BTreeMap<String, i64>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// [`RatingService`] backed by an HTTP endpoint.
pub struct HttpRatingService {
    config: RatingClientConfig,
    http_client: reqwest::Client,
}

impl HttpRatingService {
    pub fn new(config: RatingClientConfig) -> Result<Self, RatingError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("storygrade/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| RatingError::Unavailable(e.to_string()))?;

        Ok(HttpRatingService {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self, RatingError> {
        Self::new(RatingClientConfig::from_env())
    }

    pub fn config(&self) -> &RatingClientConfig {
        &self.config
    }

    fn map_transport(&self, err: reqwest::Error) -> RatingError {
        if err.is_timeout() {
            RatingError::Timeout(self.config.timeout)
        } else {
            RatingError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl RatingService for HttpRatingService {
    #[instrument(skip(self, story, dimensions, domain_context), fields(story_key = %story.key, model = %self.config.model))]
    async fn rate(
        &self,
        story: &Story,
        dimensions: &[RubricDimension],
        domain_context: Option<&str>,
    ) -> Result<RawRating, RatingError> {
        let request = RateRequest {
            model: &self.config.model,
            story,
            dimensions: dimensions
                .iter()
                .map(|d| DimensionPrompt {
                    id: &d.id,
                    name: &d.name,
                    weight: d.weight,
                })
                .collect(),
            domain_context,
        };

        let mut builder = self.http_client.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RatingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|e| self.map_transport(e))?;
        debug!(bytes = body.len(), "rating response received");
        parse_rating_response(&body)
    }
}

/// Decode a rating response body.
pub fn parse_rating_response(body: &[u8]) -> Result<RawRating, RatingError> {
    let response: RateResponse = serde_json::from_slice(body)
        .map_err(|e| RatingError::MalformedResponse(e.to_string()))?;
    Ok(RawRating {
        dimension_scores: response.dimension_scores,
        rationale: response.rationale,
        suggestions: response.suggestions,
    })
}
