use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::anthropic::model::{ErrorEnvelope, MessageRequest, MessageResponse};

pub mod model;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/";
const RATE_LIMIT_ERROR_TYPE: &str = "rate_limit_error";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("rate limited by model service: {0}")]
    RateLimited(String),
    #[error("model service error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to reach model service: {0}")]
    Transport(String),
    #[error("invalid model service response: {0}")]
    Decode(String),
    #[error("rate limited by model service after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ModelError>,
    },
}

impl ModelError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ModelError::RateLimited(_))
    }
}

/// The external generative model, as consumed by the conversion worker.
#[async_trait]
pub trait ModelService: Send + Sync {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, ModelError>;
}

#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    base_url: Url,
    api_key: String,
    version: String,
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    pub fn new(api_key: String, version: String) -> anyhow::Result<Self> {
        let base_url = Url::parse(ANTHROPIC_API_BASE).context("invalid default Anthropic URL")?;
        Self::with_base_url(api_key, version, base_url)
    }

    pub fn with_base_url(api_key: String, version: String, base_url: Url) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("pagebook/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
            version,
        })
    }

    pub fn build_request(&self, body: &MessageRequest) -> anyhow::Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/messages")
            .context("invalid Anthropic base URL")?;
        self.http
            .post(endpoint)
            .header("x-api-key", self.api_key.trim())
            .header("anthropic-version", &self.version)
            .header("content-type", "application/json")
            .json(body)
            .build()
            .context("failed to build Anthropic request")
    }

    async fn execute(&self, body: &MessageRequest) -> Result<MessageResponse, ModelError> {
        let request = self
            .build_request(body)
            .map_err(|e| ModelError::Transport(format!("{:#}", e)))?;
        debug!(url = %request.url(), model = %body.model, "sending model request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = res.status();
        if status.is_success() {
            let text = res
                .text()
                .await
                .map_err(|e| ModelError::Transport(e.to_string()))?;
            return serde_json::from_str(&text).map_err(|e| ModelError::Decode(e.to_string()));
        }

        let body = res.text().await.unwrap_or_default();
        Err(classify_failure(status, body))
    }
}

/// Map a non-success response to a `ModelError`. Rate limiting is signalled
/// by HTTP 429 or by a `rate_limit_error` body on any status.
pub fn classify_failure(status: StatusCode, body: String) -> ModelError {
    let coded_rate_limit = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|env| env.error.kind == RATE_LIMIT_ERROR_TYPE)
        .unwrap_or(false);
    if status == StatusCode::TOO_MANY_REQUESTS || coded_rate_limit {
        warn!(%status, "rate limited by model service");
        return ModelError::RateLimited(body);
    }
    let body = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) if !env.error.message.is_empty() => {
            format!("{}: {}", env.error.kind, env.error.message)
        }
        _ => body,
    };
    ModelError::Api {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl ModelService for AnthropicClient {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, ModelError> {
        self.execute(request).await
    }
}
