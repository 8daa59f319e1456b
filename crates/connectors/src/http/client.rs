use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use engine_core::{
    error::ExtractError,
    retry::{RetryError, RetryPolicy},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends requests for one source and turns responses into typed errors:
/// 401/403 are auth failures, 429 is throttling, 408/5xx and transport
/// failures are transient, anything else is fatal.
#[derive(Clone)]
pub struct ApiClient {
    source_name: String,
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl ApiClient {
    pub fn new(source_name: &str, transport: Arc<dyn HttpTransport>) -> Self {
        ApiClient {
            source_name: source_name.to_string(),
            transport,
            policy: RetryPolicy::for_http(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Sends the request with retries and decodes the body as JSON.
    pub async fn send_json(&self, request: HttpRequest) -> Result<serde_json::Value, ExtractError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| ExtractError::Decode(e.to_string()))
    }

    pub async fn send(&self, request: HttpRequest) -> Result<String, ExtractError> {
        let result = self
            .policy
            .run(
                || {
                    let request = request.clone();
                    async move { self.send_once(request).await }
                },
                |err: &ExtractError| {
                    let disposition = err.disposition();
                    warn!(source = %self.source_name, error = %err, ?disposition, "Upstream request failed");
                    disposition
                },
            )
            .await;

        result.map_err(RetryError::into_inner)
    }

    async fn send_once(&self, request: HttpRequest) -> Result<String, ExtractError> {
        debug!(source = %self.source_name, url = %request.url, "Sending request");
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ExtractError::Network(e.message))?;
        self.classify(response)
    }

    fn classify(&self, response: HttpResponse) -> Result<String, ExtractError> {
        match response.status {
            200..=299 => Ok(response.body),
            401 | 403 => Err(ExtractError::Auth {
                source_name: self.source_name.clone(),
                message: format!("HTTP {}: {}", response.status, snippet(&response.body)),
            }),
            429 => Err(ExtractError::RateLimited {
                source_name: self.source_name.clone(),
                retry_after: response.retry_after,
            }),
            status => Err(ExtractError::Upstream {
                status,
                message: snippet(&response.body),
            }),
        }
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
