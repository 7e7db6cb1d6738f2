//! Model gateway: prompt building, the HTTP call with bounded retry, and
//! normalization of whatever the model answers.

mod normalize;
mod prompt;
mod transport;

pub use normalize::{normalize, parse_json};
pub use prompt::build_prompt;
pub use transport::{
    API_KEY_HEADER, DEFAULT_ENDPOINT, GenerateContentRequest, GenerateContentResponse,
    HttpTransport, ModelTransport, TransportError, TransportResponse,
};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::credential::Credential;
use crate::types::{ModelResult, PageContext, PredefinedTour};

/// Attempts per generation, including the first one.
pub const MAX_ATTEMPTS: u32 = 3;
/// Delay before the first retry; doubles for each further retry.
pub const BASE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("ModelCallError: request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("ModelCallError: server error ({status}) after {attempts} attempts: {body}")]
    Server {
        status: u16,
        attempts: u32,
        body: String,
    },
    #[error("ModelCallError: network error after {attempts} attempts: {message}")]
    Network { attempts: u32, message: String },
    #[error("ModelCallError: malformed response envelope: {0}")]
    Envelope(String),
    #[error("EmptyModelOutput")]
    EmptyOutput,
    #[error("UnparsableModelOutput: {0}")]
    Unparsable(String),
}

/// Normalized result plus the text it came from.
#[derive(Debug, Clone)]
pub struct Generation {
    pub result: ModelResult,
    pub raw_text: String,
}

/// Delay slept after failed attempt number `attempt` (1-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt.saturating_sub(1).min(8))
}

pub struct ModelGateway {
    transport: Arc<dyn ModelTransport>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl ModelGateway {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self {
            transport,
            max_attempts: MAX_ATTEMPTS,
            base_backoff: BASE_BACKOFF,
        }
    }

    /// Builds the prompt, calls the model and normalizes its answer.
    pub async fn generate(
        &self,
        credential: &Credential,
        prompt: &str,
        context: &PageContext,
        existing: Option<&PredefinedTour>,
    ) -> Result<Generation, GatewayError> {
        let text = build_prompt(prompt, context, existing);
        debug!(chars = text.len(), "built model prompt");

        let request = GenerateContentRequest::from_text(text);
        let body = self.call_with_retry(credential, &request).await?;

        let envelope: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Envelope(e.to_string()))?;
        let raw_text = envelope
            .first_text()
            .ok_or(GatewayError::EmptyOutput)?
            .to_string();
        debug!("model says: {}", raw_text);

        let parsed = parse_json(&raw_text).ok_or_else(|| {
            let preview: String = raw_text.chars().take(200).collect();
            GatewayError::Unparsable(preview)
        })?;

        let result = normalize(parsed, existing);
        info!(kind = result.kind(), "model result normalized");
        Ok(Generation { result, raw_text })
    }

    async fn call_with_retry(
        &self,
        credential: &Credential,
        request: &GenerateContentRequest,
    ) -> Result<String, GatewayError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match self.transport.post(credential, request).await {
                Ok(resp) if (200..300).contains(&resp.status) => return Ok(resp.body),
                Ok(resp) if resp.status >= 500 => GatewayError::Server {
                    status: resp.status,
                    attempts: attempt,
                    body: resp.body,
                },
                Ok(resp) => {
                    warn!(status = resp.status, "model request rejected");
                    return Err(GatewayError::Rejected {
                        status: resp.status,
                        body: resp.body,
                    });
                }
                Err(e) => GatewayError::Network {
                    attempts: attempt,
                    message: e.0,
                },
            };

            if attempt >= self.max_attempts {
                warn!(attempts = attempt, "model call failed: {}", failure);
                return Err(failure);
            }
            let delay = backoff_delay(self.base_backoff, attempt);
            warn!(attempt, ?delay, "model call failed, retrying: {}", failure);
            tokio::time::sleep(delay).await;
        }
    }
}
