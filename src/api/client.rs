use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{
    AttachedFile, ConversationRequest, ConversationResponse, GenerateClaimsRequest,
    GenerateClaimsResponse, StartMiningRequest, StartMiningResponse,
};
use super::MiningApi;
use crate::config::{ApiConfig, RequestConfig};
use crate::error::{ApiError, ApiResult};

/// Client for the argument-mining HTTP API
#[derive(Clone)]
pub struct MiningClient {
    client: Client,
    base_url: String,
    request_config: RequestConfig,
}

impl MiningClient {
    /// Create a new mining client
    pub fn new(config: &ApiConfig, request_config: RequestConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body once, no retries.
    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> ApiResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "Calling mining API");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Self::decode(response, path).await
    }

    /// POST a JSON body, retrying with exponential backoff.
    ///
    /// Only for calls that carry no session state.
    async fn post_json_with_retry<Req, Resp>(&self, path: &str, body: &Req) -> ApiResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    path = %path,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying mining API request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.post_json(path, body).await {
                Ok(response) => {
                    info!(
                        path = %path,
                        latency_ms = start.elapsed().as_millis(),
                        "Mining API call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        path = %path,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Mining API call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(ApiError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    fn classify(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            ApiError::Http(e)
        }
    }

    async fn decode<Resp: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> ApiResult<Resp> {
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse {
                message: format!("Failed to parse {} response: {}", path, e),
            })
    }
}

#[async_trait]
impl MiningApi for MiningClient {
    async fn start_mining(&self, request: StartMiningRequest) -> ApiResult<StartMiningResponse> {
        let start = Instant::now();
        let response: StartMiningResponse = self.post_json("/arguments/mine", &request).await?;

        info!(
            status = %response.status,
            files = request.files.len(),
            latency_ms = start.elapsed().as_millis(),
            "Start mining call returned"
        );
        Ok(response)
    }

    async fn continue_conversation(
        &self,
        request: ConversationRequest,
    ) -> ApiResult<ConversationResponse> {
        let start = Instant::now();
        let response: ConversationResponse =
            self.post_json("/arguments/message", &request).await?;

        info!(
            status = %response.status,
            messages = response.messages.len(),
            latency_ms = start.elapsed().as_millis(),
            "Conversation turn returned"
        );
        Ok(response)
    }

    async fn generate_claims(&self, question: &str) -> ApiResult<Vec<String>> {
        let request = GenerateClaimsRequest {
            question: question.to_string(),
        };
        let response: GenerateClaimsResponse = self
            .post_json_with_retry("/generate_hypotheses/", &request)
            .await?;
        Ok(response.claims)
    }

    async fn attach_file(&self, path: &Path) -> ApiResult<AttachedFile> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        info!(file = %file_name, bytes = bytes.len(), "Uploading attachment");

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(format!("{}/arguments/attach", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Self::decode(response, "/arguments/attach").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ApiConfig {
            api_key: "test_key".to_string(),
            base_url: "https://example.test/".to_string(),
        };

        let client = MiningClient::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://example.test");
    }
}
