/// Yandex Cloud operation API client
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::models::*;
use crate::config::ClientConfig;
use crate::operation::OperationStatusClient;

/// Public endpoint of the operation service
pub const DEFAULT_ENDPOINT: &str = "https://operation.api.cloud.yandex.net";

/// HTTP client for the operation service
#[derive(Clone)]
pub struct OperationClient {
    client: Client,
    endpoint: Url,
}

impl OperationClient {
    /// Create a new client authenticated with an IAM token
    pub fn new(endpoint: &str, iam_token: &str, request_timeout: Duration) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("Invalid endpoint URL: {}", endpoint))?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("Endpoint cannot be used as a base URL: {}", endpoint);
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", iam_token))
                .context("Invalid IAM token format")?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, endpoint })
    }

    /// Create a client from loaded configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let token = config.get_token()?;
        Self::new(&config.endpoint, &token, config.request_timeout())
    }

    /// Build `{endpoint}/operations/{id}[:{action}]`
    fn operation_url(&self, operation_id: &str, action: Option<&str>) -> Result<Url> {
        if operation_id.is_empty() {
            anyhow::bail!("Operation ID cannot be empty");
        }

        let segment = match action {
            Some(action) => format!("{}:{}", operation_id, action),
            None => operation_id.to_string(),
        };

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Endpoint cannot be used as a base URL"))?
            .pop_if_empty()
            .push("operations")
            .push(&segment);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send GET request")?;

        self.handle_response(response).await
    }

    async fn post<T: Serialize, R: DeserializeOwned>(&self, url: Url, body: &T) -> Result<R> {
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send POST request")?;

        self.handle_response(response).await
    }

    /// Handle API response, checking for errors
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .context("Failed to parse API response")
        } else {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                anyhow::bail!(
                    "API error: {} - {}",
                    error_response.code,
                    error_response.message
                );
            }

            anyhow::bail!("API request failed with status {}: {}", status, error_text)
        }
    }

    /// Get the current state of an operation
    pub async fn get_operation(&self, operation_id: &str) -> Result<Operation> {
        let url = self.operation_url(operation_id, None)?;
        self.get(url).await
    }

    /// Request cancellation of an operation
    ///
    /// Not every service supports cancellation; the API reports that as an error.
    pub async fn cancel_operation(&self, operation_id: &str) -> Result<Operation> {
        let url = self.operation_url(operation_id, Some("cancel"))?;
        self.post(url, &serde_json::json!({})).await
    }
}

#[async_trait]
impl OperationStatusClient for OperationClient {
    async fn get_operation(&self, operation_id: &str) -> Result<Operation> {
        OperationClient::get_operation(self, operation_id).await
    }
}
