use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RekapError, RekapResult};

const APP_VERSION_HEADER: &str = "x-app-version";

/// Calls the rekap backend on behalf of the client controller
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// GET `path` (including any query string) and decode the JSON reply
    async fn get(&self, path: &str) -> RekapResult<Value>;

    /// POST a JSON body to `path` and decode the JSON reply
    async fn post(&self, path: &str, body: &Value) -> RekapResult<Value>;
}

/// [`ApiClient`] over HTTP
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
    version: String,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>, version: impl Into<String>) -> RekapResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RekapError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            version: version.into(),
        })
    }

    async fn decode(response: reqwest::Response) -> RekapResult<Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Prefer the backend's own error text when it sent one
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
            return Err(RekapError::RemoteService {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn get(&self, path: &str) -> RekapResult<Value> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(APP_VERSION_HEADER, &self.version)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> RekapResult<Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header(APP_VERSION_HEADER, &self.version)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }
}
