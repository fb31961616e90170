use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{validate_storage_path, StorageClient};
use crate::config::Config;
use crate::errors::{AppError, AppResult};

/// Fallback wait when a 429 carries no usable Retry-After header
const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

/// Client for a bucket-based REST object storage API.
///
/// Objects are written with `POST {endpoint}/storage/v1/object/{bucket}/{path}`
/// and served from `{endpoint}/storage/v1/object/public/{bucket}/{path}`.
/// Each call makes a single attempt; retrying is left to the upload queue.
pub struct HttpStorageClient {
    client: Client,
    endpoint: String,
    bucket: String,
    api_key: Option<String>,
    public_base_url: Option<String>,
}

impl HttpStorageClient {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            api_key,
            public_base_url: None,
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let mut client = Self::new(
            &config.storage_endpoint,
            &config.storage_bucket,
            config.storage_api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        client.public_base_url = config.public_base_url.clone();
        Ok(client)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.endpoint, self.bucket, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header(AUTHORIZATION, format!("Bearer {}", key))
                .header("apikey", key.as_str()),
            None => request,
        }
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> AppResult<String> {
        validate_storage_path(path)?;

        let size = data.len();
        log::debug!("POST {} ({} bytes, {})", self.object_url(path), size, content_type);

        let request = self
            .client
            .post(self.object_url(path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data);
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if status.is_success() {
            log::info!("Stored {} ({} KB)", path, size / 1024);
            return Ok(self.public_url(path));
        }

        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(classify_failure(path, status, &headers, &body))
    }

    fn public_url(&self, path: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), path),
            None => format!(
                "{}/storage/v1/object/public/{}/{}",
                self.endpoint, self.bucket, path
            ),
        }
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        validate_storage_path(path)?;

        let request = self.client.delete(self.object_url(path));
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            log::info!("Deleted {}", path);
            return Ok(());
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(path, status, &headers, &body))
    }
}

/// Map an unsuccessful response onto the retry classification
fn classify_failure(path: &str, status: StatusCode, headers: &HeaderMap, body: &str) -> AppError {
    let message: String = body.chars().take(300).collect();

    match status.as_u16() {
        429 => AppError::RateLimit {
            retry_after_ms: parse_retry_after(headers).unwrap_or(DEFAULT_RETRY_AFTER_MS),
        },
        413 => AppError::FileTooLarge {
            path: path.to_string(),
            size: 0,
            limit: 0,
        },
        408 | 500..=599 => {
            AppError::upload_failed(format!("Storage error {} for {}: {}", status, path, message))
        }
        code => AppError::StorageRejected {
            path: path.to_string(),
            status: code,
            message,
        },
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds = value.trim().parse::<f64>().ok()?;
    if seconds.is_sign_negative() {
        return None;
    }
    Some((seconds * 1000.0) as u64)
}
