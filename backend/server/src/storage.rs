//! # Object Storage
//!
//! Resolves where a download actually goes.
//!
//! - `direct`: hand back the stored `fileUrl` as is
//! - `signed`: ask the storage service for a short-lived signed URL for `fileKey`
//!
//! The server never proxies file bytes, it only issues the URL the client is sent to.

use std::time::Duration;

use async_trait::async_trait;
use catalog::DownloadTarget;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Collaborator};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn download_url(&self, target: &DownloadTarget) -> Result<String, AppError>;
}

pub struct DirectStorage;

#[async_trait]
impl ObjectStorage for DirectStorage {
    async fn download_url(&self, target: &DownloadTarget) -> Result<String, AppError> {
        Ok(target.file_url.clone())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignRequest<'a> {
    key: &'a str,
    expires_in: u64,
}

#[derive(Deserialize)]
struct PresignResponse {
    url: String,
}

pub struct SignedStorage {
    client: Client,
    endpoint: String,
    api_key: String,
    ttl: Duration,
}

impl SignedStorage {
    pub fn new(client: Client, base_url: &str, api_key: String, ttl: Duration) -> Self {
        Self {
            client,
            endpoint: format!("{}/v1/presign", base_url.trim_end_matches('/')),
            api_key,
            ttl,
        }
    }
}

#[async_trait]
impl ObjectStorage for SignedStorage {
    async fn download_url(&self, target: &DownloadTarget) -> Result<String, AppError> {
        let unavailable = |e| AppError::http(Collaborator::Storage, e);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&PresignRequest {
                key: &target.file_key,
                expires_in: self.ttl.as_secs(),
            })
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;

        let presigned: PresignResponse = response.json().await.map_err(unavailable)?;

        debug!("Signed download for {}", target.file_key);

        Ok(presigned.url)
    }
}
