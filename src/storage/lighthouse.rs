// Uploads images to Lighthouse (IPFS) over its HTTP API.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::error::Error;
use crate::domain::model::{ImageAsset, StorageReference};
use crate::storage::{ContentStore, ProgressObserver};

pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Deserialize)]
struct AddResult {
    #[serde(rename = "Hash")]
    hash: String,
}

/// The node answers `{ "Hash": .. }`; the SDK wraps it as `{ "data": { "Hash": .. } }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AddResponse {
    Wrapped { data: AddResult },
    Bare(AddResult),
}

impl AddResponse {
    fn into_hash(self) -> String {
        match self {
            Self::Wrapped { data } => data.hash,
            Self::Bare(result) => result.hash,
        }
    }
}

pub struct LighthouseUploader {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
    gateway: String,
}

impl LighthouseUploader {
    pub fn new(
        upload_url: impl Into<String>,
        api_key: impl Into<String>,
        gateway: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::UploadFailed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            upload_url: upload_url.into(),
            api_key: api_key.into(),
            gateway: gateway.into(),
        })
    }

    /// Multipart `file` part whose body reports progress as it is read.
    fn file_part(asset: &ImageAsset, progress: Arc<dyn ProgressObserver>) -> Result<Part, Error> {
        let bytes = asset.shared_bytes();
        let total = bytes.len() as u64;
        let ranges: Vec<(usize, usize)> = (0..bytes.len())
            .step_by(UPLOAD_CHUNK_SIZE)
            .map(|start| (start, (start + UPLOAD_CHUNK_SIZE).min(bytes.len())))
            .collect();

        let mut sent = 0u64;
        let stream = futures::stream::iter(ranges).map(move |(start, end)| {
            let chunk = bytes[start..end].to_vec();
            sent += chunk.len() as u64;
            progress.on_progress(sent, total);
            Ok::<_, std::io::Error>(chunk)
        });

        Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(asset.file_name().to_string())
            .mime_str(asset.media_type())
            .map_err(|e| Error::UploadFailed(format!("invalid media type {}: {}", asset.media_type(), e)))
    }
}

#[async_trait]
impl ContentStore for LighthouseUploader {
    async fn upload(
        &self,
        asset: &ImageAsset,
        progress: Arc<dyn ProgressObserver>,
    ) -> Result<StorageReference, Error> {
        if asset.is_empty() {
            return Err(Error::UploadFailed("cannot upload an empty file".to_string()));
        }

        let form = Form::new().part("file", Self::file_part(asset, progress)?);
        let resp = self
            .client
            .post(&self.upload_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::UploadFailed(format!("{}: {}", self.upload_url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::UploadFailed(format!(
                "storage service returned {}: {}",
                status,
                body.trim()
            )));
        }

        let parsed: AddResponse = resp
            .json()
            .await
            .map_err(|e| Error::UploadFailed(format!("unexpected storage response: {}", e)))?;
        let cid = parsed.into_hash();
        if cid.is_empty() {
            return Err(Error::UploadFailed("storage service returned an empty hash".to_string()));
        }

        tracing::info!(file = asset.file_name(), cid = %cid, bytes = asset.len(), "image uploaded");
        Ok(StorageReference::new(cid))
    }

    fn gateway_url(&self, cid: &StorageReference) -> String {
        cid.gateway_url(&self.gateway)
    }
}
