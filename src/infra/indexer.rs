//! Read-only feed of past registrations, served by the indexing service.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use utoipa::ToSchema;

use crate::domain::model::StorageReference;
use crate::infra::graphql::{GraphQlClient, ServiceError};

const FEED_QUERY: &str = r#"query Feed($first: Int!) {
  imageRegistereds(first: $first) {
    id
    imageHash
    ipfsHash
    registrar
  }
}"#;

/// One `ImageRegistered` event as indexed.
///
/// Fields stay strings: the feed is for display and a malformed entry
/// should not hide the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: String,
    pub image_hash: String,
    pub ipfs_hash: String,
    pub registrar: String,
}

impl FeedEntry {
    pub fn gateway_url(&self, gateway: &str) -> String {
        StorageReference::new(self.ipfs_hash.clone()).gateway_url(gateway)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedData {
    image_registereds: Vec<FeedEntry>,
}

pub struct FeedClient {
    client: GraphQlClient,
}

impl FeedClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: GraphQlClient::new(endpoint, None, timeout)?,
        })
    }

    pub async fn recent(&self, first: u32) -> Result<Vec<FeedEntry>, ServiceError> {
        let data: FeedData = self.client.query(FEED_QUERY, json!({ "first": first })).await?;
        tracing::debug!(count = data.image_registereds.len(), "feed fetched");
        Ok(data.image_registereds)
    }
}
