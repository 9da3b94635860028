use crate::domain::model::Profile;
use crate::infra::evm::{RegistryClient, SignerProvider};
use crate::infra::identity::IdentityResolver;
use crate::infra::indexer::{FeedClient, FeedEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use utoipa::{IntoParams, ToSchema};

/// Upper bound on uploaded image bodies.
pub const MAX_IMAGE_BYTES: usize = 25 * 1024 * 1024;

pub const DEFAULT_FEED_SIZE: u32 = 20;
pub const MAX_FEED_SIZE: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn SignerProvider>,
    pub chain_id: u64,
    pub registry: Arc<RegistryClient>,
    /// Identity enrichment; `None` when no API key is configured.
    pub resolver: Option<Arc<dyn IdentityResolver>>,
    pub identity_timeout: Duration,
    /// Registration feed; `None` when no indexer is configured.
    pub feed: Option<Arc<FeedClient>>,
    pub ipfs_gateway: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HashResponse {
    /// `0x` + 64 hex chars.
    pub hash: String,
    pub media_type: String,
    pub size: usize,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Unregistered,
    Registered,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct VerifyResponse {
    pub hash: String,
    pub status: RegistrationStatus,
    /// EIP-55 checksummed registrant, when registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrant: Option<String>,
    pub message: String,
    /// ENS name and social profiles of the registrant, if they resolved in time.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub profile: Option<Profile>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct FeedItem {
    #[serde(flatten)]
    pub entry: FeedEntry,
    pub gateway_url: String,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedQuery {
    /// Number of registrations to return (default 20, max 100).
    pub first: Option<u32>,
}
