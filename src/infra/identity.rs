//! Address-to-identity enrichment (ENS domains and social profiles).
//!
//! Enrichment is decoration: failures and slow answers produce no profile and
//! never fail a workflow.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::model::{Address, Profile, SocialProfile};
use crate::infra::graphql::{GraphQlClient, ServiceError};

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, address: Address) -> Result<Profile, ServiceError>;
}

const IDENTITY_QUERY: &str = r#"query Identity($address: Address, $identity: Identity) {
  Domains(input: {filter: {resolvedAddress: {_eq: $address}}, blockchain: ethereum}) {
    Domain {
      name
    }
  }
  Socials(input: {filter: {identity: {_eq: $identity}}, blockchain: ethereum}) {
    Social {
      dappName
      profileName
    }
  }
}"#;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdentityData {
    domains: Option<DomainsBlock>,
    socials: Option<SocialsBlock>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainsBlock {
    domain: Option<Vec<DomainEntry>>,
}

#[derive(Deserialize)]
struct DomainEntry {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SocialsBlock {
    social: Option<Vec<SocialEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocialEntry {
    dapp_name: Option<String>,
    profile_name: Option<String>,
}

/// Resolver backed by the Airstack GraphQL API.
pub struct AirstackResolver {
    client: GraphQlClient,
}

impl AirstackResolver {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: GraphQlClient::new(endpoint, Some(api_key.into()), timeout)?,
        })
    }
}

#[async_trait]
impl IdentityResolver for AirstackResolver {
    async fn resolve(&self, address: Address) -> Result<Profile, ServiceError> {
        let data: IdentityData = self
            .client
            .query(
                IDENTITY_QUERY,
                json!({ "address": address.to_string(), "identity": address.to_string() }),
            )
            .await?;

        let domain_name = data
            .domains
            .and_then(|d| d.domain)
            .unwrap_or_default()
            .into_iter()
            .find_map(|d| d.name);
        let socials = data
            .socials
            .and_then(|s| s.social)
            .unwrap_or_default()
            .into_iter()
            .map(|s| SocialProfile {
                dapp_name: s.dapp_name,
                profile_name: s.profile_name,
            })
            .collect();

        Ok(Profile {
            address,
            domain_name,
            socials,
        })
    }
}

/// Resolves `address` within `timeout`; any failure is logged and yields `None`.
pub async fn enrich(resolver: &Arc<dyn IdentityResolver>, address: Address, timeout: Duration) -> Option<Profile> {
    match tokio::time::timeout(timeout, resolver.resolve(address)).await {
        Ok(Ok(profile)) => Some(profile),
        Ok(Err(e)) => {
            tracing::warn!(address = %address, error = %e, "identity lookup failed");
            None
        }
        Err(_) => {
            tracing::warn!(address = %address, ?timeout, "identity lookup timed out");
            None
        }
    }
}
