//! Minimal GraphQL-over-HTTP client shared by the identity and feed services.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Errors from the optional read-only collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("GraphQL errors from {endpoint}: {messages}")]
    GraphQl { endpoint: String, messages: String },
    #[error("failed to decode response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Clone)]
pub struct GraphQlClient {
    client: reqwest::Client,
    endpoint: String,
    authorization: Option<String>,
}

impl GraphQlClient {
    pub fn new(
        endpoint: impl Into<String>,
        authorization: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ServiceError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;
        Ok(Self {
            client,
            endpoint,
            authorization,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, ServiceError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(auth) = &self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let resp = request.send().await.map_err(|source| ServiceError::Http {
            endpoint: self.endpoint.clone(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GraphQlResponse = resp.json().await.map_err(|e| ServiceError::Decode {
            endpoint: self.endpoint.clone(),
            detail: e.to_string(),
        })?;

        if !parsed.errors.is_empty() {
            let messages = parsed
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ServiceError::GraphQl {
                endpoint: self.endpoint.clone(),
                messages,
            });
        }

        let data = parsed.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| ServiceError::Decode {
            endpoint: self.endpoint.clone(),
            detail: e.to_string(),
        })
    }
}
