// Responsible for all communication with the wallet and the chain behind it.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// EIP-1193 error codes the workflows care about.
pub const USER_REJECTED: i64 = 4001;
pub const UNAUTHORIZED: i64 = 4100;
pub const UNSUPPORTED_METHOD: i64 = 4200;
pub const DISCONNECTED: i64 = 4900;
pub const CHAIN_DISCONNECTED: i64 = 4901;
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// No provider is reachable (extension missing, endpoint down).
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// The user dismissed or declined the prompt.
    #[error("user rejected the request: {0}")]
    UserRejected(String),
    /// The provider answered with an error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        /// Hex revert data when the node returned any.
        data: Option<String>,
    },
    /// The provider answered, but not with what the method promises.
    #[error("unexpected response to {method}: {detail}")]
    InvalidResponse { method: String, detail: String },
}

impl ProviderError {
    /// Classifies a JSON-RPC error object.
    pub fn from_rpc_error(error: &Value) -> Self {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown RPC error")
            .to_string();

        match code {
            USER_REJECTED => Self::UserRejected(message),
            DISCONNECTED | CHAIN_DISCONNECTED => Self::Unavailable(message),
            _ => Self::Rpc {
                code,
                message,
                data: revert_data(error.get("data")),
            },
        }
    }

    pub fn invalid_response(method: &str, detail: impl Into<String>) -> Self {
        Self::InvalidResponse {
            method: method.to_string(),
            detail: detail.into(),
        }
    }
}

/// Nodes nest revert data differently: a bare hex string, `{ data: "0x.." }`
/// or `{ originalError: { data: "0x.." } }`.
fn revert_data(data: Option<&Value>) -> Option<String> {
    let data = data?;
    if let Some(s) = data.as_str() {
        return s.starts_with("0x").then(|| s.to_string());
    }
    revert_data(data.get("data")).or_else(|| revert_data(data.get("originalError")))
}

/// The injected signing capability: an EIP-1193 style `request({ method, params })`.
///
/// Everything that touches the wallet or the chain goes through this trait, so
/// a test can hand the workflows an in-process double instead of a live wallet.
#[async_trait]
pub trait SignerProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

#[async_trait]
impl<T: SignerProvider + ?Sized> SignerProvider for Arc<T> {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        (**self).request(method, params).await
    }
}

/// Parses a `0x` quantity such as `"0xaa36a7"`.
pub fn parse_quantity(method: &str, value: &Value) -> Result<u64, ProviderError> {
    let s = value
        .as_str()
        .ok_or_else(|| ProviderError::invalid_response(method, format!("expected hex quantity, got {}", value)))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ProviderError::invalid_response(method, format!("bad quantity {}: {}", s, e)))
}

pub fn to_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

/// A wallet reached over JSON-RPC/HTTP: a node with unlocked accounts or a
/// remote signer. Accounts are pre-authorized, so `eth_requestAccounts` is
/// answered with `eth_accounts`.
#[derive(Debug)]
pub struct HttpProvider {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SignerProvider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let wire_method = match method {
            "eth_requestAccounts" => "eth_accounts",
            other => other,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": wire_method,
            "params": params,
            "id": id,
        });
        tracing::debug!(method = wire_method, id, "rpc request");

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Unavailable(format!("{}: request timed out", self.url))
                } else {
                    ProviderError::Unavailable(format!("{}: {}", self.url, e))
                }
            })?;

        if !resp.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "{}: HTTP {}",
                self.url,
                resp.status()
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(method, format!("invalid JSON response: {}", e)))?;

        if let Some(error) = json.get("error") {
            let err = ProviderError::from_rpc_error(error);
            tracing::debug!(method = wire_method, id, error = %err, "rpc error");
            return Err(err);
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| ProviderError::invalid_response(method, "JSON-RPC response missing 'result' field"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rejection_is_classified() {
        let err = ProviderError::from_rpc_error(&json!({"code": 4001, "message": "User denied"}));
        assert_eq!(err, ProviderError::UserRejected("User denied".into()));
    }

    #[test]
    fn revert_data_is_found_when_nested() {
        let err = ProviderError::from_rpc_error(&json!({
            "code": -32000,
            "message": "execution reverted",
            "data": {"originalError": {"data": "0x08c379a0"}}
        }));
        match err {
            ProviderError::Rpc { data, .. } => assert_eq!(data.as_deref(), Some("0x08c379a0")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn quantities_round_trip() {
        assert_eq!(to_quantity(11155111), "0xaa36a7");
        assert_eq!(parse_quantity("eth_chainId", &json!("0xaa36a7")).unwrap(), 11155111);
        assert!(parse_quantity("eth_chainId", &json!(5)).is_err());
    }
}
