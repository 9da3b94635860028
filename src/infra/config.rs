//! Centralized configuration (environment variables + defaults).

use std::time::Duration;

use crate::domain::model::Address;

/// ImageRegistry deployment on Sepolia.
pub const DEFAULT_REGISTRY_ADDRESS: &str = "0xCC69a36c79fe279af20bF1e3149b61B3967b9eb5";
pub const DEFAULT_LIGHTHOUSE_UPLOAD_URL: &str = "https://node.lighthouse.storage/api/v0/add";
pub const DEFAULT_IPFS_GATEWAY: &str = "gateway.lighthouse.storage";
pub const DEFAULT_AIRSTACK_URL: &str = "https://api.airstack.xyz/gql";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint that acts as the wallet provider (required).
    pub rpc_url: String,
    /// Chain the wallet must be on before anything is signed or written (required).
    pub chain_id: u64,
    pub registry_address: Address,
    /// Storage API key; uploads are refused when absent.
    pub lighthouse_api_key: Option<String>,
    pub lighthouse_upload_url: String,
    pub ipfs_gateway: String,
    /// Identity enrichment is skipped when absent.
    pub airstack_api_key: Option<String>,
    pub airstack_url: String,
    /// Feed is unavailable when absent.
    pub subgraph_url: Option<String>,
    pub receipt_poll_interval: Duration,
    pub identity_timeout: Duration,
    pub http_timeout: Duration,
    pub api_bind_addr: String,
}

impl Config {
    /// Loads `.env` (if present) and reads the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let rpc_url = get("RPC_URL").ok_or(ConfigError::Missing("RPC_URL"))?;
        let chain_id = parse_chain_id(&get("CHAIN_ID").ok_or(ConfigError::Missing("CHAIN_ID"))?)?;

        let registry_address = get("REGISTRY_ADDRESS")
            .unwrap_or_else(|| DEFAULT_REGISTRY_ADDRESS.to_string())
            .parse::<Address>()
            .map_err(|reason| ConfigError::Invalid {
                name: "REGISTRY_ADDRESS",
                reason,
            })?;

        Ok(Self {
            rpc_url,
            chain_id,
            registry_address,
            lighthouse_api_key: get("LIGHTHOUSE_API_KEY"),
            lighthouse_upload_url: get("LIGHTHOUSE_UPLOAD_URL")
                .unwrap_or_else(|| DEFAULT_LIGHTHOUSE_UPLOAD_URL.to_string()),
            ipfs_gateway: get("IPFS_GATEWAY").unwrap_or_else(|| DEFAULT_IPFS_GATEWAY.to_string()),
            airstack_api_key: get("AIRSTACK_API_KEY"),
            airstack_url: get("AIRSTACK_URL").unwrap_or_else(|| DEFAULT_AIRSTACK_URL.to_string()),
            subgraph_url: get("SUBGRAPH_URL"),
            receipt_poll_interval: Duration::from_millis(parse_u64(
                "RECEIPT_POLL_INTERVAL_MS",
                get("RECEIPT_POLL_INTERVAL_MS"),
                2_000,
            )?),
            identity_timeout: Duration::from_millis(parse_u64(
                "IDENTITY_TIMEOUT_MS",
                get("IDENTITY_TIMEOUT_MS"),
                3_000,
            )?),
            http_timeout: Duration::from_secs(parse_u64(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                30,
            )?),
            api_bind_addr: get("API_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        })
    }
}

/// Accepts decimal (`11155111`) or hex (`0xaa36a7`).
pub fn parse_chain_id(raw: &str) -> Result<u64, ConfigError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| ConfigError::Invalid {
        name: "CHAIN_ID",
        reason: e.to_string(),
    })
}

fn parse_u64(name: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}
