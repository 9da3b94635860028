//! Wallet connection and message signing over an injected [`SignerProvider`].

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::crypto::eth::recover_personal_signer;
use crate::crypto::hashing::signing_payload;
use crate::domain::error::Error;
use crate::domain::model::{Address, ContentHash, Signature, WalletIdentity};
use crate::infra::evm::provider::{
    parse_quantity, to_quantity, ProviderError, SignerProvider, METHOD_NOT_FOUND, UNAUTHORIZED,
    UNRECOGNIZED_CHAIN, UNSUPPORTED_METHOD,
};

fn parse_accounts(value: &Value) -> Result<Vec<Address>, Error> {
    let list = value.as_array().ok_or_else(|| {
        Error::WalletUnavailable(format!("eth_requestAccounts returned {}", value))
    })?;
    list.iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| Error::WalletUnavailable(format!("account is not a string: {}", v)))?
                .parse::<Address>()
                .map_err(Error::WalletUnavailable)
        })
        .collect()
}

/// Maps a provider failure during account access.
fn connect_error(err: ProviderError) -> Error {
    match err {
        ProviderError::UserRejected(msg) => Error::WalletRejected(msg),
        ProviderError::Rpc { code: UNAUTHORIZED, message, .. } => Error::WalletRejected(message),
        ProviderError::Unavailable(msg) => Error::WalletUnavailable(msg),
        other => Error::WalletUnavailable(other.to_string()),
    }
}

/// Obtains a usable [`WalletIdentity`] on the target chain.
///
/// Connections are serialized: concurrent callers wait for the prompt in
/// flight and then share its result instead of opening a second prompt.
pub struct WalletConnector {
    provider: Arc<dyn SignerProvider>,
    target_chain_id: u64,
    current: Mutex<Option<WalletIdentity>>,
}

impl WalletConnector {
    pub fn new(provider: Arc<dyn SignerProvider>, target_chain_id: u64) -> Self {
        Self {
            provider,
            target_chain_id,
            current: Mutex::new(None),
        }
    }

    pub fn target_chain_id(&self) -> u64 {
        self.target_chain_id
    }

    pub async fn current(&self) -> Option<WalletIdentity> {
        *self.current.lock().await
    }

    pub async fn connect(&self) -> Result<WalletIdentity, Error> {
        let mut current = self.current.lock().await;

        if let Some(identity) = *current {
            // Reconfirm without prompting: the wallet may have moved on.
            if self.still_active(&identity).await {
                return Ok(identity);
            }
            tracing::info!(address = %identity.address, "wallet session changed; reconnecting");
            *current = None;
        }

        let accounts = self
            .provider
            .request("eth_requestAccounts", json!([]))
            .await
            .map_err(connect_error)?;
        let address = *parse_accounts(&accounts)?
            .first()
            .ok_or_else(|| Error::WalletRejected("no account was authorized".to_string()))?;

        let chain_id = self.ensure_target_chain().await?;
        let identity = WalletIdentity { address, chain_id };
        *current = Some(identity);

        tracing::info!(address = %address, chain_id, "wallet connected");
        Ok(identity)
    }

    /// Clears the session, as when the wallet reports a disconnect.
    pub async fn disconnect(&self) {
        if let Some(identity) = self.current.lock().await.take() {
            tracing::info!(address = %identity.address, "wallet disconnected");
        }
    }

    /// Handles an `accountsChanged` notification. Returns whether the session was cleared.
    pub async fn accounts_changed(&self, accounts: &[Address]) -> bool {
        let mut current = self.current.lock().await;
        match *current {
            Some(identity) if accounts.first() != Some(&identity.address) => {
                tracing::info!(previous = %identity.address, "wallet switched accounts");
                *current = None;
                true
            }
            _ => false,
        }
    }

    /// Fails with `NetworkMismatch` if the wallet has drifted off the target chain.
    ///
    /// Used right before a write; it does not try to switch back.
    pub async fn ensure_network(&self) -> Result<u64, Error> {
        let actual = self.chain_id().await.map_err(connect_error)?;
        if actual != self.target_chain_id {
            return Err(Error::NetworkMismatch {
                expected: self.target_chain_id,
                actual,
            });
        }
        Ok(actual)
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let value = self.provider.request("eth_chainId", json!([])).await?;
        parse_quantity("eth_chainId", &value)
    }

    async fn still_active(&self, identity: &WalletIdentity) -> bool {
        let accounts = match self.provider.request("eth_accounts", json!([])).await {
            Ok(v) => v,
            Err(_) => return false,
        };
        let same_account = matches!(parse_accounts(&accounts), Ok(list) if list.first() == Some(&identity.address));
        let same_chain = matches!(self.chain_id().await, Ok(id) if id == identity.chain_id);
        same_account && same_chain && identity.chain_id == self.target_chain_id
    }

    async fn ensure_target_chain(&self) -> Result<u64, Error> {
        let actual = self.chain_id().await.map_err(connect_error)?;
        if actual == self.target_chain_id {
            return Ok(actual);
        }

        tracing::info!(actual, expected = self.target_chain_id, "requesting network switch");
        let switch = self
            .provider
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": to_quantity(self.target_chain_id) }]),
            )
            .await;

        match switch {
            Ok(_) => {}
            Err(ProviderError::Unavailable(msg)) => return Err(Error::WalletUnavailable(msg)),
            Err(err) => {
                let unsupported = matches!(
                    &err,
                    ProviderError::Rpc { code, .. } if *code == UNSUPPORTED_METHOD || *code == METHOD_NOT_FOUND
                );
                // The wallet does not know the target chain and would need it added first.
                let unknown_chain = matches!(&err, ProviderError::Rpc { code: UNRECOGNIZED_CHAIN, .. });
                tracing::warn!(error = %err, unsupported, unknown_chain, "network switch refused");
                return Err(Error::NetworkMismatch {
                    expected: self.target_chain_id,
                    actual,
                });
            }
        }

        let now = self.chain_id().await.map_err(connect_error)?;
        if now != self.target_chain_id {
            return Err(Error::NetworkMismatch {
                expected: self.target_chain_id,
                actual: now,
            });
        }
        Ok(now)
    }
}

/// Signs content hashes with the connected wallet.
pub struct SignatureService {
    provider: Arc<dyn SignerProvider>,
}

impl SignatureService {
    pub fn new(provider: Arc<dyn SignerProvider>) -> Self {
        Self { provider }
    }

    /// Asks the wallet to `personal_sign` the hash's signing payload and checks
    /// that the signature recovers to `identity`.
    pub async fn sign(&self, hash: &ContentHash, identity: &WalletIdentity) -> Result<Signature, Error> {
        let payload = signing_payload(hash);
        let result = self
            .provider
            .request(
                "personal_sign",
                json!([format!("0x{}", hex::encode(payload)), identity.address.to_string()]),
            )
            .await
            .map_err(|err| match err {
                ProviderError::UserRejected(_) => {
                    Error::SigningFailed("the signature request was rejected".to_string())
                }
                other => Error::SigningFailed(other.to_string()),
            })?;

        let signature = result
            .as_str()
            .ok_or_else(|| Error::SigningFailed(format!("personal_sign returned {}", result)))?
            .parse::<Signature>()
            .map_err(Error::SigningFailed)?;

        let signer = recover_personal_signer(&payload, &signature).map_err(Error::SigningFailed)?;
        if signer != identity.address {
            return Err(Error::SigningFailed(format!(
                "signature was produced by {}, expected {}",
                signer, identity.address
            )));
        }

        tracing::info!(hash = %hash, signer = %signer, "hash signed");
        Ok(signature)
    }
}
