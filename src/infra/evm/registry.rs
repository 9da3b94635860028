//! Client for the on-chain image registry.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::error::Error;
use crate::domain::model::{
    Address, ContentHash, LookupOutcome, RegistrationRecord, Signature, StorageReference,
    WalletIdentity,
};
use crate::infra::evm::abi;
use crate::infra::evm::provider::{parse_quantity, ProviderError, SignerProvider};

/// Best available reason text for a failed write: decoded revert data, else
/// the provider's message verbatim.
pub fn revert_reason(err: &ProviderError) -> String {
    match err {
        ProviderError::Rpc { message, data, .. } => data
            .as_deref()
            .and_then(|d| abi::decode_hex(d).ok())
            .and_then(|bytes| abi::decode_revert_reason(&bytes))
            .unwrap_or_else(|| message.clone()),
        ProviderError::UserRejected(message) => format!("transaction rejected in wallet: {}", message),
        other => other.to_string(),
    }
}

pub struct RegistryClient {
    provider: Arc<dyn SignerProvider>,
    contract: Address,
    poll_interval: Duration,
}

impl RegistryClient {
    pub fn new(provider: Arc<dyn SignerProvider>, contract: Address, poll_interval: Duration) -> Self {
        Self {
            provider,
            contract,
            poll_interval,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Writes `(hash, cid, signature)` and waits for the transaction to be mined.
    ///
    /// The call is dry-run first so a revert (e.g. a hash someone already
    /// registered) is reported with its reason before anything is broadcast.
    pub async fn submit(
        &self,
        hash: &ContentHash,
        cid: &StorageReference,
        signature: &Signature,
        from: &WalletIdentity,
    ) -> Result<RegistrationRecord, Error> {
        let data = abi::encode_hex(&abi::encode_register_image(hash, cid, signature));
        let tx = json!({
            "from": from.address.to_string(),
            "to": self.contract.to_string(),
            "data": data,
        });

        self.provider
            .request("eth_call", json!([tx, "latest"]))
            .await
            .map_err(|e| Error::SubmissionReverted(revert_reason(&e)))?;

        let tx_hash = self
            .provider
            .request("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|e| Error::SubmissionReverted(revert_reason(&e)))?;
        let tx_hash = tx_hash
            .as_str()
            .ok_or_else(|| {
                Error::SubmissionReverted("eth_sendTransaction returned non-string result".to_string())
            })?
            .to_string();
        tracing::info!(hash = %hash, tx = %tx_hash, "registration transaction sent");

        let receipt = self.wait_for_receipt(&tx_hash).await;
        let block_number = receipt
            .get("blockNumber")
            .map(|b| parse_quantity("eth_getTransactionReceipt", b))
            .transpose()
            .map_err(|e| Error::SubmissionReverted(e.to_string()))?
            .unwrap_or(0);

        let status = receipt.get("status").and_then(Value::as_str).unwrap_or("0x1");
        if status == "0x0" {
            let reason = self.replay_reason(&tx, block_number).await;
            return Err(Error::SubmissionReverted(format!(
                "transaction {} reverted in block {}: {}",
                tx_hash, block_number, reason
            )));
        }

        tracing::info!(hash = %hash, tx = %tx_hash, block_number, "registration confirmed");
        Ok(RegistrationRecord {
            hash: *hash,
            cid: cid.clone(),
            signature: *signature,
            registrant: from.address,
            transaction_hash: tx_hash,
            block_number,
        })
    }

    /// Who registered `hash`, if anyone.
    pub async fn lookup(&self, hash: &ContentHash) -> Result<LookupOutcome, Error> {
        let call = json!({
            "to": self.contract.to_string(),
            "data": abi::encode_hex(&abi::encode_get_image_registrar(hash)),
        });
        let result = self
            .provider
            .request("eth_call", json!([call, "latest"]))
            .await
            .map_err(|e| Error::LookupFailed(e.to_string()))?;

        let raw = result
            .as_str()
            .ok_or_else(|| Error::LookupFailed(format!("eth_call returned {}", result)))?;
        let bytes = abi::decode_hex(raw).map_err(|e| Error::LookupFailed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(Error::LookupFailed(format!(
                "no registry contract answered at {}",
                self.contract
            )));
        }
        let registrar = abi::decode_address(&bytes).map_err(|e| Error::LookupFailed(e.to_string()))?;

        let outcome = LookupOutcome::from_registrar(registrar);
        tracing::info!(hash = %hash, ?outcome, "registry lookup");
        Ok(outcome)
    }

    /// Polls until the node has a receipt. There is no deadline here; callers
    /// that want one wrap the call in a timeout.
    ///
    /// The transaction is already broadcast, so a failed poll says nothing
    /// about its fate and polling continues.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Value {
        loop {
            match self
                .provider
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(receipt) if !receipt.is_null() => return receipt,
                Ok(_) => tracing::debug!(tx = %tx_hash, "receipt pending"),
                Err(e) => tracing::warn!(tx = %tx_hash, error = %e, "receipt poll failed, retrying"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Re-executes a reverted transaction at its block to recover the reason.
    async fn replay_reason(&self, tx: &Value, block_number: u64) -> String {
        let block = format!("0x{:x}", block_number);
        match self.provider.request("eth_call", json!([tx, block])).await {
            Err(e) => revert_reason(&e),
            Ok(_) => "reverted without a reason".to_string(),
        }
    }
}
