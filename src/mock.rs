//! In-process doubles for the wallet, the chain behind it and the storage
//! network.
//!
//! [`MockWallet`] answers the EIP-1193 methods the workflows use and keeps a
//! tiny registry contract in memory, enforcing first-writer-wins on hashes
//! and checking that each registration is signed by its sender. Signatures
//! are real secp256k1 signatures from a generated key, so everything that
//! verifies them downstream runs unmodified.
//!
//! [`MemoryContentStore`] stores uploads in a map and reports progress in
//! the same chunk size as the HTTP uploader.

use async_trait::async_trait;
use secp256k1::SecretKey;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::crypto::eth::{
    address_from_secret_key, keccak256, random_secret_key, recover_personal_signer,
    sign_personal_message,
};
use crate::crypto::hashing::signing_payload;
use crate::domain::error::Error;
use crate::domain::model::{Address, ContentHash, ImageAsset, Signature, StorageReference};
use crate::infra::evm::abi;
use crate::infra::evm::provider::{
    parse_quantity, to_quantity, ProviderError, SignerProvider, METHOD_NOT_FOUND, USER_REJECTED,
};
use crate::storage::lighthouse::UPLOAD_CHUNK_SIZE;
use crate::storage::{ContentStore, ProgressObserver};

/// Registry address the mock chain deploys its contract at.
pub const MOCK_REGISTRY: &str = "0xcc69a36c79fe279af20bf1e3149b61b3967b9eb5";

/// Bytecode returned by `eth_getCode` for the registry address.
const MOCK_CODE: &str = "0x6080604052";

/// Revert code nodes use for `execution reverted`.
const EXECUTION_REVERTED: i64 = 3;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn revert(reason: &str) -> ProviderError {
    ProviderError::Rpc {
        code: EXECUTION_REVERTED,
        message: format!("execution reverted: {}", reason),
        data: Some(abi::encode_hex(&abi::encode_error_string(reason))),
    }
}

fn rejected(what: &str) -> ProviderError {
    ProviderError::UserRejected(format!("User rejected the {}", what))
}

fn address_word(address: &Address) -> Vec<u8> {
    let mut word = vec![0u8; 12];
    word.extend_from_slice(address.as_bytes());
    word
}

#[derive(Debug)]
struct ChainState {
    chain_id: u64,
    installed: bool,
    authorized: bool,
    reject_accounts: bool,
    reject_switch: bool,
    reject_signing: bool,
    sign_delay: Option<Duration>,
    /// `eth_getTransactionReceipt` answers null this many times per transaction.
    receipt_delay: u32,
    block_number: u64,
    registrations: HashMap<ContentHash, Address>,
    receipts: HashMap<String, (u32, Value)>,
}

/// Wallet plus chain double.
pub struct MockWallet {
    key: SecretKey,
    address: Address,
    registry: Address,
    state: Mutex<ChainState>,
    prompts: AtomicUsize,
}

impl MockWallet {
    /// A wallet with a fresh key, connected to `chain_id`.
    pub fn new(chain_id: u64) -> Self {
        Self::with_key(random_secret_key(), chain_id)
    }

    pub fn with_key(key: SecretKey, chain_id: u64) -> Self {
        Self {
            address: address_from_secret_key(&key),
            key,
            registry: MOCK_REGISTRY.parse().unwrap_or_default(),
            state: Mutex::new(ChainState {
                chain_id,
                installed: true,
                authorized: false,
                reject_accounts: false,
                reject_switch: false,
                reject_signing: false,
                sign_delay: None,
                receipt_delay: 0,
                block_number: 1,
                registrations: HashMap::new(),
                receipts: HashMap::new(),
            }),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn chain_id(&self) -> u64 {
        lock(&self.state).chain_id
    }

    /// Number of prompts (account access, network switch, signature) shown so far.
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Simulates the user switching networks in the wallet UI.
    pub fn set_chain_id(&self, chain_id: u64) {
        lock(&self.state).chain_id = chain_id;
    }

    /// `false` behaves like a browser without a wallet extension.
    pub fn set_installed(&self, installed: bool) {
        lock(&self.state).installed = installed;
    }

    pub fn reject_accounts(&self, reject: bool) {
        lock(&self.state).reject_accounts = reject;
    }

    pub fn reject_switch(&self, reject: bool) {
        lock(&self.state).reject_switch = reject;
    }

    pub fn reject_signing(&self, reject: bool) {
        lock(&self.state).reject_signing = reject;
    }

    /// How long the signature prompt stays open before it is approved.
    pub fn set_sign_delay(&self, delay: Duration) {
        lock(&self.state).sign_delay = Some(delay);
    }

    pub fn set_receipt_delay(&self, polls: u32) {
        lock(&self.state).receipt_delay = polls;
    }

    /// Registers `hash` to `registrant` as if another wallet had done it.
    pub fn seed_registration(&self, hash: ContentHash, registrant: Address) {
        lock(&self.state).registrations.insert(hash, registrant);
    }

    pub fn registrant_of(&self, hash: &ContentHash) -> Option<Address> {
        lock(&self.state).registrations.get(hash).copied()
    }

    fn ensure_installed(&self) -> Result<(), ProviderError> {
        if lock(&self.state).installed {
            Ok(())
        } else {
            Err(ProviderError::Unavailable("no wallet extension detected".to_string()))
        }
    }

    fn param<'a>(params: &'a Value, index: usize, method: &str) -> Result<&'a Value, ProviderError> {
        params
            .get(index)
            .ok_or_else(|| ProviderError::invalid_response(method, format!("missing param {}", index)))
    }

    fn request_accounts(&self) -> Result<Value, ProviderError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        if state.reject_accounts {
            return Err(rejected("account access request"));
        }
        state.authorized = true;
        Ok(json!([self.address.to_string()]))
    }

    fn switch_chain(&self, params: &Value) -> Result<Value, ProviderError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let requested = Self::param(params, 0, "wallet_switchEthereumChain")?
            .get("chainId")
            .ok_or_else(|| ProviderError::invalid_response("wallet_switchEthereumChain", "missing chainId"))?;
        let chain_id = parse_quantity("wallet_switchEthereumChain", requested)?;

        let mut state = lock(&self.state);
        if state.reject_switch {
            return Err(rejected("network switch"));
        }
        state.chain_id = chain_id;
        Ok(Value::Null)
    }

    async fn personal_sign(&self, params: &Value) -> Result<Value, ProviderError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let message = Self::param(params, 0, "personal_sign")?
            .as_str()
            .ok_or_else(|| ProviderError::invalid_response("personal_sign", "message is not a string"))?;
        let account = Self::param(params, 1, "personal_sign")?
            .as_str()
            .and_then(|s| s.parse::<Address>().ok());
        if account != Some(self.address) {
            return Err(ProviderError::Rpc {
                code: 4100,
                message: "requested account is not authorized".to_string(),
                data: None,
            });
        }
        let message = abi::decode_hex(message).map_err(|e| ProviderError::invalid_response("personal_sign", e.to_string()))?;

        let (delay, reject) = {
            let state = lock(&self.state);
            (state.sign_delay, state.reject_signing)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if reject {
            return Err(rejected("signature request"));
        }
        Ok(json!(sign_personal_message(&self.key, &message).to_string()))
    }

    /// Runs a call against the in-memory registry without committing it.
    fn execute(&self, state: &ChainState, tx: &Value) -> Result<Execution, ProviderError> {
        let to = tx.get("to").and_then(Value::as_str).and_then(|s| s.parse::<Address>().ok());
        if to != Some(self.registry) {
            return Ok(Execution::Read(Vec::new()));
        }
        let data = tx
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::invalid_response("eth_call", "missing data"))?;
        let calldata = abi::decode_hex(data).map_err(|e| ProviderError::invalid_response("eth_call", e.to_string()))?;

        if calldata.get(..4) == Some(&abi::selector(abi::GET_IMAGE_REGISTRAR)[..]) {
            let mut hash = [0u8; 32];
            let word = calldata
                .get(4..36)
                .ok_or_else(|| revert("bad calldata"))?;
            hash.copy_from_slice(word);
            let registrant = state
                .registrations
                .get(&ContentHash::from_digest(hash))
                .copied()
                .unwrap_or(Address::ZERO);
            return Ok(Execution::Read(address_word(&registrant)));
        }

        let call = abi::decode_register_image(&calldata).map_err(|_| revert("bad calldata"))?;
        let from = tx
            .get("from")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Address>().ok())
            .ok_or_else(|| revert("missing sender"))?;
        if state.registrations.contains_key(&call.hash) {
            return Err(revert("Image already registered"));
        }
        if call.cid.as_str().is_empty() {
            return Err(revert("Empty IPFS hash"));
        }
        let signature: [u8; 65] = call
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| revert("Invalid signature length"))?;
        let signer = recover_personal_signer(&signing_payload(&call.hash), &Signature::from_bytes(signature))
            .map_err(|_| revert("Invalid signature"))?;
        if signer != from {
            return Err(revert("Signature does not match sender"));
        }
        Ok(Execution::Register { hash: call.hash, from })
    }

    fn call(&self, params: &Value) -> Result<Value, ProviderError> {
        let tx = Self::param(params, 0, "eth_call")?;
        let state = lock(&self.state);
        match self.execute(&state, tx)? {
            Execution::Read(bytes) => Ok(json!(abi::encode_hex(&bytes))),
            Execution::Register { .. } => Ok(json!("0x")),
        }
    }

    fn send_transaction(&self, params: &Value) -> Result<Value, ProviderError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let tx = Self::param(params, 0, "eth_sendTransaction")?;
        let mut state = lock(&self.state);
        if !state.authorized {
            return Err(ProviderError::Rpc {
                code: 4100,
                message: "wallet is not connected".to_string(),
                data: None,
            });
        }

        let execution = self.execute(&state, tx)?;
        state.block_number += 1;
        let block_number = state.block_number;
        let tx_hash = format!(
            "0x{}",
            hex::encode(keccak256(format!("{}:{}", tx, block_number).as_bytes()))
        );
        if let Execution::Register { hash, from } = execution {
            state.registrations.insert(hash, from);
        }
        let receipt = json!({
            "transactionHash": tx_hash,
            "blockNumber": to_quantity(block_number),
            "status": "0x1",
        });
        let delay = state.receipt_delay;
        state.receipts.insert(tx_hash.clone(), (delay, receipt));
        Ok(json!(tx_hash))
    }

    fn receipt(&self, params: &Value) -> Result<Value, ProviderError> {
        let tx_hash = Self::param(params, 0, "eth_getTransactionReceipt")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut state = lock(&self.state);
        match state.receipts.get_mut(&tx_hash) {
            Some((pending, _)) if *pending > 0 => {
                *pending -= 1;
                Ok(Value::Null)
            }
            Some((_, receipt)) => Ok(receipt.clone()),
            None => Ok(Value::Null),
        }
    }
}

enum Execution {
    Read(Vec<u8>),
    Register { hash: ContentHash, from: Address },
}

#[async_trait]
impl SignerProvider for MockWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.ensure_installed()?;
        match method {
            "eth_requestAccounts" => self.request_accounts(),
            "eth_accounts" => {
                let authorized = lock(&self.state).authorized;
                Ok(if authorized {
                    json!([self.address.to_string()])
                } else {
                    json!([])
                })
            }
            "eth_chainId" => Ok(json!(to_quantity(self.chain_id()))),
            "wallet_switchEthereumChain" => self.switch_chain(&params),
            "personal_sign" => self.personal_sign(&params).await,
            "eth_call" => self.call(&params),
            "eth_sendTransaction" => self.send_transaction(&params),
            "eth_getTransactionReceipt" => self.receipt(&params),
            "eth_blockNumber" => Ok(json!(to_quantity(lock(&self.state).block_number))),
            "eth_getCode" => {
                let target = params.get(0).and_then(Value::as_str).and_then(|s| s.parse::<Address>().ok());
                Ok(json!(if target == Some(self.registry) { MOCK_CODE } else { "0x" }))
            }
            other => Err(ProviderError::Rpc {
                code: METHOD_NOT_FOUND,
                message: format!("the method {} does not exist", other),
                data: None,
            }),
        }
    }
}

/// Content store that keeps uploads in memory.
pub struct MemoryContentStore {
    objects: Mutex<HashMap<String, Arc<[u8]>>>,
    fail_next: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    uploads: AtomicUsize,
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(None),
            delay: Mutex::new(None),
            uploads: AtomicUsize::new(0),
        }
    }

    /// The next upload fails with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        *lock(&self.fail_next) = Some(reason.into());
    }

    /// Every upload takes at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Number of upload attempts, failed ones included.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn get(&self, cid: &StorageReference) -> Option<Arc<[u8]>> {
        lock(&self.objects).get(cid.as_str()).cloned()
    }

    fn cid_for(bytes: &[u8]) -> String {
        format!("bafkrei{}", &hex::encode(Sha256::digest(bytes))[..40])
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn upload(
        &self,
        asset: &ImageAsset,
        progress: Arc<dyn ProgressObserver>,
    ) -> Result<StorageReference, Error> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if asset.is_empty() {
            return Err(Error::UploadFailed("cannot upload an empty file".to_string()));
        }
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = lock(&self.fail_next).take() {
            return Err(Error::UploadFailed(reason));
        }

        let total = asset.len() as u64;
        let mut sent = 0u64;
        for chunk in asset.bytes().chunks(UPLOAD_CHUNK_SIZE) {
            sent += chunk.len() as u64;
            progress.on_progress(sent, total);
        }

        let cid = Self::cid_for(asset.bytes());
        lock(&self.objects).insert(cid.clone(), asset.shared_bytes());
        Ok(StorageReference::new(cid))
    }

    fn gateway_url(&self, cid: &StorageReference) -> String {
        cid.gateway_url("gateway.lighthouse.storage")
    }
}
