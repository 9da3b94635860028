//! Contract tests for the HTTP collaborators, each pointed at a wiremock server.
//!
//! | Client | Endpoint | Test |
//! |--------|----------|------|
//! | HttpProvider / RegistryClient | JSON-RPC | `rpc_*`, `registry_*` |
//! | LighthouseUploader | `POST /api/v0/add` | `upload_*` |
//! | FeedClient | GraphQL | `feed_*` |
//! | AirstackResolver | GraphQL | `identity_*` |

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authentichain::crypto::eth::{address_from_secret_key, random_secret_key, sign_personal_message};
use authentichain::crypto::hashing::signing_payload;
use authentichain::infra::evm::abi;
use authentichain::infra::evm::{
    HttpProvider, ProviderError, RegistryClient, SignatureService, SignerProvider, WalletConnector,
};
use authentichain::infra::graphql::ServiceError;
use authentichain::infra::identity::{AirstackResolver, IdentityResolver};
use authentichain::infra::indexer::FeedClient;
use authentichain::storage::{no_progress, ContentStore, LighthouseUploader, ProgressObserver};
use authentichain::{hash_bytes, Address, Error, ImageAsset, LookupOutcome, Signature, StorageReference, WalletIdentity};

const TIMEOUT: Duration = Duration::from_secs(5);

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn rpc_error(error: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "error": error }))
}

fn registrant() -> Address {
    "0x1111111111111111111111111111111111111111".parse().unwrap()
}

fn registry_address() -> Address {
    "0xcc69a36c79fe279af20bf1e3149b61b3967b9eb5".parse().unwrap()
}

// ── JSON-RPC provider ────────────────────────────────────────────────

#[tokio::test]
async fn rpc_request_accounts_is_served_by_eth_accounts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_accounts" })))
        .respond_with(rpc_result(json!([registrant().to_string()])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri(), TIMEOUT).unwrap();
    let accounts = provider.request("eth_requestAccounts", json!([])).await.unwrap();
    assert_eq!(accounts, json!([registrant().to_string()]));
}

#[tokio::test]
async fn rpc_user_rejection_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(json!({ "code": 4001, "message": "User denied message signature" })))
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri(), TIMEOUT).unwrap();
    let err = provider.request("personal_sign", json!(["0x00", "0x00"])).await.unwrap_err();
    assert_eq!(err, ProviderError::UserRejected("User denied message signature".into()));
}

#[tokio::test]
async fn rpc_http_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let provider = HttpProvider::new(server.uri(), TIMEOUT).unwrap();
    assert!(matches!(
        provider.request("eth_chainId", json!([])).await,
        Err(ProviderError::Unavailable(_))
    ));
}

#[tokio::test]
async fn wallet_unauthorized_account_access_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_accounts" })))
        .respond_with(rpc_error(json!({ "code": 4100, "message": "origin not authorized" })))
        .mount(&server)
        .await;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(server.uri(), TIMEOUT).unwrap());
    let err = WalletConnector::new(provider, 11_155_111).connect().await.unwrap_err();
    assert_eq!(err, Error::WalletRejected("origin not authorized".into()));
}

#[tokio::test]
async fn wallet_unknown_target_chain_is_network_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_accounts" })))
        .respond_with(rpc_result(json!([registrant().to_string()])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_chainId" })))
        .respond_with(rpc_result(json!("0x1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "wallet_switchEthereumChain" })))
        .respond_with(rpc_error(json!({ "code": 4902, "message": "Unrecognized chain ID" })))
        .expect(1)
        .mount(&server)
        .await;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(server.uri(), TIMEOUT).unwrap());
    let err = WalletConnector::new(provider, 11_155_111).connect().await.unwrap_err();
    assert_eq!(
        err,
        Error::NetworkMismatch {
            expected: 11_155_111,
            actual: 1
        }
    );
}

#[tokio::test]
async fn registry_lookup_maps_zero_address_to_unregistered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .respond_with(rpc_result(json!(format!("0x{}", "0".repeat(64)))))
        .mount(&server)
        .await;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(server.uri(), TIMEOUT).unwrap());
    let registry = RegistryClient::new(provider, registry_address(), Duration::from_millis(5));
    let outcome = registry.lookup(&hash_bytes(b"unseen")).await.unwrap();
    assert_eq!(outcome, LookupOutcome::Unregistered);
}

#[tokio::test]
async fn registry_lookup_returns_registrant() {
    let server = MockServer::start().await;
    let word = format!("0x{}{}", "0".repeat(24), hex::encode(registrant().as_bytes()));
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .respond_with(rpc_result(json!(word)))
        .mount(&server)
        .await;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(server.uri(), TIMEOUT).unwrap());
    let registry = RegistryClient::new(provider, registry_address(), Duration::from_millis(5));
    let outcome = registry.lookup(&hash_bytes(b"seen")).await.unwrap();
    assert_eq!(outcome, LookupOutcome::RegisteredBy(registrant()));
}

#[tokio::test]
async fn registry_submit_surfaces_node_revert_reason() {
    let server = MockServer::start().await;
    let revert = abi::encode_hex(&abi::encode_error_string("Image already registered"));
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .respond_with(rpc_error(json!({ "code": 3, "message": "execution reverted", "data": revert })))
        .mount(&server)
        .await;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(server.uri(), TIMEOUT).unwrap());
    let registry = RegistryClient::new(provider, registry_address(), Duration::from_millis(5));

    let key = random_secret_key();
    let hash = hash_bytes(b"dup");
    let signature = sign_personal_message(&key, &signing_payload(&hash));
    let from = WalletIdentity {
        address: registrant(),
        chain_id: 11_155_111,
    };
    let err = registry
        .submit(&hash, &StorageReference::new("QmDup"), &signature, &from)
        .await
        .unwrap_err();
    assert_eq!(err, Error::SubmissionReverted("Image already registered".into()));
}

#[tokio::test]
async fn registry_submit_reports_mined_revert() {
    let server = MockServer::start().await;
    let tx_hash = format!("0x{}", "ab".repeat(32));
    // Dry-run passes at "latest" but the mined transaction reverts.
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call", "params": [{}, "latest"] })))
        .respond_with(rpc_result(json!("0x")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_sendTransaction" })))
        .respond_with(rpc_result(json!(tx_hash)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
        .respond_with(rpc_result(json!({ "transactionHash": tx_hash, "blockNumber": "0x10", "status": "0x0" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call", "params": [{}, "0x10"] })))
        .respond_with(rpc_error(json!({
            "code": 3,
            "message": "execution reverted",
            "data": abi::encode_hex(&abi::encode_error_string("Image already registered")),
        })))
        .mount(&server)
        .await;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(server.uri(), TIMEOUT).unwrap());
    let registry = RegistryClient::new(provider, registry_address(), Duration::from_millis(5));
    let hash = hash_bytes(b"raced");
    let signature = sign_personal_message(&random_secret_key(), &signing_payload(&hash));
    let from = WalletIdentity {
        address: registrant(),
        chain_id: 11_155_111,
    };

    match registry.submit(&hash, &StorageReference::new("QmRace"), &signature, &from).await {
        Err(Error::SubmissionReverted(reason)) => {
            assert!(reason.contains("block 16"), "{}", reason);
            assert!(reason.ends_with("Image already registered"), "{}", reason);
        }
        other => panic!("expected SubmissionReverted, got {:?}", other),
    }
}

#[tokio::test]
async fn registry_submit_keeps_polling_through_receipt_errors() {
    let server = MockServer::start().await;
    let tx_hash = format!("0x{}", "cd".repeat(32));
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .respond_with(rpc_result(json!("0x")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_sendTransaction" })))
        .respond_with(rpc_result(json!(tx_hash)))
        .expect(1)
        .mount(&server)
        .await;
    // The node loses the head block twice before the receipt shows up.
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
        .respond_with(rpc_error(json!({ "code": -32000, "message": "header not found" })))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
        .respond_with(rpc_result(json!({ "transactionHash": tx_hash, "blockNumber": "0x2a", "status": "0x1" })))
        .with_priority(2)
        .mount(&server)
        .await;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(server.uri(), TIMEOUT).unwrap());
    let registry = RegistryClient::new(provider, registry_address(), Duration::from_millis(5));
    let hash = hash_bytes(b"flaky node");
    let signature = sign_personal_message(&random_secret_key(), &signing_payload(&hash));
    let from = WalletIdentity {
        address: registrant(),
        chain_id: 11_155_111,
    };

    let record = tokio::time::timeout(
        Duration::from_secs(5),
        registry.submit(&hash, &StorageReference::new("QmFlaky"), &signature, &from),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(record.transaction_hash, tx_hash);
    assert_eq!(record.block_number, 42);
}

#[tokio::test]
async fn signature_with_raw_recovery_id_is_normalised() {
    let server = MockServer::start().await;
    let key = random_secret_key();
    let hash = hash_bytes(b"hardware wallet");
    let mut raw = *sign_personal_message(&key, &signing_payload(&hash)).as_bytes();
    raw[64] -= 27;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "personal_sign" })))
        .respond_with(rpc_result(json!(Signature::from_bytes(raw).to_string())))
        .mount(&server)
        .await;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(server.uri(), TIMEOUT).unwrap());
    let identity = WalletIdentity {
        address: address_from_secret_key(&key),
        chain_id: 11_155_111,
    };
    let signature = SignatureService::new(provider).sign(&hash, &identity).await.unwrap();
    assert!(matches!(signature.as_bytes()[64], 27 | 28));
    assert_eq!(signature.as_bytes()[..64], raw[..64]);
}

// ── Storage uploads ──────────────────────────────────────────────────

fn photo(len: usize) -> ImageAsset {
    ImageAsset::new(vec![7u8; len], "image/png", "photo.png").unwrap()
}

#[tokio::test]
async fn upload_returns_cid_and_reports_progress() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/add"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Name": "photo.png",
            "Hash": "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG",
            "Size": "150000"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = LighthouseUploader::new(
        format!("{}/api/v0/add", server.uri()),
        "test-key",
        "gateway.lighthouse.storage",
        TIMEOUT,
    )
    .unwrap();

    let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let observer: Arc<dyn ProgressObserver> = {
        let seen = seen.clone();
        Arc::new(move |transferred: u64, total: u64| seen.lock().unwrap().push((transferred, total)))
    };

    let cid = uploader.upload(&photo(150_000), observer).await.unwrap();
    assert_eq!(cid.as_str(), "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
    assert_eq!(
        uploader.gateway_url(&cid),
        "https://gateway.lighthouse.storage/ipfs/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen.last(), Some(&(150_000, 150_000)));
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
}

#[tokio::test]
async fn upload_accepts_wrapped_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "Hash": "bafkreiwrapped" } })))
        .mount(&server)
        .await;

    let uploader = LighthouseUploader::new(server.uri(), "k", "gw.example", TIMEOUT).unwrap();
    let cid = uploader.upload(&photo(10), no_progress()).await.unwrap();
    assert_eq!(cid.as_str(), "bafkreiwrapped");
}

#[tokio::test]
async fn upload_service_error_is_upload_failed_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = LighthouseUploader::new(server.uri(), "bad", "gw.example", TIMEOUT).unwrap();
    match uploader.upload(&photo(10), no_progress()).await {
        Err(Error::UploadFailed(detail)) => assert!(detail.contains("invalid api key"), "{}", detail),
        other => panic!("expected UploadFailed, got {:?}", other),
    }
}

// ── Feed ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn feed_lists_registrations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "first": 2 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "imageRegistereds": [
                    { "id": "0x01", "imageHash": "0xaa", "ipfsHash": "QmA", "registrar": "0x11" },
                    { "id": "0x02", "imageHash": "0xbb", "ipfsHash": "QmB", "registrar": "0x22" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let feed = FeedClient::new(server.uri(), TIMEOUT).unwrap();
    let entries = feed.recent(2).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].ipfs_hash, "QmB");
    assert_eq!(
        entries[0].gateway_url("gateway.lighthouse.storage"),
        "https://gateway.lighthouse.storage/ipfs/QmA"
    );
}

#[tokio::test]
async fn feed_graphql_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "indexing_error" }]
        })))
        .mount(&server)
        .await;

    let feed = FeedClient::new(server.uri(), TIMEOUT).unwrap();
    match feed.recent(5).await {
        Err(ServiceError::GraphQl { messages, .. }) => assert_eq!(messages, "indexing_error"),
        other => panic!("expected GraphQl error, got {:?}", other),
    }
}

// ── Identity enrichment ──────────────────────────────────────────────

#[tokio::test]
async fn identity_resolves_domain_and_socials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "airstack-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "Domains": { "Domain": [{ "name": "alice.eth" }] },
                "Socials": { "Social": [
                    { "dappName": "farcaster", "profileName": "alice" },
                    { "dappName": "lens", "profileName": "alice.lens" }
                ] }
            }
        })))
        .mount(&server)
        .await;

    let resolver = AirstackResolver::new(server.uri(), "airstack-key", TIMEOUT).unwrap();
    let profile = resolver.resolve(registrant()).await.unwrap();
    assert_eq!(profile.address, registrant());
    assert_eq!(profile.domain_name.as_deref(), Some("alice.eth"));
    assert_eq!(profile.socials.len(), 2);
    assert_eq!(profile.display_name(), Some("alice.eth"));
}

#[tokio::test]
async fn identity_with_no_records_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "Domains": { "Domain": null }, "Socials": { "Social": null } }
        })))
        .mount(&server)
        .await;

    let resolver = AirstackResolver::new(server.uri(), "k", TIMEOUT).unwrap();
    let profile = resolver.resolve(registrant()).await.unwrap();
    assert!(profile.is_empty());
    assert_eq!(profile.display_name(), None);
}
