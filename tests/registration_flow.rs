//! Registration workflow against the in-process wallet, chain and storage doubles.

use std::sync::Arc;
use std::time::Duration;

use authentichain::domain::state::{Notice, RegistrationPhase};
use authentichain::infra::evm::{RegistryClient, SignatureService, SignerProvider, WalletConnector};
use authentichain::mock::{MemoryContentStore, MockWallet};
use authentichain::{
    hash_asset, verify_registration_signature, Address, Error, ImageAsset, LookupOutcome,
    RegistrationWorkflow, Stage, VerificationWorkflow,
};

const SEPOLIA: u64 = 11_155_111;

struct Harness {
    wallet: Arc<MockWallet>,
    store: Arc<MemoryContentStore>,
    registry: Arc<RegistryClient>,
    workflow: Arc<RegistrationWorkflow>,
}

fn harness() -> Harness {
    let wallet = Arc::new(MockWallet::new(SEPOLIA));
    let provider: Arc<dyn SignerProvider> = wallet.clone();
    let store = Arc::new(MemoryContentStore::new());
    let registry = Arc::new(RegistryClient::new(
        provider.clone(),
        wallet.registry(),
        Duration::from_millis(5),
    ));
    let workflow = Arc::new(RegistrationWorkflow::new(
        store.clone(),
        Arc::new(WalletConnector::new(provider.clone(), SEPOLIA)),
        Arc::new(SignatureService::new(provider)),
        registry.clone(),
    ));
    Harness {
        wallet,
        store,
        registry,
        workflow,
    }
}

/// A PNG-looking buffer of `len` bytes whose content depends on `seed`.
fn png(seed: u8, len: usize) -> ImageAsset {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend((0..len.saturating_sub(8)).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)));
    ImageAsset::new(bytes, "image/png", format!("photo-{}.png", seed)).unwrap()
}

#[tokio::test]
async fn ten_kb_png_hashes_to_stable_prefixed_digest() {
    let h = harness();
    let first = h.workflow.ingest(png(1, 10 * 1024)).await.unwrap();
    let again = h.workflow.ingest(png(1, 10 * 1024)).await.unwrap();

    let rendered = first.to_string();
    assert_eq!(rendered.len(), 66);
    assert!(rendered.starts_with("0x"));
    assert!(rendered[2..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(first, again);
    assert_ne!(first, h.workflow.ingest(png(2, 10 * 1024)).await.unwrap());
}

#[tokio::test]
async fn full_run_commits_and_registry_reports_the_registrant() {
    let h = harness();
    let asset = png(3, 4096);

    let record = h.workflow.run(asset.clone()).await.unwrap();

    assert_eq!(record.hash, hash_asset(&asset));
    assert_eq!(record.registrant, h.wallet.address());
    assert!(verify_registration_signature(&record.hash, &record.signature, &record.registrant));
    assert_eq!(h.store.get(&record.cid).as_deref(), Some(asset.bytes()));

    let snapshot = h.workflow.snapshot();
    assert_eq!(snapshot.phase, RegistrationPhase::Committed);
    assert!(matches!(snapshot.notice(), Some(Notice::Success(_))));

    let verifier = VerificationWorkflow::new(h.registry.clone());
    let outcome = verifier.lookup_hash(record.hash).await.unwrap();
    assert_eq!(outcome, LookupOutcome::RegisteredBy(h.wallet.address()));
}

#[tokio::test]
async fn upload_failure_keeps_hash_and_upload_can_be_retried() {
    let h = harness();
    let hash = h.workflow.ingest(png(4, 2048)).await.unwrap();

    h.store.fail_next("connection reset by peer");
    let err = h.workflow.upload().await.unwrap_err();
    assert!(matches!(err, Error::UploadFailed(_)));

    let snapshot = h.workflow.snapshot();
    assert_eq!(snapshot.failed_stage(), Some(Stage::Uploading));
    assert_eq!(snapshot.hash, Some(hash));
    match snapshot.notice() {
        Some(Notice::Error(message)) => assert!(message.contains("connection reset by peer")),
        other => panic!("expected an error notice, got {:?}", other),
    }

    // Retry without re-selecting the file.
    h.workflow.upload().await.unwrap();
    assert_eq!(h.workflow.snapshot().phase, RegistrationPhase::AwaitingSignature);

    h.workflow.sign().await.unwrap();
    assert_eq!(h.workflow.snapshot().phase, RegistrationPhase::ReadyToSubmit);
    let record = h.workflow.submit().await.unwrap();
    assert_eq!(record.hash, hash);
    assert_eq!(h.store.upload_count(), 2);
}

#[tokio::test]
async fn failed_submit_can_be_resubmitted_without_reupload() {
    let h = harness();
    h.workflow.ingest(png(5, 1024)).await.unwrap();
    h.workflow.upload().await.unwrap();
    h.workflow.sign().await.unwrap();

    // The user flips networks in the wallet after signing.
    h.wallet.set_chain_id(1);
    let err = h.workflow.submit().await.unwrap_err();
    assert_eq!(
        err,
        Error::NetworkMismatch {
            expected: SEPOLIA,
            actual: 1
        }
    );
    let snapshot = h.workflow.snapshot();
    assert_eq!(snapshot.failed_stage(), Some(Stage::Submitting));
    assert!(snapshot.cid.is_some());
    assert!(snapshot.signature.is_some());

    h.wallet.set_chain_id(SEPOLIA);
    h.workflow.submit().await.unwrap();
    assert_eq!(h.store.upload_count(), 1);
    assert_eq!(h.workflow.snapshot().phase, RegistrationPhase::Committed);
}

#[tokio::test]
async fn duplicate_registration_surfaces_revert_reason() {
    let h = harness();
    let asset = png(6, 1024);
    let someone_else: Address = "0x00000000000000000000000000000000000000ab".parse().unwrap();
    h.wallet.seed_registration(hash_asset(&asset), someone_else);

    let err = h.workflow.run(asset).await.unwrap_err();
    match &err {
        Error::SubmissionReverted(reason) => assert_eq!(reason, "Image already registered"),
        other => panic!("expected SubmissionReverted, got {:?}", other),
    }
    let snapshot = h.workflow.snapshot();
    assert_eq!(snapshot.failed_stage(), Some(Stage::Submitting));
    assert!(snapshot.cid.is_some(), "upload success must not be reported as a failure");
    match snapshot.notice() {
        Some(Notice::Error(message)) => assert!(message.contains("Image already registered")),
        other => panic!("expected an error notice, got {:?}", other),
    }
}

#[tokio::test]
async fn rejected_signature_fails_signing_but_upload_completes() {
    let h = harness();
    h.wallet.reject_signing(true);

    let err = h.workflow.run(png(7, 1024)).await.unwrap_err();
    assert!(matches!(err, Error::SigningFailed(_)));

    let snapshot = h.workflow.snapshot();
    assert_eq!(snapshot.failed_stage(), Some(Stage::Signing));
    assert!(snapshot.cid.is_some());

    h.wallet.reject_signing(false);
    h.workflow.sign().await.unwrap();
    h.workflow.submit().await.unwrap();
    assert_eq!(h.store.upload_count(), 1);
}

#[tokio::test]
async fn missing_wallet_fails_at_connecting() {
    let h = harness();
    h.wallet.set_installed(false);

    let err = h.workflow.run(png(8, 1024)).await.unwrap_err();
    assert!(matches!(err, Error::WalletUnavailable(_)));
    assert_eq!(h.workflow.snapshot().failed_stage(), Some(Stage::Connecting));
}

#[tokio::test]
async fn connect_is_idempotent_and_does_not_stack_prompts() {
    let wallet = Arc::new(MockWallet::new(SEPOLIA));
    let connector = WalletConnector::new(wallet.clone(), SEPOLIA);

    let (a, b) = tokio::join!(connector.connect(), connector.connect());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert_eq!(connector.connect().await.unwrap(), a);
    assert_eq!(wallet.prompt_count(), 1);
    assert_eq!(a.address, wallet.address());
    assert_eq!(a.chain_id, SEPOLIA);
}

#[tokio::test]
async fn connect_switches_network_before_resolving() {
    let wallet = Arc::new(MockWallet::new(1));
    let connector = WalletConnector::new(wallet.clone(), SEPOLIA);

    let identity = connector.connect().await.unwrap();
    assert_eq!(identity.chain_id, SEPOLIA);
    assert_eq!(wallet.chain_id(), SEPOLIA);
}

#[tokio::test]
async fn rejected_network_switch_is_network_mismatch() {
    let wallet = Arc::new(MockWallet::new(1));
    wallet.reject_switch(true);
    let connector = WalletConnector::new(wallet.clone(), SEPOLIA);

    let err = connector.connect().await.unwrap_err();
    assert_eq!(
        err,
        Error::NetworkMismatch {
            expected: SEPOLIA,
            actual: 1
        }
    );
    // Account access, then the switch request.
    assert_eq!(wallet.prompt_count(), 2);
    assert_eq!(connector.current().await, None);
}

#[tokio::test]
async fn rejected_account_access_is_wallet_rejected() {
    let wallet = Arc::new(MockWallet::new(SEPOLIA));
    wallet.reject_accounts(true);
    let connector = WalletConnector::new(wallet, SEPOLIA);
    assert!(matches!(connector.connect().await, Err(Error::WalletRejected(_))));
}

#[tokio::test]
async fn switching_accounts_clears_the_session() {
    let wallet = Arc::new(MockWallet::new(SEPOLIA));
    let connector = WalletConnector::new(wallet.clone(), SEPOLIA);
    connector.connect().await.unwrap();

    assert!(!connector.accounts_changed(&[wallet.address()]).await);
    let other: Address = "0x00000000000000000000000000000000000000cd".parse().unwrap();
    assert!(connector.accounts_changed(&[other]).await);
    assert_eq!(connector.current().await, None);
}

#[tokio::test]
async fn newer_file_supersedes_the_pending_attempt() {
    let h = harness();
    h.wallet.set_sign_delay(Duration::from_millis(200));
    let first = png(9, 1024);
    let second = png(10, 1024);

    let workflow = h.workflow.clone();
    let stale = tokio::spawn({
        let first = first.clone();
        async move { workflow.run(first).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let record = h.workflow.run(second.clone()).await.unwrap();
    let stale = stale.await.unwrap();

    assert!(matches!(stale, Err(Error::Superseded(_))));
    assert_eq!(record.hash, hash_asset(&second));

    let snapshot = h.workflow.snapshot();
    assert_eq!(snapshot.phase, RegistrationPhase::Committed);
    assert_eq!(snapshot.hash, Some(hash_asset(&second)));
    assert_eq!(h.wallet.registrant_of(&hash_asset(&first)), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_never_finishes_a_newer_attempt() {
    for i in 0..20u8 {
        let h = harness();
        let first = png(40 + i, 2048);
        let second = png(100 + i, 2048);
        let first_hash = hash_asset(&first);

        let mut updates = h.workflow.subscribe();
        let running = tokio::spawn({
            let workflow = h.workflow.clone();
            async move { workflow.run(first).await }
        });

        // Ingest the newer file as soon as the first one is hashed.
        loop {
            updates.changed().await.unwrap();
            if updates.borrow_and_update().hash == Some(first_hash) {
                break;
            }
        }
        let second_hash = h.workflow.ingest(second).await.unwrap();

        match running.await.unwrap() {
            Ok(record) => assert_eq!(record.hash, first_hash),
            Err(err) => assert!(matches!(err, Error::Superseded(_)), "{:?}", err),
        }
        assert_eq!(h.wallet.registrant_of(&second_hash), None);
        assert!(h.workflow.snapshot().record.is_none());
    }
}

#[tokio::test]
async fn upload_progress_reaches_total() {
    let h = harness();
    let asset = png(11, 200 * 1024);
    let total = asset.len() as u64;
    h.workflow.ingest(asset).await.unwrap();

    let mut updates = h.workflow.subscribe();
    h.workflow.upload().await.unwrap();

    assert!(updates.has_changed().unwrap());
    let progress = updates.borrow_and_update().upload_progress.unwrap();
    assert_eq!(progress.transferred, total);
    assert_eq!(progress.total, total);
}

#[tokio::test]
async fn receipt_is_polled_until_mined() {
    let h = harness();
    h.wallet.set_receipt_delay(3);
    let record = h.workflow.run(png(12, 512)).await.unwrap();
    assert!(record.block_number > 0);
    assert!(record.transaction_hash.starts_with("0x"));
}

#[tokio::test]
async fn stages_out_of_order_are_not_ready() {
    let h = harness();
    assert!(matches!(h.workflow.upload().await, Err(Error::NotReady(_))));
    assert!(matches!(h.workflow.sign().await, Err(Error::NotReady(_))));

    h.workflow.ingest(png(13, 512)).await.unwrap();
    assert!(matches!(h.workflow.submit().await, Err(Error::NotReady(_))));

    h.workflow.reset();
    assert_eq!(h.workflow.snapshot().phase, RegistrationPhase::Idle);
    assert!(matches!(h.workflow.upload().await, Err(Error::NotReady(_))));
}

#[tokio::test]
async fn non_image_file_fails_at_ingesting() {
    let h = harness();
    let path = std::env::temp_dir().join(format!("authentichain-{}.txt", std::process::id()));
    tokio::fs::write(&path, b"not an image").await.unwrap();

    let err = h.workflow.ingest_file(&path).await.unwrap_err();
    tokio::fs::remove_file(&path).await.ok();

    assert!(matches!(err, Error::InvalidAsset(_)));
    assert_eq!(h.workflow.snapshot().failed_stage(), Some(Stage::Ingesting));
}
