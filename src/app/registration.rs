//! The registration workflow: ingest, hash, upload and sign, then submit.
//!
//! State lives in a `watch` channel so a presentation layer can render every
//! transition. Each operation captures the attempt it runs under and its
//! results land only while that attempt is still current.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use crate::app::attempt::{AttemptCounter, AttemptId};
use crate::crypto::hashing::hash_asset;
use crate::domain::error::{Error, Stage};
use crate::domain::model::{ContentHash, ImageAsset, RegistrationRecord, Signature, StorageReference};
use crate::domain::state::{Registration, RegistrationEvent, RegistrationPhase, UploadProgress};
use crate::infra::evm::{RegistryClient, SignatureService, WalletConnector};
use crate::storage::{ContentStore, ProgressObserver};

pub struct RegistrationWorkflow {
    store: Arc<dyn ContentStore>,
    wallet: Arc<WalletConnector>,
    signer: Arc<SignatureService>,
    registry: Arc<RegistryClient>,
    attempts: AttemptCounter,
    state: Arc<watch::Sender<Registration>>,
}

/// Applies `event` if `attempt` is still the one on screen.
fn apply_current(
    state: &watch::Sender<Registration>,
    attempt: AttemptId,
    event: RegistrationEvent,
) -> Result<(), Error> {
    let mut current = false;
    state.send_if_modified(|snapshot| {
        if snapshot.attempt != attempt {
            return false;
        }
        current = true;
        snapshot.apply(event);
        true
    });
    if current {
        Ok(())
    } else {
        tracing::warn!(%attempt, "discarding result of superseded registration attempt");
        Err(Error::Superseded(attempt.get()))
    }
}

impl RegistrationWorkflow {
    pub fn new(
        store: Arc<dyn ContentStore>,
        wallet: Arc<WalletConnector>,
        signer: Arc<SignatureService>,
        registry: Arc<RegistryClient>,
    ) -> Self {
        let (state, _) = watch::channel(Registration::idle(AttemptId::default()));
        Self {
            store,
            wallet,
            signer,
            registry,
            attempts: AttemptCounter::new(),
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Registration> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Registration {
        self.state.borrow().clone()
    }

    pub fn wallet(&self) -> &Arc<WalletConnector> {
        &self.wallet
    }

    /// Abandons whatever is in flight and returns to `Idle`.
    pub fn reset(&self) {
        let attempt = self.attempts.next();
        self.state.send_replace(Registration::idle(attempt));
        tracing::debug!(%attempt, "registration reset");
    }

    fn fail(&self, attempt: AttemptId, stage: Stage, error: Error) -> Error {
        tracing::warn!(%attempt, %stage, error = %error, "registration stage failed");
        match apply_current(&self.state, attempt, RegistrationEvent::StageFailed { stage, error: error.clone() }) {
            Ok(()) => error,
            Err(superseded) => superseded,
        }
    }

    /// Starts a new attempt for `asset` and computes its hash.
    ///
    /// Any earlier attempt is superseded, including its pending upload,
    /// signature or submission.
    pub async fn ingest(&self, asset: ImageAsset) -> Result<ContentHash, Error> {
        self.ingest_as(self.attempts.next(), asset).await
    }

    async fn ingest_as(&self, attempt: AttemptId, asset: ImageAsset) -> Result<ContentHash, Error> {
        self.state.send_replace(Registration::begin(attempt));
        tracing::info!(%attempt, file = asset.file_name(), bytes = asset.len(), "image ingested");

        apply_current(&self.state, attempt, RegistrationEvent::FileIngested(asset.clone()))?;

        let hash = match tokio::task::spawn_blocking(move || hash_asset(&asset)).await {
            Ok(hash) => hash,
            Err(e) => {
                return Err(self.fail(attempt, Stage::Hashing, Error::HashComputationFailed(e.to_string())))
            }
        };
        apply_current(&self.state, attempt, RegistrationEvent::HashComputed(hash))?;
        tracing::info!(%attempt, hash = %hash, "image hashed");
        Ok(hash)
    }

    /// Reads `path` and ingests it. A file that is not an image fails the
    /// new attempt at the `Ingesting` stage.
    pub async fn ingest_file(&self, path: impl AsRef<Path>) -> Result<ContentHash, Error> {
        match ImageAsset::from_path(path).await {
            Ok(asset) => self.ingest(asset).await,
            Err(error) => {
                let attempt = self.attempts.next();
                self.state.send_replace(Registration::begin(attempt));
                Err(self.fail(attempt, Stage::Ingesting, error))
            }
        }
    }

    /// The current attempt's snapshot, or `Superseded` if `attempt` is no
    /// longer the one on screen.
    fn snapshot_for(&self, attempt: AttemptId) -> Result<Registration, Error> {
        let snapshot = self.snapshot();
        if snapshot.attempt == attempt {
            Ok(snapshot)
        } else {
            tracing::warn!(%attempt, "registration attempt superseded before its next stage");
            Err(Error::Superseded(attempt.get()))
        }
    }

    /// Uploads the current asset. Returns the existing reference if this
    /// attempt already uploaded successfully.
    pub async fn upload(&self) -> Result<StorageReference, Error> {
        let attempt = self.state.borrow().attempt;
        self.upload_for(attempt).await
    }

    async fn upload_for(&self, attempt: AttemptId) -> Result<StorageReference, Error> {
        let snapshot = self.snapshot_for(attempt)?;
        let (asset, existing) = (snapshot.asset, snapshot.cid);
        if let Some(cid) = existing {
            return Ok(cid);
        }
        let asset = asset.ok_or_else(|| Error::NotReady("no image has been selected".to_string()))?;

        apply_current(&self.state, attempt, RegistrationEvent::UploadStarted)?;

        let state = self.state.clone();
        let progress: Arc<dyn ProgressObserver> = Arc::new(move |transferred: u64, total: u64| {
            let event = RegistrationEvent::UploadProgressed(UploadProgress { transferred, total });
            // Stale progress is dropped silently; the completion reports it.
            let _ = state.send_if_modified(|snapshot| {
                if snapshot.attempt != attempt {
                    return false;
                }
                snapshot.apply(event);
                true
            });
        });

        match self.store.upload(&asset, progress).await {
            Ok(cid) => {
                apply_current(&self.state, attempt, RegistrationEvent::UploadCompleted(cid.clone()))?;
                tracing::info!(%attempt, cid = %cid, "upload stage complete");
                Ok(cid)
            }
            Err(error) => Err(self.fail(attempt, Stage::Uploading, error)),
        }
    }

    /// Connects the wallet if needed and signs the current hash.
    pub async fn sign(&self) -> Result<Signature, Error> {
        let attempt = self.state.borrow().attempt;
        self.sign_for(attempt).await
    }

    async fn sign_for(&self, attempt: AttemptId) -> Result<Signature, Error> {
        let snapshot = self.snapshot_for(attempt)?;
        let (hash, existing) = (snapshot.hash, snapshot.signature);
        if let Some(signature) = existing {
            return Ok(signature);
        }
        let hash = hash.ok_or_else(|| Error::NotReady("the image has not been hashed yet".to_string()))?;

        apply_current(&self.state, attempt, RegistrationEvent::SigningStarted)?;

        let identity = match self.wallet.connect().await {
            Ok(identity) => identity,
            Err(error) => return Err(self.fail(attempt, Stage::Connecting, error)),
        };
        let signature = match self.signer.sign(&hash, &identity).await {
            Ok(signature) => signature,
            Err(error) => return Err(self.fail(attempt, Stage::Signing, error)),
        };

        apply_current(
            &self.state,
            attempt,
            RegistrationEvent::SignatureObtained { identity, signature },
        )?;
        Ok(signature)
    }

    /// Writes the record on-chain once both the upload and the signature exist.
    ///
    /// Re-invoking after a failed submission reuses the stored CID and
    /// signature; nothing is uploaded or signed again.
    pub async fn submit(&self) -> Result<RegistrationRecord, Error> {
        let attempt = self.state.borrow().attempt;
        self.submit_for(attempt).await
    }

    async fn submit_for(&self, attempt: AttemptId) -> Result<RegistrationRecord, Error> {
        let snapshot = self.snapshot_for(attempt)?;
        if let (RegistrationPhase::Committed, Some(record)) = (&snapshot.phase, &snapshot.record) {
            return Ok(record.clone());
        }

        let (hash, cid, signature, identity) =
            match (snapshot.hash, snapshot.cid, snapshot.signature, snapshot.identity) {
                (Some(h), Some(c), Some(s), Some(i)) => (h, c, s, i),
                (_, None, _, _) => return Err(Error::NotReady("the image has not been uploaded yet".to_string())),
                _ => return Err(Error::NotReady("the image hash has not been signed yet".to_string())),
            };

        apply_current(&self.state, attempt, RegistrationEvent::SubmissionStarted)?;

        // The wallet may have changed networks since it signed.
        if let Err(error) = self.wallet.ensure_network().await {
            return Err(self.fail(attempt, Stage::Submitting, error));
        }

        match self.registry.submit(&hash, &cid, &signature, &identity).await {
            Ok(record) => {
                apply_current(&self.state, attempt, RegistrationEvent::SubmissionConfirmed(record.clone()))?;
                tracing::info!(%attempt, hash = %hash, tx = %record.transaction_hash, "image registered");
                Ok(record)
            }
            Err(error) => Err(self.fail(attempt, Stage::Submitting, error)),
        }
    }

    /// Full registration of `asset`. Upload and signing run concurrently and
    /// are both awaited before submitting.
    ///
    /// Every stage is bound to the attempt started here, so a newer file
    /// makes this call return `Superseded` rather than act on the new one.
    pub async fn run(&self, asset: ImageAsset) -> Result<RegistrationRecord, Error> {
        let attempt = self.attempts.next();
        self.ingest_as(attempt, asset).await?;
        let (uploaded, signed) = tokio::join!(self.upload_for(attempt), self.sign_for(attempt));
        uploaded?;
        signed?;
        self.submit_for(attempt).await
    }
}
