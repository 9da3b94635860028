//! The verification workflow: hash an image and ask the registry who owns it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::app::attempt::{AttemptCounter, AttemptId};
use crate::crypto::hashing::hash_asset;
use crate::domain::error::{Error, Stage};
use crate::domain::model::{Address, ContentHash, ImageAsset, LookupOutcome};
use crate::domain::state::{Verification, VerificationEvent};
use crate::infra::evm::RegistryClient;
use crate::infra::identity::{enrich, IdentityResolver};

pub struct VerificationWorkflow {
    registry: Arc<RegistryClient>,
    resolver: Option<Arc<dyn IdentityResolver>>,
    identity_timeout: Duration,
    attempts: AttemptCounter,
    state: Arc<watch::Sender<Verification>>,
}

fn apply_current(
    state: &watch::Sender<Verification>,
    attempt: AttemptId,
    event: VerificationEvent,
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
        tracing::warn!(%attempt, "discarding result of superseded verification attempt");
        Err(Error::Superseded(attempt.get()))
    }
}

impl VerificationWorkflow {
    pub fn new(registry: Arc<RegistryClient>) -> Self {
        let (state, _) = watch::channel(Verification::idle(AttemptId::default()));
        Self {
            registry,
            resolver: None,
            identity_timeout: Duration::from_secs(3),
            attempts: AttemptCounter::new(),
            state: Arc::new(state),
        }
    }

    /// Enables registrant enrichment, bounded by `timeout` per lookup.
    pub fn with_identity(mut self, resolver: Arc<dyn IdentityResolver>, timeout: Duration) -> Self {
        self.resolver = Some(resolver);
        self.identity_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Verification> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Verification {
        self.state.borrow().clone()
    }

    pub fn reset(&self) {
        self.state.send_replace(Verification::idle(self.attempts.next()));
    }

    fn fail(&self, attempt: AttemptId, stage: Stage, error: Error) -> Error {
        tracing::warn!(%attempt, %stage, error = %error, "verification stage failed");
        match apply_current(&self.state, attempt, VerificationEvent::StageFailed { stage, error: error.clone() }) {
            Ok(()) => error,
            Err(superseded) => superseded,
        }
    }

    /// Hashes `asset` and looks it up. The outcome is reported without
    /// waiting for identity enrichment, which lands on the snapshot later
    /// if it arrives in time.
    pub async fn verify(&self, asset: ImageAsset) -> Result<LookupOutcome, Error> {
        let attempt = self.attempts.next();
        self.state.send_replace(Verification::begin(attempt));
        apply_current(&self.state, attempt, VerificationEvent::FileIngested(asset.clone()))?;

        let hash = match tokio::task::spawn_blocking(move || hash_asset(&asset)).await {
            Ok(hash) => hash,
            Err(e) => {
                return Err(self.fail(attempt, Stage::Hashing, Error::HashComputationFailed(e.to_string())))
            }
        };
        self.query(attempt, hash).await
    }

    pub async fn verify_file(&self, path: impl AsRef<Path>) -> Result<LookupOutcome, Error> {
        match ImageAsset::from_path(path).await {
            Ok(asset) => self.verify(asset).await,
            Err(error) => {
                let attempt = self.attempts.next();
                self.state.send_replace(Verification::begin(attempt));
                Err(self.fail(attempt, Stage::Ingesting, error))
            }
        }
    }

    /// Looks up a hash computed elsewhere.
    pub async fn lookup_hash(&self, hash: ContentHash) -> Result<LookupOutcome, Error> {
        let attempt = self.attempts.next();
        self.state.send_replace(Verification::begin(attempt));
        self.query(attempt, hash).await
    }

    async fn query(&self, attempt: AttemptId, hash: ContentHash) -> Result<LookupOutcome, Error> {
        apply_current(&self.state, attempt, VerificationEvent::HashComputed(hash))?;

        let outcome = match self.registry.lookup(&hash).await {
            Ok(outcome) => outcome,
            Err(error) => return Err(self.fail(attempt, Stage::Querying, error)),
        };
        apply_current(&self.state, attempt, VerificationEvent::LookupCompleted(outcome))?;
        tracing::info!(%attempt, hash = %hash, message = %outcome.message(), "verification complete");

        if let Some(registrant) = outcome.registrant() {
            self.spawn_enrichment(attempt, registrant);
        }
        Ok(outcome)
    }

    fn spawn_enrichment(&self, attempt: AttemptId, registrant: Address) {
        let Some(resolver) = self.resolver.clone() else {
            return;
        };
        let state = self.state.clone();
        let timeout = self.identity_timeout;
        tokio::spawn(async move {
            if let Some(profile) = enrich(&resolver, registrant, timeout).await {
                if apply_current(&state, attempt, VerificationEvent::ProfileResolved(profile)).is_ok() {
                    tracing::debug!(%attempt, address = %registrant, "registrant profile attached");
                }
            }
        });
    }
}
