//! Workflow snapshots and the events that move them.
//!
//! The reducers here are pure; the async orchestration in `app` decides which
//! events to emit and whether an event still belongs to the current attempt.

use serde::Serialize;

use crate::app::attempt::AttemptId;
use crate::domain::error::{Error, Stage};
use crate::domain::model::{
    Address, ContentHash, ImageAsset, LookupOutcome, Profile, RegistrationRecord, Signature,
    StorageReference, WalletIdentity,
};

/// A single user-facing notification. Success and error never coexist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Notice {
    Success(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub transferred: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RegistrationPhase {
    Idle,
    Ingesting,
    Hashing,
    Uploading,
    /// Upload done, waiting on the wallet signature.
    AwaitingSignature,
    /// Signature done, waiting on the upload.
    AwaitingUpload,
    ReadyToSubmit,
    Submitting,
    Committed,
    Failed { stage: Stage, error: Error },
}

#[derive(Debug, Clone)]
pub enum RegistrationEvent {
    FileIngested(ImageAsset),
    HashComputed(ContentHash),
    UploadStarted,
    UploadProgressed(UploadProgress),
    UploadCompleted(StorageReference),
    SigningStarted,
    SignatureObtained {
        identity: WalletIdentity,
        signature: Signature,
    },
    SubmissionStarted,
    SubmissionConfirmed(RegistrationRecord),
    StageFailed { stage: Stage, error: Error },
}

/// Everything the presentation layer needs to render one registration attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub attempt: AttemptId,
    pub phase: RegistrationPhase,
    #[serde(skip)]
    pub asset: Option<ImageAsset>,
    pub hash: Option<ContentHash>,
    pub cid: Option<StorageReference>,
    pub upload_progress: Option<UploadProgress>,
    pub identity: Option<WalletIdentity>,
    pub signature: Option<Signature>,
    pub record: Option<RegistrationRecord>,
}

impl Registration {
    pub fn idle(attempt: AttemptId) -> Self {
        Self {
            attempt,
            phase: RegistrationPhase::Idle,
            asset: None,
            hash: None,
            cid: None,
            upload_progress: None,
            identity: None,
            signature: None,
            record: None,
        }
    }

    /// Fresh snapshot for a new attempt, already in `Ingesting`.
    pub fn begin(attempt: AttemptId) -> Self {
        Self {
            phase: RegistrationPhase::Ingesting,
            ..Self::idle(attempt)
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.phase, RegistrationPhase::Failed { .. })
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.phase {
            RegistrationPhase::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Upload and signature are independent prerequisites; this is where the
    /// attempt stands given which of them are done.
    fn prerequisite_phase(&self) -> RegistrationPhase {
        match (self.cid.is_some(), self.signature.is_some()) {
            (true, true) => RegistrationPhase::ReadyToSubmit,
            (true, false) => RegistrationPhase::AwaitingSignature,
            (false, true) => RegistrationPhase::AwaitingUpload,
            (false, false) => RegistrationPhase::Uploading,
        }
    }

    /// Completion events record their data but leave a failure on screen;
    /// only a retry (a `*Started` event) clears it.
    fn settle(&mut self) {
        if !self.is_failed() {
            self.phase = self.prerequisite_phase();
        }
    }

    pub fn apply(&mut self, event: RegistrationEvent) {
        match event {
            RegistrationEvent::FileIngested(asset) => {
                let attempt = self.attempt;
                *self = Self::idle(attempt);
                self.asset = Some(asset);
                self.phase = RegistrationPhase::Hashing;
            }
            RegistrationEvent::HashComputed(hash) => {
                self.hash = Some(hash);
                self.settle();
            }
            RegistrationEvent::UploadStarted => {
                self.upload_progress = None;
                if self.is_failed() {
                    self.phase = self.prerequisite_phase();
                }
            }
            RegistrationEvent::UploadProgressed(progress) => {
                self.upload_progress = Some(progress);
            }
            RegistrationEvent::UploadCompleted(cid) => {
                self.cid = Some(cid);
                self.settle();
            }
            RegistrationEvent::SigningStarted => {
                if self.is_failed() {
                    self.phase = self.prerequisite_phase();
                }
            }
            RegistrationEvent::SignatureObtained {
                identity,
                signature,
            } => {
                self.identity = Some(identity);
                self.signature = Some(signature);
                self.settle();
            }
            RegistrationEvent::SubmissionStarted => {
                self.phase = RegistrationPhase::Submitting;
            }
            RegistrationEvent::SubmissionConfirmed(record) => {
                self.record = Some(record);
                self.phase = RegistrationPhase::Committed;
            }
            RegistrationEvent::StageFailed { stage, error } => {
                // The first failure stays visible until the user retries.
                if !self.is_failed() {
                    self.phase = RegistrationPhase::Failed { stage, error };
                }
            }
        }
    }

    pub fn notice(&self) -> Option<Notice> {
        match &self.phase {
            RegistrationPhase::Committed => self.record.as_ref().map(|r| {
                Notice::Success(format!(
                    "Image registered in transaction {} (block {}).",
                    r.transaction_hash, r.block_number
                ))
            }),
            RegistrationPhase::Failed { stage, error } => {
                Some(Notice::Error(format!("[{}] {}", stage, error.user_message())))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum VerificationPhase {
    Idle,
    Ingesting,
    Hashing,
    Querying,
    Unregistered,
    RegisteredBy { registrant: Address },
    Failed { stage: Stage, error: Error },
}

#[derive(Debug, Clone)]
pub enum VerificationEvent {
    FileIngested(ImageAsset),
    HashComputed(ContentHash),
    LookupCompleted(LookupOutcome),
    ProfileResolved(Profile),
    StageFailed { stage: Stage, error: Error },
}

#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub attempt: AttemptId,
    pub phase: VerificationPhase,
    #[serde(skip)]
    pub asset: Option<ImageAsset>,
    pub hash: Option<ContentHash>,
    pub profile: Option<Profile>,
}

impl Verification {
    pub fn idle(attempt: AttemptId) -> Self {
        Self {
            attempt,
            phase: VerificationPhase::Idle,
            asset: None,
            hash: None,
            profile: None,
        }
    }

    pub fn begin(attempt: AttemptId) -> Self {
        Self {
            phase: VerificationPhase::Ingesting,
            ..Self::idle(attempt)
        }
    }

    pub fn outcome(&self) -> Option<LookupOutcome> {
        match &self.phase {
            VerificationPhase::Unregistered => Some(LookupOutcome::Unregistered),
            VerificationPhase::RegisteredBy { registrant } => {
                Some(LookupOutcome::RegisteredBy(*registrant))
            }
            _ => None,
        }
    }

    pub fn apply(&mut self, event: VerificationEvent) {
        match event {
            VerificationEvent::FileIngested(asset) => {
                self.asset = Some(asset);
                self.hash = None;
                self.profile = None;
                self.phase = VerificationPhase::Hashing;
            }
            VerificationEvent::HashComputed(hash) => {
                self.hash = Some(hash);
                self.phase = VerificationPhase::Querying;
            }
            VerificationEvent::LookupCompleted(outcome) => {
                self.phase = match outcome {
                    LookupOutcome::Unregistered => VerificationPhase::Unregistered,
                    LookupOutcome::RegisteredBy(registrant) => {
                        VerificationPhase::RegisteredBy { registrant }
                    }
                };
            }
            VerificationEvent::ProfileResolved(profile) => {
                // Only meaningful for the registrant currently on screen.
                if self.outcome().and_then(|o| o.registrant()) == Some(profile.address) {
                    self.profile = Some(profile);
                }
            }
            VerificationEvent::StageFailed { stage, error } => {
                self.phase = VerificationPhase::Failed { stage, error };
            }
        }
    }

    pub fn notice(&self) -> Option<Notice> {
        if let VerificationPhase::Failed { stage, error } = &self.phase {
            return Some(Notice::Error(format!("[{}] {}", stage, error.user_message())));
        }
        let outcome = self.outcome()?;
        let mut message = outcome.message();
        if let Some(name) = self.profile.as_ref().and_then(|p| p.display_name()) {
            message.push_str(&format!(" ({})", name));
        }
        Some(Notice::Success(message))
    }
}
