//! Stage-tagged error taxonomy shared by both workflows.

use serde::Serialize;
use std::fmt;

/// The workflow stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingesting,
    Hashing,
    Uploading,
    Connecting,
    Signing,
    Submitting,
    Querying,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ingesting => "ingesting",
            Self::Hashing => "hashing",
            Self::Uploading => "uploading",
            Self::Connecting => "connecting",
            Self::Signing => "signing",
            Self::Submitting => "submitting",
            Self::Querying => "querying",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Error {
    #[error("invalid image: {0}")]
    InvalidAsset(String),

    #[error("hash computation failed: {0}")]
    HashComputationFailed(String),

    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("wallet request rejected: {0}")]
    WalletRejected(String),

    #[error("wallet is on chain {actual}, expected chain {expected}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Carries the chain's revert or rejection reason verbatim.
    #[error("registration rejected: {0}")]
    SubmissionReverted(String),

    #[error("registry lookup failed: {0}")]
    LookupFailed(String),

    /// A newer file replaced the attempt this result belonged to.
    #[error("attempt {0} was superseded by a newer file")]
    Superseded(u64),

    /// An operation was invoked before the stages it depends on completed.
    #[error("{0}")]
    NotReady(String),
}

impl Error {
    /// Message shown to the user. Each variant reads differently.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidAsset(detail) => format!("Selected file is not an image ({}).", detail),
            Self::HashComputationFailed(detail) => format!("Could not compute the image hash: {}", detail),
            Self::WalletUnavailable(_) => {
                "No wallet found. Install a browser wallet to register images.".to_string()
            }
            Self::WalletRejected(_) => "Wallet connection was rejected.".to_string(),
            Self::NetworkMismatch { expected, actual } => format!(
                "Wallet is on network {}; switch to network {} and try again.",
                actual, expected
            ),
            Self::UploadFailed(detail) => {
                format!("Upload to storage failed: {}. Retry the upload.", detail)
            }
            Self::SigningFailed(detail) => format!("Signing the image failed: {}", detail),
            Self::SubmissionReverted(reason) => format!("Registration was rejected: {}", reason),
            Self::LookupFailed(detail) => format!("Image verification failed: {}", detail),
            Self::Superseded(_) => "A newer image replaced this one.".to_string(),
            Self::NotReady(detail) => detail.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_are_distinct() {
        let errors = vec![
            Error::InvalidAsset("x".into()),
            Error::HashComputationFailed("x".into()),
            Error::WalletUnavailable("x".into()),
            Error::WalletRejected("x".into()),
            Error::NetworkMismatch { expected: 1, actual: 2 },
            Error::UploadFailed("x".into()),
            Error::SigningFailed("x".into()),
            Error::SubmissionReverted("x".into()),
            Error::LookupFailed("x".into()),
        ];
        let messages: std::collections::HashSet<String> =
            errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn revert_reason_is_kept_verbatim() {
        let err = Error::SubmissionReverted("Image already registered".into());
        assert!(err.user_message().contains("Image already registered"));
        assert!(err.to_string().contains("Image already registered"));
    }
}
