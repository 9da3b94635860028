pub mod app;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod mock;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{RegistrationWorkflow, VerificationWorkflow};
pub use crypto::eth::verify_registration_signature;
pub use crypto::hashing::{hash_asset, hash_bytes, hash_data_url};
pub use domain::model::{
    Address, ContentHash, ImageAsset, LookupOutcome, Profile, RegistrationRecord, Signature,
    StorageReference, WalletIdentity,
};
pub use domain::{Error, Stage};
pub use infra::config::Config;
