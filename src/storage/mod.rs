//! Content-addressed storage for uploaded images.

pub mod lighthouse;

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::error::Error;
use crate::domain::model::{ImageAsset, StorageReference};

pub use lighthouse::LighthouseUploader;

/// Receives `(transferred, total)` byte counts while an upload runs.
///
/// Called from inside the transfer, so implementations must return quickly.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, transferred: u64, total: u64);
}

impl<F> ProgressObserver for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, transferred: u64, total: u64) {
        self(transferred, total)
    }
}

/// Observer that ignores progress.
pub fn no_progress() -> Arc<dyn ProgressObserver> {
    Arc::new(|_: u64, _: u64| {})
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Uploads the asset and returns its content identifier.
    ///
    /// One attempt, no retries: any failure is `Error::UploadFailed` and the
    /// caller decides whether to try again.
    async fn upload(
        &self,
        asset: &ImageAsset,
        progress: Arc<dyn ProgressObserver>,
    ) -> Result<StorageReference, Error>;

    /// Public URL the content can be fetched from.
    fn gateway_url(&self, cid: &StorageReference) -> String;
}
