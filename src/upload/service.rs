use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{
    executor_for, UploadExecutor, UploadLockManager, UploadMetadata, UploadReceipt, UploadTarget,
};
use crate::config::{Settings, UploadConfig};
use crate::error::{RecorderError, Result};
use crate::library::{Library, RecordingMetadata};
use crate::store::StateStore;

/// Builds an executor for a target from freshly loaded settings
pub type ExecutorFactory =
    Arc<dyn Fn(UploadTarget, &Settings, &UploadConfig) -> Result<Box<dyn UploadExecutor>> + Send + Sync>;

/// Runs uploads under the per-artifact lock and a bounded worker budget.
#[derive(Clone)]
pub struct UploadService {
    store: StateStore,
    library: Library,
    locks: UploadLockManager,
    factory: ExecutorFactory,
    permits: Arc<Semaphore>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(store: StateStore, locks: UploadLockManager, config: UploadConfig) -> Self {
        Self::with_factory(store, locks, config, Arc::new(executor_for))
    }

    pub fn with_factory(
        store: StateStore,
        locks: UploadLockManager,
        config: UploadConfig,
        factory: ExecutorFactory,
    ) -> Self {
        let library = Library::new(store.root());
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            store,
            library,
            locks,
            factory,
            config,
        }
    }

    pub fn locks(&self) -> &UploadLockManager {
        &self.locks
    }

    pub async fn upload(
        &self,
        artifact_id: &str,
        target: UploadTarget,
        metadata: UploadMetadata,
    ) -> Result<UploadReceipt> {
        let artifact = self.library.resolve(artifact_id)?;
        let lease = self.locks.begin(&artifact.id, target)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RecorderError::internal("Upload worker pool closed"))?;

        let settings = self.store.load_settings();
        let executor = (self.factory)(target, &settings, &self.config)?;

        let outcome = executor
            .upload(&artifact.video_path, &metadata, lease.progress_callback())
            .await;

        match &outcome {
            Ok(receipt) => {
                tracing::info!(
                    artifact_id = %artifact.id,
                    target = %target,
                    message = %receipt.message,
                    "Upload finished"
                );
                if let (Some(folder), Some(link)) = (artifact.folder(), receipt.link.as_deref()) {
                    if let Err(e) = RecordingMetadata::record_upload_link(folder, target.link_key(), link) {
                        tracing::warn!(artifact_id = %artifact.id, error = %e, "Failed to record upload link");
                    }
                }
            }
            Err(e) => {
                tracing::error!(artifact_id = %artifact.id, target = %target, error = %e, "Upload failed");
            }
        }

        drop(lease);
        outcome
    }
}
