// Integration tests for the upload path
// A scripted executor stands in for the real backends so lock behavior can be observed mid-upload

mod common;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use common::{temp_store, FakeProcesses};
use live_recorder::config::{Settings, UploadConfig};
use live_recorder::control::ControlPlane;
use live_recorder::error::{RecorderError, Result};
use live_recorder::library::RecordingMetadata;
use live_recorder::store::StateStore;
use live_recorder::upload::{
    ExecutorFactory, ProgressFn, UploadExecutor, UploadLockManager, UploadMetadata,
    UploadReceipt, UploadService, UploadStatus, UploadTarget,
};

/// Reports half the file, then waits for the test to release it.
struct ScriptedExecutor {
    target: UploadTarget,
    gate: Arc<Semaphore>,
    fail: bool,
}

#[async_trait]
impl UploadExecutor for ScriptedExecutor {
    fn target(&self) -> UploadTarget {
        self.target
    }

    async fn upload(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
        progress: ProgressFn,
    ) -> Result<UploadReceipt> {
        assert!(path.is_file());
        progress(50, 100);
        let _permit = self.gate.acquire().await.unwrap();
        progress(100, 100);

        if self.fail {
            return Err(RecorderError::UploadFailed("backend returned 503".to_string()));
        }
        Ok(UploadReceipt {
            message: format!("Uploaded {}", metadata.title),
            link: Some("https://archive.example/details/stream_rec_1_abc".to_string()),
        })
    }
}

fn scripted_factory(gate: Arc<Semaphore>, fail: bool) -> ExecutorFactory {
    Arc::new(
        move |target: UploadTarget, _: &Settings, _: &UploadConfig| -> Result<Box<dyn UploadExecutor>> {
            Ok(Box::new(ScriptedExecutor {
                target,
                gate: gate.clone(),
                fail,
            }))
        },
    )
}

fn write_recording(store: &StateStore, id: &str) {
    let folder = store.root().join(id);
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join("video.mp4"), b"video bytes").unwrap();
    RecordingMetadata {
        channel: "alpha".to_string(),
        title: "Morning stream".to_string(),
        ..RecordingMetadata::default()
    }
    .save(&folder)
    .unwrap();
}

fn service(store: &StateStore, gate: Arc<Semaphore>, fail: bool) -> UploadService {
    UploadService::with_factory(
        store.clone(),
        UploadLockManager::new(),
        UploadConfig::default(),
        scripted_factory(gate, fail),
    )
}

fn metadata(id: &str) -> UploadMetadata {
    UploadMetadata::with_defaults(id, None, None, None)
}

async fn wait_for_progress(locks: &UploadLockManager, id: &str, percent: f64) {
    for _ in 0..200 {
        if locks.get(id).map(|job| job.progress) == Some(percent) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("upload of {} never reached {}%", id, percent);
}

/// A second request for the same artifact is rejected while the first runs
#[tokio::test]
async fn test_same_artifact_is_rejected_not_queued() {
    let (_dir, store) = temp_store();
    write_recording(&store, "rec_alpha_x");
    let gate = Arc::new(Semaphore::new(0));
    let uploads = service(&store, gate.clone(), false);

    let first = {
        let uploads = uploads.clone();
        tokio::spawn(async move {
            uploads
                .upload("rec_alpha_x", UploadTarget::Archive, metadata("rec_alpha_x"))
                .await
        })
    };
    wait_for_progress(uploads.locks(), "rec_alpha_x", 50.0).await;

    let job = uploads.locks().get("rec_alpha_x").unwrap();
    assert_eq!(job.status, UploadStatus::Uploading);
    assert_eq!(job.target, UploadTarget::Archive);

    let second = uploads
        .upload("rec_alpha_x", UploadTarget::VideoPlatform, metadata("rec_alpha_x"))
        .await;
    assert!(matches!(second, Err(RecorderError::AlreadyInProgress(_))));

    gate.add_permits(1);
    let receipt = first.await.unwrap().unwrap();
    assert_eq!(receipt.message, "Uploaded rec_alpha_x");
    assert!(!uploads.locks().is_locked("rec_alpha_x"));

    // Released: a new upload of the same artifact is granted again
    gate.add_permits(1);
    uploads
        .upload("rec_alpha_x", UploadTarget::Archive, metadata("rec_alpha_x"))
        .await
        .unwrap();
}

/// Different artifacts upload side by side
#[tokio::test]
async fn test_different_artifacts_run_in_parallel() {
    let (_dir, store) = temp_store();
    write_recording(&store, "rec_alpha_x");
    write_recording(&store, "rec_beta_y");
    let gate = Arc::new(Semaphore::new(0));
    let uploads = service(&store, gate.clone(), false);

    let spawn = |id: &'static str| {
        let uploads = uploads.clone();
        tokio::spawn(async move { uploads.upload(id, UploadTarget::Archive, metadata(id)).await })
    };
    let a = spawn("rec_alpha_x");
    let b = spawn("rec_beta_y");

    wait_for_progress(uploads.locks(), "rec_alpha_x", 50.0).await;
    wait_for_progress(uploads.locks(), "rec_beta_y", 50.0).await;
    assert_eq!(uploads.locks().snapshot().len(), 2);

    gate.add_permits(2);
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert!(uploads.locks().snapshot().is_empty());
}

/// A successful upload records its link next to the recording
#[tokio::test]
async fn test_success_records_link() {
    let (_dir, store) = temp_store();
    write_recording(&store, "rec_alpha_x");
    let uploads = service(&store, Arc::new(Semaphore::new(1)), false);

    uploads
        .upload("rec_alpha_x", UploadTarget::Archive, metadata("rec_alpha_x"))
        .await
        .unwrap();

    let meta = RecordingMetadata::load(&store.root().join("rec_alpha_x"));
    assert_eq!(meta.title, "Morning stream");
    assert_eq!(
        meta.upload_links["archive"],
        "https://archive.example/details/stream_rec_1_abc"
    );
}

/// A failed upload surfaces the reason and releases the lock
#[tokio::test]
async fn test_failure_releases_lock() {
    let (_dir, store) = temp_store();
    write_recording(&store, "rec_alpha_x");
    let uploads = service(&store, Arc::new(Semaphore::new(1)), true);

    let result = uploads
        .upload("rec_alpha_x", UploadTarget::Archive, metadata("rec_alpha_x"))
        .await;
    assert!(matches!(result, Err(RecorderError::UploadFailed(_))));
    assert!(!uploads.locks().is_locked("rec_alpha_x"));

    let meta = RecordingMetadata::load(&store.root().join("rec_alpha_x"));
    assert!(meta.upload_links.is_empty());
}

/// An unknown artifact is rejected before any lock is taken
#[tokio::test]
async fn test_missing_artifact_takes_no_lock() {
    let (_dir, store) = temp_store();
    let uploads = service(&store, Arc::new(Semaphore::new(1)), false);

    let result = uploads
        .upload("rec_ghost", UploadTarget::Archive, metadata("rec_ghost"))
        .await;
    assert!(matches!(result, Err(RecorderError::NotFound(_))));
    assert!(uploads.locks().snapshot().is_empty());
}

/// Real executors fail cleanly without credentials
#[tokio::test]
async fn test_missing_credentials_release_lock() {
    let (_dir, store) = temp_store();
    write_recording(&store, "rec_alpha_x");
    let uploads = UploadService::new(store.clone(), UploadLockManager::new(), UploadConfig::default());

    let result = uploads
        .upload("rec_alpha_x", UploadTarget::Archive, metadata("rec_alpha_x"))
        .await;
    assert!(matches!(result, Err(RecorderError::CredentialsMissing(_))));
    assert!(!uploads.locks().is_locked("rec_alpha_x"));
}

/// Progress bookkeeping and delete-after-end through the control plane
#[tokio::test]
async fn test_progress_then_delete_after_end() {
    let (_dir, store) = temp_store();
    write_recording(&store, "rec_x");
    let locks = UploadLockManager::new();
    let uploads = UploadService::new(store.clone(), locks.clone(), UploadConfig::default());
    let control = ControlPlane::new(
        store.clone(),
        uploads,
        Arc::new(FakeProcesses::new()),
        Duration::from_millis(10),
    );

    let lease = locks.begin("rec_x", UploadTarget::Archive).unwrap();
    locks.report_progress("rec_x", 50, 100);
    assert_eq!(locks.get("rec_x").unwrap().progress, 50.0);
    locks.report_progress("rec_x", 0, 0);
    assert_eq!(locks.get("rec_x").unwrap().progress, 0.0);

    assert!(matches!(control.delete_artifact("rec_x"), Err(RecorderError::Conflict(_))));

    assert!(locks.end("rec_x"));
    drop(lease);
    control.delete_artifact("rec_x").unwrap();
    assert!(!store.root().join("rec_x").exists());
}

/// A recording being deleted or stopped cannot start uploading, and vice versa
#[tokio::test]
async fn test_hold_and_upload_exclude_each_other() {
    let (_dir, store) = temp_store();
    write_recording(&store, "rec_alpha_x");
    let gate = Arc::new(Semaphore::new(0));
    let uploads = service(&store, gate.clone(), false);

    let hold = uploads.locks().hold("rec_alpha_x").unwrap();
    let result = uploads
        .upload("rec_alpha_x", UploadTarget::Archive, metadata("rec_alpha_x"))
        .await;
    assert!(matches!(result, Err(RecorderError::Conflict(_))));
    assert!(uploads.locks().snapshot().is_empty());
    drop(hold);

    let running = {
        let uploads = uploads.clone();
        tokio::spawn(async move {
            uploads
                .upload("rec_alpha_x", UploadTarget::Archive, metadata("rec_alpha_x"))
                .await
        })
    };
    wait_for_progress(uploads.locks(), "rec_alpha_x", 50.0).await;
    assert!(matches!(
        uploads.locks().hold("rec_alpha_x"),
        Err(RecorderError::Conflict(_))
    ));

    gate.add_permits(1);
    running.await.unwrap().unwrap();
    assert!(store.root().join("rec_alpha_x").join("video.mp4").exists());
}
