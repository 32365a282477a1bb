//! In-process registry of running uploads, at most one per artifact.
//!
//! The registry lives only as long as the serving process and is rebuilt
//! empty on restart. A same-artifact request is rejected, never queued.
//! Destructive operations take a short [`ArtifactHold`] in the same
//! registry, so the lock check and the delete or stop cannot interleave
//! with a new upload.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{progress::percent, ProgressFn, UploadTarget};
use crate::error::{RecorderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Starting,
    Uploading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadJob {
    pub target: UploadTarget,
    pub progress: f64,
    pub status: UploadStatus,
    #[serde(skip)]
    generation: u64,
}

#[derive(Debug, Default)]
struct Registry {
    jobs: HashMap<String, UploadJob>,
    holds: HashSet<String>,
    next_generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UploadLockManager {
    registry: Arc<Mutex<Registry>>,
}

impl UploadLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Grants the lock for `artifact_id` or rejects with `AlreadyInProgress`.
    ///
    /// The returned lease releases the job when dropped.
    pub fn begin(&self, artifact_id: &str, target: UploadTarget) -> Result<UploadLease> {
        let mut registry = self.registry();
        if registry.jobs.contains_key(artifact_id) {
            tracing::warn!(artifact_id = %artifact_id, target = %target, "Upload rejected, already in progress");
            return Err(RecorderError::AlreadyInProgress(artifact_id.to_string()));
        }
        if registry.holds.contains(artifact_id) {
            tracing::warn!(artifact_id = %artifact_id, target = %target, "Upload rejected, recording is being modified");
            return Err(RecorderError::conflict(format!(
                "Recording {} is being modified",
                artifact_id
            )));
        }

        registry.next_generation += 1;
        let generation = registry.next_generation;
        registry.jobs.insert(
            artifact_id.to_string(),
            UploadJob {
                target,
                progress: 0.0,
                status: UploadStatus::Starting,
                generation,
            },
        );
        tracing::info!(artifact_id = %artifact_id, target = %target, "Upload lock granted");

        Ok(UploadLease {
            manager: self.clone(),
            artifact_id: artifact_id.to_string(),
            generation,
        })
    }

    /// Reserves `artifact_id` for a delete or stop. Rejected with `Conflict`
    /// while an upload or another hold owns it; uploads are rejected until
    /// the hold is dropped.
    pub fn hold(&self, artifact_id: &str) -> Result<ArtifactHold> {
        let mut registry = self.registry();
        if registry.jobs.contains_key(artifact_id) {
            return Err(RecorderError::conflict(format!(
                "Recording {} is being uploaded",
                artifact_id
            )));
        }
        if !registry.holds.insert(artifact_id.to_string()) {
            return Err(RecorderError::conflict(format!(
                "Recording {} is being modified",
                artifact_id
            )));
        }

        Ok(ArtifactHold {
            manager: self.clone(),
            artifact_id: artifact_id.to_string(),
        })
    }

    /// Updates an existing job. Ignored once the job is gone.
    pub fn report_progress(&self, artifact_id: &str, bytes_done: u64, bytes_total: u64) {
        if let Some(job) = self.registry().jobs.get_mut(artifact_id) {
            apply_progress(job, bytes_done, bytes_total);
        }
    }

    /// Removes the job unconditionally. Returns whether one existed.
    pub fn end(&self, artifact_id: &str) -> bool {
        self.registry().jobs.remove(artifact_id).is_some()
    }

    pub fn is_locked(&self, artifact_id: &str) -> bool {
        self.registry().jobs.contains_key(artifact_id)
    }

    pub fn get(&self, artifact_id: &str) -> Option<UploadJob> {
        self.registry().jobs.get(artifact_id).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, UploadJob> {
        self.registry()
            .jobs
            .iter()
            .map(|(id, job)| (id.clone(), job.clone()))
            .collect()
    }

    fn update_generation(&self, artifact_id: &str, generation: u64, bytes_done: u64, bytes_total: u64) {
        if let Some(job) = self.registry().jobs.get_mut(artifact_id) {
            if job.generation == generation {
                apply_progress(job, bytes_done, bytes_total);
            }
        }
    }

    fn release_generation(&self, artifact_id: &str, generation: u64) {
        let mut registry = self.registry();
        let owned = registry
            .jobs
            .get(artifact_id)
            .map(|job| job.generation == generation)
            .unwrap_or(false);
        if owned {
            registry.jobs.remove(artifact_id);
            tracing::debug!(artifact_id = %artifact_id, "Upload lock released");
        }
    }
}

fn apply_progress(job: &mut UploadJob, bytes_done: u64, bytes_total: u64) {
    job.progress = percent(bytes_done, bytes_total);
    job.status = UploadStatus::Uploading;
}

/// Scoped ownership of one upload job.
///
/// Dropping the lease removes the job it created, on success, error or
/// unwind alike. A job re-created after an explicit `end` carries a new
/// generation and is left alone.
#[derive(Debug)]
pub struct UploadLease {
    manager: UploadLockManager,
    artifact_id: String,
    generation: u64,
}

impl UploadLease {
    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    /// Progress callback bound to this lease's job only
    pub fn progress_callback(&self) -> ProgressFn {
        let manager = self.manager.clone();
        let artifact_id = self.artifact_id.clone();
        let generation = self.generation;
        Arc::new(move |done, total| {
            manager.update_generation(&artifact_id, generation, done, total)
        })
    }
}

impl Drop for UploadLease {
    fn drop(&mut self) {
        self.manager.release_generation(&self.artifact_id, self.generation);
    }
}

/// Exclusive reservation of an artifact outside of any upload
#[derive(Debug)]
pub struct ArtifactHold {
    manager: UploadLockManager,
    artifact_id: String,
}

impl Drop for ArtifactHold {
    fn drop(&mut self) {
        self.manager.registry().holds.remove(&self.artifact_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_is_rejected() {
        let locks = UploadLockManager::new();
        let _lease = locks.begin("x", UploadTarget::Archive).unwrap();

        let err = locks.begin("x", UploadTarget::VideoPlatform).unwrap_err();
        assert!(matches!(err, RecorderError::AlreadyInProgress(id) if id == "x"));

        // Rejection leaves the original job untouched
        assert_eq!(locks.get("x").unwrap().target, UploadTarget::Archive);
    }

    #[test]
    fn test_end_then_begin_again() {
        let locks = UploadLockManager::new();
        let lease = locks.begin("x", UploadTarget::Archive).unwrap();
        assert!(locks.end("x"));
        assert!(!locks.is_locked("x"));

        let _second = locks.begin("x", UploadTarget::Archive).unwrap();
        drop(lease);
        assert!(locks.is_locked("x"), "stale lease must not release the new job");
    }

    #[test]
    fn test_different_artifacts_are_independent() {
        let locks = UploadLockManager::new();
        let _a = locks.begin("a", UploadTarget::Archive).unwrap();
        let _b = locks.begin("b", UploadTarget::Archive).unwrap();
        assert_eq!(locks.snapshot().len(), 2);
    }

    #[test]
    fn test_progress_reporting() {
        let locks = UploadLockManager::new();
        let _lease = locks.begin("x", UploadTarget::Archive).unwrap();
        assert_eq!(locks.get("x").unwrap().status, UploadStatus::Starting);

        locks.report_progress("x", 50, 100);
        let job = locks.get("x").unwrap();
        assert_eq!(job.progress, 50.0);
        assert_eq!(job.status, UploadStatus::Uploading);

        locks.report_progress("x", 0, 0);
        assert_eq!(locks.get("x").unwrap().progress, 0.0);
    }

    #[test]
    fn test_progress_after_end_is_ignored() {
        let locks = UploadLockManager::new();
        let lease = locks.begin("x", UploadTarget::Archive).unwrap();
        let callback = lease.progress_callback();
        locks.end("x");

        locks.report_progress("x", 10, 100);
        callback(20, 100);
        assert!(locks.get("x").is_none());
        assert!(locks.snapshot().is_empty());
    }

    #[test]
    fn test_lease_releases_on_panic() {
        let locks = UploadLockManager::new();
        let inner = locks.clone();
        let result = std::panic::catch_unwind(move || {
            let _lease = inner.begin("x", UploadTarget::Archive).unwrap();
            panic!("executor blew up");
        });

        assert!(result.is_err());
        assert!(!locks.is_locked("x"));
    }

    #[test]
    fn test_hold_excludes_uploads_both_ways() {
        let locks = UploadLockManager::new();

        let lease = locks.begin("x", UploadTarget::Archive).unwrap();
        assert!(matches!(locks.hold("x"), Err(RecorderError::Conflict(_))));
        drop(lease);

        let hold = locks.hold("x").unwrap();
        assert!(matches!(
            locks.begin("x", UploadTarget::Archive),
            Err(RecorderError::Conflict(_))
        ));
        assert!(matches!(locks.hold("x"), Err(RecorderError::Conflict(_))));
        // A hold is not an upload
        assert!(!locks.is_locked("x"));
        assert!(locks.snapshot().is_empty());

        // Other artifacts are unaffected
        let _other = locks.begin("y", UploadTarget::Archive).unwrap();

        drop(hold);
        let _lease = locks.begin("x", UploadTarget::Archive).unwrap();
    }

    #[test]
    fn test_job_serialization_hides_generation() {
        let locks = UploadLockManager::new();
        let _lease = locks.begin("x", UploadTarget::VideoPlatform).unwrap();
        let json = serde_json::to_value(locks.get("x").unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"target": "video-platform", "progress": 0.0, "status": "starting"})
        );
    }
}
