use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::cleanup::CleanupGuard;
use super::error::JobError;
use super::model::{JobDescriptor, JobReport, JobResult, JobState, Lifecycle};
use crate::infrastructure::fs::workspace::{LocalPaths, Workspace};
use crate::infrastructure::storage::{BucketRole, StorageGateway};
use crate::infrastructure::transcode::Transcoder;

/// Runs jobs end to end: download, convert, upload, then cleanup on every
/// exit path.
pub struct JobController {
    workspace: Workspace,
    storage: Arc<dyn StorageGateway>,
    transcoder: Arc<dyn Transcoder>,
    target_height: u32,
}

impl JobController {
    pub fn new(
        workspace: Workspace,
        storage: Arc<dyn StorageGateway>,
        transcoder: Arc<dyn Transcoder>,
        target_height: u32,
    ) -> Self {
        Self {
            workspace,
            storage,
            transcoder,
            target_height,
        }
    }

    pub async fn run(&self, raw_object_key: &str) -> JobResult {
        let job_id = Uuid::new_v4();
        let span = info_span!("job", %job_id, key = %raw_object_key);
        self.run_job(job_id, raw_object_key).instrument(span).await
    }

    async fn run_job(&self, job_id: Uuid, raw_object_key: &str) -> JobResult {
        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();
        let mut lifecycle = Lifecycle::new();

        info!("📦 Received job");

        let (descriptor, paths) = match self.prepare(job_id, raw_object_key) {
            Ok(prepared) => prepared,
            Err(e) => {
                lifecycle.advance(JobState::Failed);
                warn!("❌ Rejected job: {}", e);
                return Err(e);
            }
        };

        let guard = CleanupGuard::arm(paths.clone());
        let outcome = self.execute(&descriptor, &paths, &mut lifecycle).await;

        lifecycle.advance(JobState::CleaningUp);
        guard.release().await.log();

        let result = match outcome {
            Ok(public_url) => {
                lifecycle.advance(JobState::Completed);
                info!("✅ Job completed: {}", public_url);
                Ok(JobReport {
                    job_id,
                    raw_object_key: descriptor.raw_object_key,
                    processed_object_key: descriptor.processed_object_key,
                    public_url,
                    started_at,
                    elapsed_ms: clock.elapsed().as_millis() as u64,
                })
            }
            Err(e) => {
                lifecycle.advance(JobState::Failed);
                error!("❌ Job failed while {:?}: {}", e.stage(), e);
                Err(e)
            }
        };

        debug_assert!(lifecycle.state().is_terminal());
        debug!("Job path: {:?}", lifecycle.history());
        result
    }

    /// Validation and path allocation. Touches neither disk nor network.
    fn prepare(&self, job_id: Uuid, raw_object_key: &str) -> Result<(JobDescriptor, LocalPaths), JobError> {
        let descriptor = JobDescriptor::new(raw_object_key)?;
        let paths = self
            .workspace
            .allocate(&descriptor.raw_object_key, &descriptor.processed_object_key, job_id)
            .map_err(|e| JobError::Validation(e.to_string()))?;
        Ok((descriptor, paths))
    }

    async fn execute(
        &self,
        descriptor: &JobDescriptor,
        paths: &LocalPaths,
        lifecycle: &mut Lifecycle,
    ) -> Result<String, JobError> {
        lifecycle.advance(JobState::Downloading);
        self.storage
            .download(BucketRole::Raw, &descriptor.raw_object_key, &paths.raw)
            .await
            .map_err(JobError::Download)?;

        lifecycle.advance(JobState::Converting);
        self.transcoder
            .convert(&paths.raw, &paths.processed, self.target_height)
            .await
            .map_err(JobError::Convert)?;

        lifecycle.advance(JobState::Uploading);
        let public_url = self
            .storage
            .upload(BucketRole::Processed, &paths.processed, &descriptor.processed_object_key)
            .await
            .map_err(JobError::Upload)?;
        self.storage
            .make_public(BucketRole::Processed, &descriptor.processed_object_key)
            .await
            .map_err(JobError::Visibility)?;

        Ok(public_url)
    }
}
