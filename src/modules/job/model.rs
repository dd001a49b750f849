use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::JobError;
use crate::infrastructure::fs::workspace::validate_key;

pub const PROCESSED_PREFIX: &str = "processed-";

/// A validated request to transcode one raw object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub raw_object_key: String,
    pub processed_object_key: String,
}

impl JobDescriptor {
    pub fn new(raw_object_key: &str) -> Result<Self, JobError> {
        validate_key(raw_object_key).map_err(|e| JobError::Validation(e.to_string()))?;

        Ok(Self {
            raw_object_key: raw_object_key.to_string(),
            processed_object_key: format!("{PROCESSED_PREFIX}{raw_object_key}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Downloading,
    Converting,
    Uploading,
    CleaningUp,
    Completed,
    Failed,
}

impl JobState {
    /// The legal moves of the job state machine. Every stage after
    /// `Received` exits through `CleaningUp`.
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, next),
            (Received, Downloading)
                | (Received, Failed)
                | (Downloading, Converting)
                | (Downloading, CleaningUp)
                | (Converting, Uploading)
                | (Converting, CleaningUp)
                | (Uploading, CleaningUp)
                | (CleaningUp, Completed)
                | (CleaningUp, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Tracks a job's walk through [`JobState`].
#[derive(Debug)]
pub struct Lifecycle {
    state: JobState,
    history: Vec<JobState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: JobState::Received,
            history: vec![JobState::Received],
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    pub fn advance(&mut self, next: JobState) {
        let legal = self.state.can_advance_to(next);
        if !legal {
            error!("Illegal job transition {:?} -> {:?}", self.state, next);
        }
        debug_assert!(legal, "illegal job transition {:?} -> {:?}", self.state, next);
        debug!("Job state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobReport {
    pub job_id: Uuid,
    pub raw_object_key: String,
    pub processed_object_key: String,
    pub public_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub elapsed_ms: u64,
}

pub type JobResult = Result<JobReport, JobError>;
