//! In-memory collaborators for exercising jobs without S3 or ffmpeg.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use super::service::JobController;
use crate::infrastructure::fs::workspace::Workspace;
use crate::infrastructure::storage::{BucketRole, StorageError, StorageGateway};
use crate::infrastructure::transcode::{TranscodeError, Transcoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    None,
    Download,
    /// Writes part of the object locally, then fails.
    PartialDownload,
    Upload,
    MakePublic,
}

pub struct FakeStorage {
    objects: Mutex<HashMap<(BucketRole, String), Vec<u8>>>,
    public: Mutex<HashSet<(BucketRole, String)>>,
    calls: Mutex<Vec<String>>,
    failure: Failure,
}

impl FakeStorage {
    pub fn new(failure: Failure) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            public: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            failure,
        }
    }

    pub fn with_object(self, role: BucketRole, key: &str, data: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((role, key.to_string()), data.to_vec());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn object(&self, role: BucketRole, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(&(role, key.to_string())).cloned()
    }

    pub fn is_public(&self, role: BucketRole, key: &str) -> bool {
        self.public.lock().unwrap().contains(&(role, key.to_string()))
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StorageGateway for FakeStorage {
    async fn download(&self, role: BucketRole, key: &str, dest: &Path) -> Result<(), StorageError> {
        self.record(format!("download {role} {key}"));

        if self.failure == Failure::Download {
            return Err(StorageError::Transport("connection reset".into()));
        }

        let data = self
            .object(role, key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if self.failure == Failure::PartialDownload {
            tokio::fs::write(dest, &data[..data.len() / 2]).await?;
            return Err(StorageError::Transport("stream interrupted".into()));
        }

        tokio::fs::write(dest, data).await?;
        Ok(())
    }

    async fn upload(&self, role: BucketRole, src: &Path, key: &str) -> Result<String, StorageError> {
        self.record(format!("upload {role} {key}"));

        if self.failure == Failure::Upload {
            return Err(StorageError::Transport("503 slow down".into()));
        }

        let data = tokio::fs::read(src).await?;
        self.objects.lock().unwrap().insert((role, key.to_string()), data);
        Ok(format!("https://storage.test/{role}/{key}"))
    }

    async fn make_public(&self, role: BucketRole, key: &str) -> Result<(), StorageError> {
        self.record(format!("make_public {role} {key}"));

        if self.failure == Failure::MakePublic {
            return Err(StorageError::Transport("access denied".into()));
        }

        self.public.lock().unwrap().insert((role, key.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Copies the input with a marker appended.
    Render,
    /// Leaves a partial output behind and fails.
    Fail,
    Panic,
    /// Never finishes.
    Hang,
}

pub struct FakeTranscoder {
    behavior: Behavior,
    calls: Mutex<Vec<(PathBuf, PathBuf, u32)>>,
    pub started: Notify,
}

impl FakeTranscoder {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
            started: Notify::new(),
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn convert(&self, input: &Path, output: &Path, target_height: u32) -> Result<(), TranscodeError> {
        self.calls
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf(), target_height));
        self.started.notify_one();

        match self.behavior {
            Behavior::Render => {
                let mut data = tokio::fs::read(input).await?;
                data.extend_from_slice(format!("@{target_height}p").as_bytes());
                tokio::fs::write(output, data).await?;
                Ok(())
            }
            Behavior::Fail => {
                tokio::fs::write(output, b"half a rendition").await?;
                Err(TranscodeError::Failed {
                    exit_code: Some(1),
                    stderr: "Conversion failed!".into(),
                })
            }
            Behavior::Panic => panic!("encoder blew up"),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Every regular file below `dir`.
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

pub struct Harness {
    pub tmp: TempDir,
    pub workspace: Workspace,
    pub storage: Arc<FakeStorage>,
    pub transcoder: Arc<FakeTranscoder>,
    pub controller: Arc<JobController>,
}

impl Harness {
    pub async fn new(storage: FakeStorage, transcoder: FakeTranscoder) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(tmp.path().join("raw-videos"), tmp.path().join("processed-videos"));
        workspace.ensure().await.unwrap();

        let storage = Arc::new(storage);
        let transcoder = Arc::new(transcoder);
        let controller = Arc::new(JobController::new(
            workspace.clone(),
            storage.clone(),
            transcoder.clone(),
            360,
        ));

        Self {
            tmp,
            workspace,
            storage,
            transcoder,
            controller,
        }
    }

    pub fn local_files(&self) -> Vec<PathBuf> {
        let mut files = files_under(self.workspace.raw_dir());
        files.extend(files_under(self.workspace.processed_dir()));
        files
    }
}
