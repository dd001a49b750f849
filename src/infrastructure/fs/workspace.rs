//! Local staging directories for raw downloads and processed renditions.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create staging directory {path}: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid object key {0:?}")]
    InvalidKey(String),
}

/// The two local files owned by a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPaths {
    pub raw: PathBuf,
    pub processed: PathBuf,
}

impl LocalPaths {
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [self.raw.as_path(), self.processed.as_path()].into_iter()
    }
}

/// Raw and processed staging directories, shared by every job in the process.
#[derive(Debug, Clone)]
pub struct Workspace {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl Workspace {
    pub fn new(raw_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Creates both staging directories, parents included. Existing
    /// directories are left alone.
    pub async fn ensure(&self) -> Result<(), WorkspaceError> {
        info!("Setting up service directories");

        for dir in [self.raw_dir(), self.processed_dir()] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| WorkspaceError::Init {
                    path: dir.to_path_buf(),
                    source,
                })?;
            info!("📁 Staging directory ready: {}", dir.display());
        }

        Ok(())
    }

    /// Joins `key` onto `root`, refusing anything that could land outside it.
    pub fn resolve_path(root: &Path, key: &str) -> Result<PathBuf, WorkspaceError> {
        let resolved = root.join(validate_key(key)?);
        if !resolved.starts_with(root) {
            return Err(WorkspaceError::InvalidKey(key.to_string()));
        }
        Ok(resolved)
    }

    /// Computes the local files for one job. Both land directly in their
    /// staging directory, named after the job id so concurrent jobs for the
    /// same key never share a path.
    pub fn allocate(&self, raw_key: &str, processed_key: &str, job_id: Uuid) -> Result<LocalPaths, WorkspaceError> {
        validate_key(raw_key)?;
        validate_key(processed_key)?;

        Ok(LocalPaths {
            raw: Self::resolve_path(&self.raw_dir, &job_scoped(raw_key, job_id))?,
            processed: Self::resolve_path(&self.processed_dir, &job_scoped(processed_key, job_id))?,
        })
    }
}

/// Normalizes an object key into a relative path. Empty keys, absolute
/// paths, `..` segments, backslashes and NUL bytes are rejected.
pub fn validate_key(key: &str) -> Result<PathBuf, WorkspaceError> {
    let invalid = || WorkspaceError::InvalidKey(key.to_string());

    if key.is_empty() || key.contains('\0') || key.contains('\\') {
        return Err(invalid());
    }

    let mut relative = PathBuf::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Err(invalid()),
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(invalid());
    }

    Ok(relative)
}

/// Flattens `key` into a single file name prefixed with the job token, so
/// the staging directories never grow subdirectories.
fn job_scoped(key: &str, job_id: Uuid) -> String {
    format!("{}-{}", job_id.simple(), key.replace('/', "%2F"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_joins_plain_keys() {
        let root = Path::new("/srv/raw");
        assert_eq!(
            Workspace::resolve_path(root, "sample.mp4").unwrap(),
            PathBuf::from("/srv/raw/sample.mp4")
        );
        assert_eq!(
            Workspace::resolve_path(root, "uploads/2024/clip.mov").unwrap(),
            PathBuf::from("/srv/raw/uploads/2024/clip.mov")
        );
        assert_eq!(
            Workspace::resolve_path(root, "./sample.mp4").unwrap(),
            PathBuf::from("/srv/raw/sample.mp4")
        );
    }

    #[test]
    fn resolve_path_rejects_traversal_and_absolute_keys() {
        let root = Path::new("/srv/raw");
        for key in [
            "",
            "../../etc/passwd",
            "videos/../../secret",
            "/etc/passwd",
            ".",
            "./",
            "a\\..\\b",
            "nul\0byte.mp4",
        ] {
            assert!(
                matches!(Workspace::resolve_path(root, key), Err(WorkspaceError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn allocate_prefixes_the_file_name_with_the_job_id() {
        let workspace = Workspace::new("/srv/raw", "/srv/processed");
        let job_id = Uuid::new_v4();
        let token = job_id.simple().to_string();

        let paths = workspace
            .allocate("uploads/sample.mp4", "processed-uploads/sample.mp4", job_id)
            .unwrap();

        assert_eq!(paths.raw, PathBuf::from(format!("/srv/raw/{token}-uploads%2Fsample.mp4")));
        assert_eq!(
            paths.processed,
            PathBuf::from(format!("/srv/processed/{token}-processed-uploads%2Fsample.mp4"))
        );
    }

    #[test]
    fn allocated_files_sit_directly_in_the_staging_directories() {
        let workspace = Workspace::new("/srv/raw", "/srv/processed");

        let paths = workspace
            .allocate("a/b/c/clip.mov", "processed-a/b/c/clip.mov", Uuid::new_v4())
            .unwrap();

        assert_eq!(paths.raw.parent(), Some(Path::new("/srv/raw")));
        assert_eq!(paths.processed.parent(), Some(Path::new("/srv/processed")));
    }

    #[test]
    fn allocate_checks_the_original_key() {
        let workspace = Workspace::new("/srv/raw", "/srv/processed");
        let err = workspace.allocate("..", "processed-..", Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidKey(_)));
    }

    #[test]
    fn allocate_is_unique_per_job() {
        let workspace = Workspace::new("/srv/raw", "/srv/processed");

        let first = workspace.allocate("sample.mp4", "processed-sample.mp4", Uuid::new_v4()).unwrap();
        let second = workspace.allocate("sample.mp4", "processed-sample.mp4", Uuid::new_v4()).unwrap();

        assert_ne!(first.raw, second.raw);
        assert_ne!(first.processed, second.processed);
    }

    #[tokio::test]
    async fn ensure_creates_nested_directories_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(tmp.path().join("a/raw"), tmp.path().join("b/processed"));

        workspace.ensure().await.unwrap();
        workspace.ensure().await.unwrap();

        assert!(workspace.raw_dir().is_dir());
        assert!(workspace.processed_dir().is_dir());
    }

    #[tokio::test]
    async fn ensure_fails_when_a_file_occupies_the_path() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("raw");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let workspace = Workspace::new(&blocker, tmp.path().join("processed"));
        let err = workspace.ensure().await.unwrap_err();

        assert!(matches!(err, WorkspaceError::Init { ref path, .. } if path == &blocker));
    }
}
