use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub mod multipart;
pub mod s3;

/// Which logical bucket an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketRole {
    Raw,
    Processed,
}

impl fmt::Display for BucketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketRole::Raw => f.write_str("raw"),
            BucketRole::Processed => f.write_str("processed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage request failed: {0}")]
    Transport(String),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

/// Remote object storage as seen by a job.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Streams `key` from the bucket behind `role` into `dest`.
    async fn download(&self, role: BucketRole, key: &str, dest: &Path) -> Result<(), StorageError>;

    /// Uploads `src` as `key` and returns the object's URL. The object is not
    /// readable by the public until [`StorageGateway::make_public`] succeeds.
    async fn upload(&self, role: BucketRole, src: &Path, key: &str) -> Result<String, StorageError>;

    async fn make_public(&self, role: BucketRole, key: &str) -> Result<(), StorageError>;
}
