use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::types::CompletedPart;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, warn};

use super::{BucketRole, StorageError};

// S3 rejects non-final parts under 5MB.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Files larger than this go through a multipart upload.
pub const MULTIPART_THRESHOLD: u64 = 64 * 1024 * 1024;

/// The four calls a multipart upload is made of.
#[async_trait]
pub trait MultipartTarget: Send + Sync {
    async fn create_multipart_upload(
        &self,
        role: BucketRole,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn upload_part(
        &self,
        role: BucketRole,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart, StorageError>;

    async fn complete_multipart_upload(
        &self,
        role: BucketRole,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError>;

    async fn abort_multipart_upload(&self, role: BucketRole, key: &str, upload_id: &str) -> Result<(), StorageError>;
}

pub struct MultipartUploader<'a> {
    target: &'a dyn MultipartTarget,
    role: BucketRole,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    part_number: i32,
}

impl<'a> MultipartUploader<'a> {
    pub async fn new(
        target: &'a dyn MultipartTarget,
        role: BucketRole,
        key: &str,
        content_type: &str,
    ) -> Result<Self, StorageError> {
        let upload_id = target.create_multipart_upload(role, key, content_type).await?;

        Ok(Self {
            target,
            role,
            key: key.to_string(),
            upload_id,
            parts: Vec::new(),
            part_number: 1,
        })
    }

    pub async fn write_part(&mut self, body: Bytes) -> Result<(), StorageError> {
        let part = self
            .target
            .upload_part(self.role, &self.key, &self.upload_id, self.part_number, body)
            .await?;

        self.parts.push(part);
        self.part_number += 1;
        Ok(())
    }

    pub async fn finish(&mut self) -> Result<(), StorageError> {
        let parts = std::mem::take(&mut self.parts);
        self.target
            .complete_multipart_upload(self.role, &self.key, &self.upload_id, parts)
            .await
    }

    pub async fn abort(&self) -> Result<(), StorageError> {
        self.target
            .abort_multipart_upload(self.role, &self.key, &self.upload_id)
            .await
    }

    /// Uploads a local file part by part. Any failure after the upload is
    /// created, completion included, aborts it so no orphaned parts are left
    /// behind in the bucket.
    pub async fn upload_file(
        target: &'a dyn MultipartTarget,
        role: BucketRole,
        src: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut uploader = Self::new(target, role, key, content_type).await?;

        let result = match uploader.stream_from(src).await {
            Ok(()) => uploader.finish().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!("Multipart upload of {} failed: {}", key, e);
            if let Err(abort_err) = uploader.abort().await {
                warn!("Failed to abort multipart upload of {}: {}", key, abort_err);
            }
            return Err(e);
        }

        Ok(())
    }

    async fn stream_from(&mut self, src: &Path) -> Result<(), StorageError> {
        let mut file = tokio::fs::File::open(src).await?;

        loop {
            let chunk = read_part(&mut file).await?;
            if chunk.is_empty() {
                break;
            }
            let last = chunk.len() < PART_SIZE;
            self.write_part(chunk).await?;
            if last {
                break;
            }
        }

        Ok(())
    }
}

/// Reads up to [`PART_SIZE`] bytes; shorter only at end of file.
async fn read_part<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Bytes> {
    let mut buffer = Vec::with_capacity(PART_SIZE);

    while buffer.len() < PART_SIZE {
        let read = (&mut *reader)
            .take((PART_SIZE - buffer.len()) as u64)
            .read_to_end(&mut buffer)
            .await?;
        if read == 0 {
            break;
        }
    }

    Ok(Bytes::from(buffer))
}
