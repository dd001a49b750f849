use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use super::multipart::{MultipartTarget, MultipartUploader, MULTIPART_THRESHOLD};
use super::{BucketRole, StorageError, StorageGateway};
use crate::config::settings::StorageConfig;

fn transport<E: std::error::Error>(e: E) -> StorageError {
    StorageError::Transport(DisplayErrorContext(e).to_string())
}

#[derive(Clone)]
pub struct StorageService {
    client: Client,
    raw_bucket: String,
    processed_bucket: String,
    raw_base_url: String,
    processed_base_url: String,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(&config.access_key, &config.secret_key, None, None, "static");

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            // MinIO and most S3-compatible stores need path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        let base_for = |bucket: &str| match &config.endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, config.region),
        };

        let raw_base_url = base_for(&config.raw_bucket);
        let processed_base_url = config
            .public_base_url
            .clone()
            .unwrap_or_else(|| base_for(&config.processed_bucket));

        info!(
            "✅ S3 storage configured (raw: {}, processed: {})",
            config.raw_bucket, config.processed_bucket
        );

        Self {
            client,
            raw_bucket: config.raw_bucket.clone(),
            processed_bucket: config.processed_bucket.clone(),
            raw_base_url,
            processed_base_url,
        }
    }

    pub fn bucket(&self, role: BucketRole) -> &str {
        match role {
            BucketRole::Raw => &self.raw_bucket,
            BucketRole::Processed => &self.processed_bucket,
        }
    }

    pub fn public_url(&self, role: BucketRole, key: &str) -> Result<String, StorageError> {
        let base = match role {
            BucketRole::Raw => &self.raw_base_url,
            BucketRole::Processed => &self.processed_base_url,
        };
        object_url(base, key).map(String::from)
    }

    async fn put_object(&self, role: BucketRole, src: &Path, key: &str, content_type: &str) -> Result<(), StorageError> {
        let body = ByteStream::from_path(src).await.map_err(transport)?;

        self.client
            .put_object()
            .bucket(self.bucket(role))
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(transport)?;

        Ok(())
    }
}

#[async_trait]
impl MultipartTarget for StorageService {
    async fn create_multipart_upload(
        &self,
        role: BucketRole,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(self.bucket(role))
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(transport)?;

        result
            .upload_id
            .ok_or_else(|| StorageError::Transport(format!("no upload id returned for {key}")))
    }

    async fn upload_part(
        &self,
        role: BucketRole,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: bytes::Bytes,
    ) -> Result<CompletedPart, StorageError> {
        let result = self
            .client
            .upload_part()
            .bucket(self.bucket(role))
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(transport)?;

        Ok(CompletedPart::builder()
            .set_e_tag(result.e_tag)
            .part_number(part_number)
            .build())
    }

    async fn complete_multipart_upload(
        &self,
        role: BucketRole,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();

        self.client
            .complete_multipart_upload()
            .bucket(self.bucket(role))
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(transport)?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, role: BucketRole, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(self.bucket(role))
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(transport)?;

        Ok(())
    }
}

#[async_trait]
impl StorageGateway for StorageService {
    async fn download(&self, role: BucketRole, key: &str, dest: &Path) -> Result<(), StorageError> {
        let bucket = self.bucket(role);
        debug!("Downloading s3://{}/{} to {}", bucket, key, dest.display());

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|s| s.is_no_such_key()) {
                    StorageError::NotFound(format!("{bucket}/{key}"))
                } else {
                    transport(e)
                }
            })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut body = response.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let bytes = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        info!("⬇️ s3://{}/{} downloaded to {} ({} bytes)", bucket, key, dest.display(), bytes);
        Ok(())
    }

    async fn upload(&self, role: BucketRole, src: &Path, key: &str) -> Result<String, StorageError> {
        let bucket = self.bucket(role);
        let content_type = mime_guess::from_path(key).first_or(mime::APPLICATION_OCTET_STREAM);
        let size = tokio::fs::metadata(src).await?.len();

        if size > MULTIPART_THRESHOLD {
            debug!("Uploading {} ({} bytes) in parts", src.display(), size);
            MultipartUploader::upload_file(self, role, src, key, content_type.as_ref()).await?;
        } else {
            self.put_object(role, src, key, content_type.as_ref()).await?;
        }

        info!("⬆️ {} uploaded to s3://{}/{}", src.display(), bucket, key);
        self.public_url(role, key)
    }

    async fn make_public(&self, role: BucketRole, key: &str) -> Result<(), StorageError> {
        self.client
            .put_object_acl()
            .bucket(self.bucket(role))
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(transport)?;

        debug!("s3://{}/{} is now public", self.bucket(role), key);
        Ok(())
    }
}

/// Appends the key's segments to `base`, percent-encoding each one.
pub fn object_url(base: &str, key: &str) -> Result<Url, StorageError> {
    let mut url = Url::parse(base).map_err(|e| StorageError::Config(format!("bad base url {base:?}: {e}")))?;

    url.path_segments_mut()
        .map_err(|_| StorageError::Config(format!("base url {base:?} cannot carry a path")))?
        .pop_if_empty()
        .extend(key.split('/'));

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>, public_base_url: Option<&str>) -> StorageConfig {
        StorageConfig {
            raw_bucket: "raw-videos".into(),
            processed_bucket: "processed-videos".into(),
            access_key: "key".into(),
            secret_key: "secret".into(),
            region: "eu-west-1".into(),
            endpoint: endpoint.map(String::from),
            public_base_url: public_base_url.map(String::from),
        }
    }

    #[test]
    fn roles_route_to_their_own_bucket() {
        let storage = StorageService::new(&config(None, None));
        assert_eq!(storage.bucket(BucketRole::Raw), "raw-videos");
        assert_eq!(storage.bucket(BucketRole::Processed), "processed-videos");
    }

    #[test]
    fn public_url_uses_virtual_host_style_on_aws() {
        let storage = StorageService::new(&config(None, None));
        assert_eq!(
            storage.public_url(BucketRole::Processed, "processed-sample.mp4").unwrap(),
            "https://processed-videos.s3.eu-west-1.amazonaws.com/processed-sample.mp4"
        );
    }

    #[test]
    fn public_url_uses_path_style_with_custom_endpoint() {
        let storage = StorageService::new(&config(Some("http://localhost:9000/"), None));
        assert_eq!(
            storage.public_url(BucketRole::Processed, "processed-sample.mp4").unwrap(),
            "http://localhost:9000/processed-videos/processed-sample.mp4"
        );
    }

    #[test]
    fn public_base_url_overrides_processed_bucket_only() {
        let storage = StorageService::new(&config(None, Some("https://cdn.example.com/videos/")));
        assert_eq!(
            storage.public_url(BucketRole::Processed, "processed-sample.mp4").unwrap(),
            "https://cdn.example.com/videos/processed-sample.mp4"
        );
        assert_eq!(
            storage.public_url(BucketRole::Raw, "sample.mp4").unwrap(),
            "https://raw-videos.s3.eu-west-1.amazonaws.com/sample.mp4"
        );
    }

    #[test]
    fn object_url_encodes_each_segment() {
        let url = object_url("https://cdn.example.com", "uploads/my clip#1.mp4").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/uploads/my%20clip%231.mp4");
    }

    #[test]
    fn object_url_rejects_unusable_bases() {
        assert!(matches!(object_url("not a url", "a.mp4"), Err(StorageError::Config(_))));
        assert!(matches!(object_url("mailto:ops@example.com", "a.mp4"), Err(StorageError::Config(_))));
    }
}
