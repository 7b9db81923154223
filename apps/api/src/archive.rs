//! Raw artifact archive. Uploaded bytes are kept under
//! `artifacts/{user_id}/{assessment_id}/{artifact_id}`.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

pub fn artifact_key(user_id: Uuid, assessment_id: Uuid, artifact_id: &str) -> String {
    format!("artifacts/{user_id}/{assessment_id}/{artifact_id}")
}

#[async_trait]
pub trait ArtifactArchive: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;
}

pub struct S3Archive {
    client: S3Client,
    bucket: String,
}

impl S3Archive {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ArtifactArchive for S3Archive {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

        info!("Archived artifact to s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
