use crate::{
    domain::FileStorage,
    errors::StorageError,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{
    primitives::ByteStream,
    Client as S3Client,
    error::SdkError,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
}

impl S3FileStorage {
    pub fn new(client: S3Client, bucket_name: String) -> Self {
        Self { client, bucket_name }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Uploads data with PutObject, recording the content type on the object.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        tracing::debug!(
            s3_key = %key,
            bucket = %self.bucket_name,
            ?content_type,
            bytes = data.len(),
            "S3: Uploading image"
        );

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()))
            .send()
            .await
            .context(format!("S3: Failed to upload object with key '{}'", key))
            .map_err(|e| StorageError::UploadFailed(format!("{e:#}")))?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(())
    }

    /// GetObject, with the body collected into memory. Images are bounded by
    /// the request body limit they were uploaded under.
    async fn download(&self, key: &str) -> Result<(Vec<u8>, Option<String>), StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Downloading image");

        let output = self.client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().is_no_such_key() {
                        tracing::warn!(s3_key = %key, bucket = %self.bucket_name, "S3: NoSuchKey");
                        return StorageError::NotFound(key.to_string());
                    }
                }
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Download failed");
                let context = format!("S3: Failed to download object with key '{key}'");
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(context))
            })?;

        let content_type = output.content_type().map(str::to_string);
        let data = output
            .body
            .collect()
            .await
            .context(format!("S3: Failed to read body of object '{}'", key))?
            .into_bytes()
            .to_vec();

        tracing::debug!(s3_key = %key, ?content_type, bytes = data.len(), "S3: Download successful");
        Ok((data, content_type))
    }

    /// DeleteObject succeeds whether or not the key exists.
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Deleting object");

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Delete failed");
                let context = format!("S3: Failed to delete object with key '{key}'");
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(context))
            })?;
        Ok(())
    }
}

/// Blob store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryFileStorage {
    objects: RwLock<HashMap<String, (Vec<u8>, Option<String>)>>,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        self.objects.write().await.insert(key.to_string(), (data, content_type));
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<(Vec<u8>, Option<String>), StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn memory_storage_round_trips_and_deletes() {
        let storage = InMemoryFileStorage::new();
        storage.upload("a.png", vec![1, 2, 3], Some("image/png".into())).await.unwrap();
        assert_eq!(
            storage.download("a.png").await.unwrap(),
            (vec![1, 2, 3], Some("image/png".to_string()))
        );
        storage.delete("a.png").await.unwrap();
        assert_matches!(storage.download("a.png").await, Err(StorageError::NotFound(key)) if key == "a.png");
        storage.delete("a.png").await.unwrap();
    }
}
