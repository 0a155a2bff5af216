// workstream-backup/src/storage/s3.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::error::SdkError;
use s3::operation::head_object::HeadObjectOutput;
use s3::primitives::ByteStream;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{ObjectStore, RemoteObject, UploadRequest, resolve_created_at};
use crate::config::StorageConfig;

/// HMAC key pair for the bucket's S3-compatible endpoint.
#[derive(Deserialize)]
pub struct HmacKeyFile {
    #[serde(alias = "accessKeyId", alias = "access_id")]
    pub access_key_id: String,
    #[serde(alias = "secretAccessKey", alias = "secret")]
    pub secret_access_key: String,
}

pub async fn read_key_file(path: &Path) -> Result<HmacKeyFile> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read storage credentials file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| {
        format!(
            "Failed to parse storage credentials JSON from {}",
            path.display()
        )
    })
}

/// Bucket access through an S3-compatible API (Cloud Storage interoperability, MinIO, S3).
pub struct S3ObjectStore {
    client: s3::Client,
    bucket_name: String,
    scheme: &'static str,
}

impl S3ObjectStore {
    pub async fn connect(storage: &StorageConfig) -> Result<Self> {
        let key = read_key_file(&storage.credentials_path).await?;

        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&storage.endpoint_url)
            .region(Region::new(storage.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &key.access_key_id,
                &key.secret_access_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ))
            .load()
            .await;
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!(
            "Storage client ready for project {} bucket {} at {}",
            storage.project_id, storage.bucket_name, storage.endpoint_url
        );
        Ok(Self::with_client(
            s3::Client::from_conf(s3_config),
            &storage.bucket_name,
            storage.scheme(),
        ))
    }

    pub fn with_client(client: s3::Client, bucket_name: &str, scheme: &'static str) -> Self {
        S3ObjectStore {
            client,
            bucket_name: bucket_name.to_string(),
            scheme,
        }
    }

    /// `None` when the object disappeared between listing and the HEAD request.
    async fn head(&self, key: &str) -> Result<Option<HeadObjectOutput>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(head)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read metadata of {}", key)),
        }
    }
}

fn is_missing_object<E>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .is_some_and(|response| response.status().as_u16() == 404)
}

fn to_chrono(dt: &s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    fn scheme(&self) -> &str {
        self.scheme
    }

    async fn upload(&self, request: UploadRequest<'_>) -> Result<()> {
        info!(
            "Uploading {} to bucket {} with key {}",
            request.local_path.display(),
            self.bucket_name,
            request.key
        );

        let body = ByteStream::from_path(request.local_path)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", request.local_path.display()))?;

        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(request.key)
            .content_type(request.content_type)
            .body(body);
        for (name, value) in request.metadata {
            put = put.metadata(name, value);
        }

        put.send().await.with_context(|| {
            format!(
                "Failed to upload file {} to bucket {} with key {}",
                request.local_path.display(),
                self.bucket_name,
                request.key
            )
        })?;

        info!("✅ Upload completed: {}", self.uri_for(request.key));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.with_context(|| format!("Failed to list objects in bucket {}", self.bucket_name))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let Some(head) = self.head(key).await? else {
                    debug!("Skipping {}: deleted while listing", key);
                    continue;
                };
                let last_modified = head
                    .last_modified()
                    .or(object.last_modified())
                    .and_then(to_chrono);
                objects.push(RemoteObject {
                    key: key.to_string(),
                    created_at: resolve_created_at(head.metadata(), last_modified),
                });
            }
        }

        debug!("Listed {} objects in bucket {}", objects.len(), self.bucket_name);
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_missing_object(&e) => {
                warn!("{} was already gone from bucket {}", key, self.bucket_name);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete {} from bucket {}", key, self.bucket_name)),
        }
    }
}
