//! S3 implementation of [`ObjectStore`].
//!
//! Every call is bounded by a configurable timeout so a stalled backend
//! request fails the one SFTP operation that issued it instead of wedging
//! the session. Nothing is retried here; the SFTP client owns retries.

use crate::{ObjectInfo, ObjectListing, ObjectMeta, ObjectStore, Result, StoreError};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use std::future::Future;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

/// Connection settings for the S3 backend.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    /// Custom endpoint for S3-compatible stores (MinIO, localstack).
    pub endpoint: Option<String>,
    /// Required by most S3-compatible stores.
    pub force_path_style: bool,
    /// Per-call timeout for backend operations.
    pub op_timeout: Duration,
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    op_timeout: Duration,
}

impl S3ObjectStore {
    /// Build a client from the ambient AWS credential chain.
    pub async fn connect(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            op_timeout: config.op_timeout,
        }
    }

    async fn bounded<F, T>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        timeout(self.op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout { operation })?
    }
}

fn to_chrono(t: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(t.secs(), 0)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str, max_bytes: usize) -> Result<Vec<u8>> {
        debug!(key, "S3 get_object");

        self.bounded("get_object", async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| {
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_no_such_key())
                    {
                        StoreError::NotFound {
                            key: key.to_string(),
                        }
                    } else {
                        StoreError::Backend(err.to_string())
                    }
                })?;

            // Reject oversized objects before buffering them whole.
            if let Some(length) = output.content_length() {
                let actual = usize::try_from(length).unwrap_or(usize::MAX);
                if actual > max_bytes {
                    return Err(StoreError::TooLarge {
                        key: key.to_string(),
                        limit: max_bytes,
                        actual,
                    });
                }
            }

            let bytes = output
                .body
                .collect()
                .await
                .map_err(|err| StoreError::Backend(err.to_string()))?
                .into_bytes();

            if bytes.len() > max_bytes {
                return Err(StoreError::TooLarge {
                    key: key.to_string(),
                    limit: max_bytes,
                    actual: bytes.len(),
                });
            }

            Ok(bytes.to_vec())
        })
        .await
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        debug!(key, bytes = data.len(), "S3 put_object");

        self.bounded("put_object", async {
            let mut request = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(data));
            if let Some(content_type) = content_type {
                request = request.content_type(content_type);
            }
            request
                .send()
                .await
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(key, "S3 delete_object");

        self.bounded("delete_object", async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        debug!(key, "S3 head_object");

        self.bounded("head_object", async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(output) => Ok(Some(ObjectMeta {
                    size: output
                        .content_length()
                        .and_then(|l| u64::try_from(l).ok())
                        .unwrap_or(0),
                    modified: output.last_modified().and_then(to_chrono),
                })),
                Err(err) => {
                    if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                        Ok(None)
                    } else {
                        Err(StoreError::Backend(err.to_string()))
                    }
                }
            }
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<ObjectListing> {
        debug!(prefix, "S3 list_objects_v2");

        self.bounded("list_objects_v2", async {
            let mut listing = ObjectListing::default();
            let mut continuation: Option<String> = None;

            loop {
                let output = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .delimiter("/")
                    .set_continuation_token(continuation.take())
                    .send()
                    .await
                    .map_err(|err| StoreError::Backend(err.to_string()))?;

                for common_prefix in output.common_prefixes() {
                    if let Some(p) = common_prefix.prefix() {
                        listing.prefixes.push(p.to_string());
                    }
                }

                for object in output.contents() {
                    let Some(key) = object.key() else {
                        warn!("Listing entry without a key, skipping");
                        continue;
                    };
                    listing.objects.push(ObjectInfo {
                        key: key.to_string(),
                        size: object
                            .size()
                            .and_then(|s| u64::try_from(s).ok())
                            .unwrap_or(0),
                        modified: object.last_modified().and_then(to_chrono),
                    });
                }

                match output.next_continuation_token() {
                    Some(token) => continuation = Some(token.to_string()),
                    None => break,
                }
            }

            Ok(listing)
        })
        .await
    }
}
