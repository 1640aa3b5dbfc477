//! In-memory [`ObjectStore`] used by tests and local development.
//!
//! Mirrors the delimiter semantics of the S3 listing call so the listing
//! translator can be exercised without a live backend. Committed puts are
//! recorded so tests can assert on exactly what was written.

use crate::{ObjectInfo, ObjectListing, ObjectMeta, ObjectStore, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    puts: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording it as a put.
    pub async fn seed(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.lock().await.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                modified: Utc::now(),
            },
        );
    }

    /// Every `(key, body)` committed through [`ObjectStore::put`], in order.
    pub async fn recorded_puts(&self) -> Vec<(String, Vec<u8>)> {
        self.puts.lock().await.clone()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str, max_bytes: usize) -> Result<Vec<u8>> {
        let objects = self.objects.lock().await;
        let object = objects.get(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        if object.data.len() > max_bytes {
            return Err(StoreError::TooLarge {
                key: key.to_string(),
                limit: max_bytes,
                actual: object.data.len(),
            });
        }
        Ok(object.data.clone())
    }

    async fn put(&self, key: &str, data: Vec<u8>, _content_type: Option<&str>) -> Result<()> {
        self.puts
            .lock()
            .await
            .push((key.to_string(), data.clone()));
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                data,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.objects.lock().await.get(key).map(|o| ObjectMeta {
            size: o.data.len() as u64,
            modified: Some(o.modified),
        }))
    }

    async fn list(&self, prefix: &str) -> Result<ObjectListing> {
        let objects = self.objects.lock().await;
        let mut listing = ObjectListing::default();

        for (key, object) in objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                Some(idx) => {
                    let common = format!("{}{}/", prefix, &rest[..idx]);
                    if listing.prefixes.last() != Some(&common) {
                        listing.prefixes.push(common);
                    }
                }
                None => listing.objects.push(ObjectInfo {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    modified: Some(object.modified),
                }),
            }
        }

        Ok(listing)
    }
}
