use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{ObjectStore, RemoteObject, UploadRequest, resolve_created_at};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub created_at: Option<DateTime<Utc>>,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// In-process bucket with injectable failures.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    upload_failures: AtomicU32,
    list_failures: AtomicU32,
    uploads: AtomicU32,
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryObjectStore {
    pub fn insert(&self, key: &str, created_at: Option<DateTime<Utc>>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                created_at,
                content_type: String::new(),
                metadata: HashMap::new(),
                body: Vec::new(),
            },
        );
    }

    pub fn fail_next_uploads(&self, count: u32) {
        self.upload_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_lists(&self, count: u32) {
        self.list_failures.store(count, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn upload_count(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    fn scheme(&self) -> &str {
        "gs"
    }

    async fn upload(&self, request: UploadRequest<'_>) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.upload_failures) {
            anyhow::bail!("503 Service Unavailable");
        }
        let body = tokio::fs::read(request.local_path)
            .await
            .with_context(|| format!("reading {}", request.local_path.display()))?;
        let created_at = resolve_created_at(Some(&request.metadata), None);
        self.objects.lock().unwrap().insert(
            request.key.to_string(),
            StoredObject {
                created_at,
                content_type: request.content_type.to_string(),
                metadata: request.metadata,
                body,
            },
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteObject>> {
        if take_one(&self.list_failures) {
            anyhow::bail!("list request timed out");
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, object)| RemoteObject {
                key: key.clone(),
                created_at: object.created_at,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
