//! In-process document store.
//!
//! Used by tests and by the CLI, where it is backed by a JSON file so that
//! data survives between invocations the way a remote database would.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{DaybookError, DaybookResult};
use crate::remote::document::{Collection, Document, Fields, strip_reserved};
use crate::remote::store::{DocumentStore, Subscription};

const SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Collections {
    #[serde(default)]
    events: BTreeMap<String, Document>,
    #[serde(default)]
    tasks: BTreeMap<String, Document>,
}

impl Collections {
    fn of(&self, collection: Collection) -> &BTreeMap<String, Document> {
        match collection {
            Collection::Events => &self.events,
            Collection::Tasks => &self.tasks,
        }
    }

    fn of_mut(&mut self, collection: Collection) -> &mut BTreeMap<String, Document> {
        match collection {
            Collection::Events => &mut self.events,
            Collection::Tasks => &mut self.tasks,
        }
    }
}

struct Inner {
    collections: RwLock<Collections>,
    changes: broadcast::Sender<Collection>,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::build(Collections::default(), clock, None)
    }

    /// Open a file-backed store. A missing file starts empty; every write
    /// is flushed back to `path`.
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> DaybookResult<Self> {
        let path = path.into();
        let collections = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Collections::default()
        };
        debug!(path = %path.display(), "opened document store");
        Ok(Self::build(collections, clock, Some(path)))
    }

    fn build(collections: Collections, clock: Arc<dyn Clock>, path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(SUBSCRIPTION_BUFFER);
        MemoryDocumentStore {
            inner: Arc::new(Inner {
                collections: RwLock::new(collections),
                changes,
                clock,
                path,
            }),
        }
    }

    fn owned_by(&self, collection: Collection, owner: &str) -> Vec<Document> {
        owned_by(&self.inner, collection, owner)
    }

    /// Apply `change` to a copy of the collections, persist the copy, then
    /// swap it in. A failed flush leaves the store untouched.
    fn write<R>(
        &self,
        collection: Collection,
        change: impl FnOnce(&mut BTreeMap<String, Document>) -> DaybookResult<R>,
    ) -> DaybookResult<R> {
        let mut guard = self
            .inner
            .collections
            .write()
            .unwrap_or_else(|e| e.into_inner());

        let mut next = guard.clone();
        let result = change(next.of_mut(collection))?;

        if let Some(path) = &self.inner.path {
            persist(path, &next)?;
        }
        *guard = next;
        drop(guard);

        // No receivers is fine.
        let _ = self.inner.changes.send(collection);
        Ok(result)
    }
}

fn owned_by(inner: &Inner, collection: Collection, owner: &str) -> Vec<Document> {
    inner
        .collections
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .of(collection)
        .values()
        .filter(|doc| doc.owner == owner)
        .cloned()
        .collect()
}

fn persist(path: &Path, collections: &Collections) -> DaybookResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(collections)?;
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(
        &self,
        collection: Collection,
        owner: &str,
        fields: Fields,
    ) -> DaybookResult<Document> {
        let now = self.inner.clock.now();
        let doc = Document {
            id: uuid::Uuid::new_v4().simple().to_string(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
            fields: strip_reserved(fields),
        };

        self.write(collection, |docs| {
            docs.insert(doc.id.clone(), doc.clone());
            Ok(())
        })?;
        debug!(%collection, id = %doc.id, owner, "created document");
        Ok(doc)
    }

    async fn get(&self, collection: Collection, id: &str) -> DaybookResult<Option<Document>> {
        Ok(self
            .inner
            .collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .of(collection)
            .get(id)
            .cloned())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> DaybookResult<Document> {
        let now = self.inner.clock.now();
        self.write(collection, |docs| {
            let doc = docs
                .get_mut(id)
                .ok_or_else(|| DaybookError::NotFound(format!("{collection}/{id}")))?;
            doc.fields.extend(strip_reserved(fields));
            doc.updated_at = now;
            Ok(doc.clone())
        })
    }

    async fn delete(&self, collection: Collection, id: &str) -> DaybookResult<()> {
        self.write(collection, |docs| {
            docs.remove(id);
            Ok(())
        })
    }

    async fn query_by_owner(
        &self,
        collection: Collection,
        owner: &str,
    ) -> DaybookResult<Vec<Document>> {
        Ok(self.owned_by(collection, owner))
    }

    async fn subscribe(&self, collection: Collection, owner: &str) -> DaybookResult<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut changes = self.inner.changes.subscribe();

        tx.try_send(self.owned_by(collection, owner))
            .map_err(|e| DaybookError::RemoteOperationFailed(e.to_string()))?;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let owner = owner.to_string();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(changed) if changed != collection => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let Some(inner) = weak.upgrade() else { break };
                let docs = owned_by(&inner, collection, &owner);
                drop(inner);
                if tx.send(docs).await.is_err() {
                    break;
                }
            }
            debug!(%collection, owner = %owner, "subscription closed");
        });

        Ok(Subscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn create_assigns_id_owner_and_timestamps() {
        let clock = clock();
        let store = MemoryDocumentStore::with_clock(clock.clone());
        let doc = store
            .create(Collection::Events, "alice", fields(json!({ "title": "A", "userId": "mallory" })))
            .await
            .unwrap();

        assert!(!doc.id.is_empty());
        assert_eq!(doc.owner, "alice");
        assert_eq!(doc.created_at, clock.now());
        assert!(!doc.fields.contains_key("userId"));
    }

    #[tokio::test]
    async fn query_filters_by_owner_and_collection() {
        let store = MemoryDocumentStore::new();
        store.create(Collection::Events, "alice", fields(json!({}))).await.unwrap();
        store.create(Collection::Events, "bob", fields(json!({}))).await.unwrap();
        store.create(Collection::Tasks, "alice", fields(json!({}))).await.unwrap();

        let events = store.query_by_owner(Collection::Events, "alice").await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events.iter().all(|d| d.owner == "alice"));
    }

    #[tokio::test]
    async fn update_merges_and_bumps_updated_at() {
        let clock = clock();
        let store = MemoryDocumentStore::with_clock(clock.clone());
        let doc = store
            .create(Collection::Tasks, "alice", fields(json!({ "text": "a", "completed": false })))
            .await
            .unwrap();

        clock.advance(Duration::minutes(5));
        let updated = store
            .update(Collection::Tasks, &doc.id, fields(json!({ "completed": true })))
            .await
            .unwrap();

        assert_eq!(updated.fields["text"], "a");
        assert_eq!(updated.fields["completed"], true);
        assert_eq!(updated.created_at, doc.created_at);
        assert_eq!(updated.updated_at, doc.created_at + Duration::minutes(5));
    }

    #[tokio::test]
    async fn update_missing_document_fails() {
        let store = MemoryDocumentStore::new();
        let err = store
            .update(Collection::Events, "nope", fields(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, DaybookError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_missing_document_is_ok() {
        let store = MemoryDocumentStore::new();
        store.delete(Collection::Events, "nope").await.unwrap();
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.json");

        let store = MemoryDocumentStore::open(&path, clock()).unwrap();
        let doc = store
            .create(Collection::Events, "alice", fields(json!({ "title": "Kept" })))
            .await
            .unwrap();
        drop(store);

        let reopened = MemoryDocumentStore::open(&path, clock()).unwrap();
        let found = reopened.get(Collection::Events, &doc.id).await.unwrap();
        assert_eq!(found, Some(doc));
    }

    #[tokio::test]
    async fn subscription_pushes_initial_and_changed_sets() {
        let store = MemoryDocumentStore::new();
        let mut sub = store.subscribe(Collection::Tasks, "alice").await.unwrap();
        assert_eq!(sub.next().await.unwrap().len(), 0);

        store.create(Collection::Tasks, "alice", fields(json!({}))).await.unwrap();
        assert_eq!(sub.next().await.unwrap().len(), 1);

        // Another user's write still triggers a push, filtered to alice.
        store.create(Collection::Tasks, "bob", fields(json!({}))).await.unwrap();
        assert_eq!(sub.next().await.unwrap().len(), 1);
    }
}
