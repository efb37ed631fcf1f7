//! Persistence gateway.
//!
//! Translates event/todo operations into document store calls scoped to the
//! signed-in principal. Remote failures come back as `Err` values; nothing
//! here panics or retries.

use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{DaybookError, DaybookResult};
use crate::event::{Event, EventPatch, NewEvent};
use crate::identity::IdentityProvider;
use crate::principal::Principal;
use crate::remote::document::{Collection, Document, to_fields};
use crate::remote::store::{DocumentStore, Subscription};
use crate::todo::{NewTodo, Todo, TodoPatch};

/// A typed entity living in one remote collection.
pub trait Record: Sized {
    const COLLECTION: Collection;

    fn from_document(doc: &Document) -> DaybookResult<Self>;
}

impl Record for Event {
    const COLLECTION: Collection = Collection::Events;

    fn from_document(doc: &Document) -> DaybookResult<Self> {
        Event::from_document(doc)
    }
}

impl Record for Todo {
    const COLLECTION: Collection = Collection::Tasks;

    fn from_document(doc: &Document) -> DaybookResult<Self> {
        Todo::from_document(doc)
    }
}

#[derive(Clone)]
pub struct Gateway {
    documents: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    verify_ownership: bool,
}

impl Gateway {
    pub fn new(documents: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Gateway {
            documents,
            identity,
            verify_ownership: true,
        }
    }

    /// Check that update/delete targets belong to the signed-in principal
    /// before writing. Without it ownership is left to the backend's rules.
    pub fn verify_ownership(mut self, enabled: bool) -> Self {
        self.verify_ownership = enabled;
        self
    }

    pub fn principal(&self) -> DaybookResult<Principal> {
        self.identity.current().ok_or(DaybookError::Unauthenticated)
    }

    // EVENTS:

    pub async fn add_event(&self, event: NewEvent) -> DaybookResult<Event> {
        let event = event.validated()?;
        let doc = self.create(Collection::Events, to_fields(&event)?).await?;
        Ok(event.into_event(doc.id))
    }

    pub async fn update_event(&self, id: &str, patch: EventPatch) -> DaybookResult<()> {
        let patch = patch.validated()?;
        self.update(Collection::Events, id, to_fields(&patch)?).await
    }

    pub async fn delete_event(&self, id: &str) -> DaybookResult<()> {
        self.delete(Collection::Events, id).await
    }

    pub async fn list_events(&self) -> DaybookResult<Vec<Event>> {
        self.list().await
    }

    pub async fn subscribe_events(&self) -> DaybookResult<Feed<Event>> {
        self.subscribe().await
    }

    // TODOS:

    pub async fn add_todo(&self, todo: NewTodo) -> DaybookResult<Todo> {
        let todo = todo.validated()?;
        let doc = self.create(Collection::Tasks, to_fields(&todo)?).await?;
        Ok(todo.into_todo(doc.id, doc.created_at))
    }

    pub async fn update_todo(&self, id: &str, patch: TodoPatch) -> DaybookResult<()> {
        let patch = patch.validated()?;
        self.update(Collection::Tasks, id, to_fields(&patch)?).await
    }

    pub async fn delete_todo(&self, id: &str) -> DaybookResult<()> {
        self.delete(Collection::Tasks, id).await
    }

    pub async fn list_todos(&self) -> DaybookResult<Vec<Todo>> {
        self.list().await
    }

    pub async fn subscribe_todos(&self) -> DaybookResult<Feed<Todo>> {
        self.subscribe().await
    }

    // SHARED:

    async fn create(
        &self,
        collection: Collection,
        fields: crate::remote::Fields,
    ) -> DaybookResult<Document> {
        let principal = self.principal()?;
        let doc = self
            .documents
            .create(collection, &principal.uid, fields)
            .await
            .map_err(|e| remote_failure("create", collection, e))?;
        debug!(%collection, id = %doc.id, uid = %principal.uid, "document created");
        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: crate::remote::Fields,
    ) -> DaybookResult<()> {
        let principal = self.principal()?;
        if self.verify_ownership {
            match self.owner_of(collection, id).await? {
                Some(owner) if owner == principal.uid => {}
                Some(_) => return Err(DaybookError::NotOwned(id.to_string())),
                None => return Err(DaybookError::NotFound(format!("{collection}/{id}"))),
            }
        }
        self.documents
            .update(collection, id, fields)
            .await
            .map_err(|e| remote_failure("update", collection, e))?;
        debug!(%collection, id, "document updated");
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> DaybookResult<()> {
        let principal = self.principal()?;
        if self.verify_ownership {
            match self.owner_of(collection, id).await? {
                Some(owner) if owner != principal.uid => {
                    return Err(DaybookError::NotOwned(id.to_string()));
                }
                // Already gone: nothing to do.
                None => return Ok(()),
                Some(_) => {}
            }
        }
        self.documents
            .delete(collection, id)
            .await
            .map_err(|e| remote_failure("delete", collection, e))?;
        debug!(%collection, id, "document deleted");
        Ok(())
    }

    async fn owner_of(&self, collection: Collection, id: &str) -> DaybookResult<Option<String>> {
        let doc = self
            .documents
            .get(collection, id)
            .await
            .map_err(|e| remote_failure("get", collection, e))?;
        Ok(doc.map(|d| d.owner))
    }

    async fn list<R: Record>(&self) -> DaybookResult<Vec<R>> {
        let principal = self.principal()?;
        let collection = R::COLLECTION;
        let docs = self
            .documents
            .query_by_owner(collection, &principal.uid)
            .await
            .map_err(|e| remote_failure("list", collection, e))?;
        debug!(%collection, count = docs.len(), uid = %principal.uid, "fetched documents");
        Ok(decode_all(collection, &docs))
    }

    async fn subscribe<R: Record>(&self) -> DaybookResult<Feed<R>> {
        let principal = self.principal()?;
        let subscription = self
            .documents
            .subscribe(R::COLLECTION, &principal.uid)
            .await
            .map_err(|e| remote_failure("subscribe", R::COLLECTION, e))?;
        Ok(Feed {
            subscription,
            _record: PhantomData,
        })
    }
}

/// Decode documents, skipping (and logging) any that fail validation.
fn decode_all<R: Record>(collection: Collection, docs: &[Document]) -> Vec<R> {
    docs.iter()
        .filter_map(|doc| match R::from_document(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%collection, id = %doc.id, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

/// Normalize a store failure into `RemoteOperationFailed`, keeping the
/// variants callers branch on.
fn remote_failure(op: &str, collection: Collection, e: DaybookError) -> DaybookError {
    error!(op, %collection, error = %e, "remote operation failed");
    match e {
        DaybookError::NotFound(_) | DaybookError::RemoteOperationFailed(_) => e,
        other => DaybookError::RemoteOperationFailed(other.to_string()),
    }
}

/// Typed live feed over a [`Subscription`].
pub struct Feed<R> {
    subscription: Subscription,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Feed<R> {
    /// The next full set pushed by the store, or `None` once it closes.
    pub async fn next(&mut self) -> Option<Vec<R>> {
        let docs = self.subscription.next().await?;
        Some(decode_all(R::COLLECTION, &docs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocalIdentityProvider;
    use crate::remote::faulty::{FaultyStore, Operation};
    use crate::remote::memory::MemoryDocumentStore;
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup() -> (Gateway, Arc<MemoryDocumentStore>, Arc<LocalIdentityProvider>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let identity = Arc::new(LocalIdentityProvider::new());
        identity.sign_up("alice@example.com", "secret1").await.unwrap();
        let gateway = Gateway::new(store.clone(), identity.clone());
        (gateway, store, identity)
    }

    #[tokio::test]
    async fn add_event_requires_principal() {
        let (gateway, _, identity) = setup().await;
        identity.sign_out().await.unwrap();
        let err = gateway
            .add_event(NewEvent::new("Dentist", date(2024, 1, 5)))
            .await
            .unwrap_err();
        assert!(matches!(err, DaybookError::Unauthenticated));
    }

    #[tokio::test]
    async fn add_event_assigns_owner_and_id() {
        let (gateway, store, identity) = setup().await;
        let event = gateway
            .add_event(NewEvent::new("Dentist", date(2024, 1, 5)))
            .await
            .unwrap();

        let doc = store.get(Collection::Events, &event.id).await.unwrap().unwrap();
        assert_eq!(doc.owner, identity.current().unwrap().uid);
        assert_eq!(doc.fields["title"], "Dentist");
    }

    #[tokio::test]
    async fn list_only_returns_own_documents() {
        let (gateway, _, identity) = setup().await;
        gateway.add_event(NewEvent::new("Mine", date(2024, 1, 5))).await.unwrap();

        identity.sign_up("bob@example.com", "secret2").await.unwrap();
        gateway.add_event(NewEvent::new("Bob's", date(2024, 1, 6))).await.unwrap();
        let events = gateway.list_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Bob's");
    }

    #[tokio::test]
    async fn list_skips_malformed_documents() {
        let (gateway, store, identity) = setup().await;
        let uid = identity.current().unwrap().uid;
        store
            .create(
                Collection::Events,
                &uid,
                json!({ "title": "no date" }).as_object().unwrap().clone(),
            )
            .await
            .unwrap();
        gateway.add_event(NewEvent::new("Good", date(2024, 1, 5))).await.unwrap();

        let events = gateway.list_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Good");
    }

    #[tokio::test]
    async fn update_rejects_other_users_documents() {
        let (gateway, _, identity) = setup().await;
        let event = gateway
            .add_event(NewEvent::new("Alice only", date(2024, 1, 5)))
            .await
            .unwrap();

        identity.sign_up("mallory@example.com", "secret3").await.unwrap();
        let err = gateway
            .update_event(&event.id, EventPatch::completed(true))
            .await
            .unwrap_err();
        assert!(matches!(err, DaybookError::NotOwned(_)));
        let err = gateway.delete_event(&event.id).await.unwrap_err();
        assert!(matches!(err, DaybookError::NotOwned(_)));
    }

    #[tokio::test]
    async fn unverified_update_is_left_to_the_backend() {
        let (gateway, store, identity) = setup().await;
        let gateway = gateway.verify_ownership(false);
        let todo = gateway.add_todo(NewTodo::new("shared?")).await.unwrap();

        identity.sign_up("mallory@example.com", "secret3").await.unwrap();
        gateway.update_todo(&todo.id, TodoPatch::completed(true)).await.unwrap();
        let doc = store.get(Collection::Tasks, &todo.id).await.unwrap().unwrap();
        assert_eq!(doc.fields["completed"], true);
    }

    #[tokio::test]
    async fn delete_missing_id_succeeds() {
        let (gateway, _, _) = setup().await;
        gateway.delete_todo("does-not-exist").await.unwrap();
    }

    #[tokio::test]
    async fn remote_failures_are_returned_not_thrown() {
        let identity = Arc::new(LocalIdentityProvider::new());
        identity.sign_up("alice@example.com", "secret1").await.unwrap();
        let faulty = FaultyStore::new(Arc::new(MemoryDocumentStore::new()));
        faulty.fail_next(Operation::Create, 1);
        let gateway = Gateway::new(Arc::new(faulty.clone()), identity);

        let err = gateway.add_todo(NewTodo::new("write tests")).await.unwrap_err();
        assert!(matches!(err, DaybookError::RemoteOperationFailed(_)));
        // The next call goes through.
        gateway.add_todo(NewTodo::new("write tests")).await.unwrap();
        assert_eq!(faulty.calls(Operation::Create, Collection::Tasks), 2);
    }

    #[tokio::test]
    async fn feed_decodes_pushed_sets() {
        let (gateway, _, _) = setup().await;
        let mut feed = gateway.subscribe_todos().await.unwrap();
        assert!(feed.next().await.unwrap().is_empty());

        gateway.add_todo(NewTodo::new("one")).await.unwrap();
        let todos = feed.next().await.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "one");
    }
}
