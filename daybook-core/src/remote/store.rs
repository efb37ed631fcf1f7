//! The document store seam.
//!
//! Everything remote goes through [`DocumentStore`]: collection-scoped
//! create/read/update/delete, a query on the owner field and a live
//! subscription that pushes the full owner-filtered set on every change.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DaybookResult;
use crate::remote::document::{Collection, Document, Fields};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document owned by `owner`. The store assigns the id and
    /// both timestamps.
    async fn create(&self, collection: Collection, owner: &str, fields: Fields)
    -> DaybookResult<Document>;

    async fn get(&self, collection: Collection, id: &str) -> DaybookResult<Option<Document>>;

    /// Merge `fields` into an existing document and bump `updatedAt`.
    /// Fails with `NotFound` when the id does not exist.
    async fn update(&self, collection: Collection, id: &str, fields: Fields)
    -> DaybookResult<Document>;

    /// Deleting a missing id is not an error.
    async fn delete(&self, collection: Collection, id: &str) -> DaybookResult<()>;

    /// All documents whose owner field equals `owner`, in no particular order.
    async fn query_by_owner(&self, collection: Collection, owner: &str)
    -> DaybookResult<Vec<Document>>;

    /// Push the current owner-filtered set now and after every change.
    async fn subscribe(&self, collection: Collection, owner: &str) -> DaybookResult<Subscription>;
}

/// Receiving end of a live query. Dropping it ends the subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Vec<Document>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<Vec<Document>>) -> Self {
        Subscription { rx }
    }

    /// The next full result set, or `None` once the store stops pushing.
    pub async fn next(&mut self) -> Option<Vec<Document>> {
        self.rx.recv().await
    }
}
