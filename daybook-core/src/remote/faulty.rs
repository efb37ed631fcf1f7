//! Failure injection around any [`DocumentStore`].
//!
//! Lets tests and demos simulate an unreachable backend for chosen
//! operations without touching the wrapped store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{DaybookError, DaybookResult};
use crate::remote::document::{Collection, Document, Fields};
use crate::remote::store::{DocumentStore, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    Update,
    Delete,
    Query,
    Subscribe,
}

#[derive(Debug, Default, Clone, Copy)]
struct Plan {
    /// Remaining forced failures; `u32::MAX` means always.
    remaining: u32,
    calls: u32,
}

#[derive(Clone)]
pub struct FaultyStore {
    inner: Arc<dyn DocumentStore>,
    plans: Arc<Mutex<HashMap<(Operation, Option<Collection>), Plan>>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        FaultyStore {
            inner,
            plans: Arc::default(),
        }
    }

    /// Fail the next `times` calls of `op` on any collection.
    pub fn fail_next(&self, op: Operation, times: u32) {
        self.plan(op, None, times);
    }

    /// Fail the next `times` calls of `op` on one collection only.
    pub fn fail_next_in(&self, op: Operation, collection: Collection, times: u32) {
        self.plan(op, Some(collection), times);
    }

    pub fn fail_always(&self, op: Operation) {
        self.plan(op, None, u32::MAX);
    }

    /// Stop injecting failures and reset call counts.
    pub fn heal(&self) {
        self.plans.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// How many times `op` on `collection` reached this wrapper (failed or not).
    pub fn calls(&self, op: Operation, collection: Collection) -> u32 {
        let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        plans
            .get(&(op, Some(collection)))
            .map(|p| p.calls)
            .unwrap_or(0)
    }

    fn plan(&self, op: Operation, collection: Option<Collection>, times: u32) {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        plans.entry((op, collection)).or_default().remaining = times;
    }

    fn check(&self, op: Operation, collection: Collection) -> DaybookResult<()> {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        let mut fail = false;
        for key in [(op, Some(collection)), (op, None)] {
            let plan = plans.entry(key).or_default();
            plan.calls += 1;
            if !fail && plan.remaining > 0 {
                if plan.remaining != u32::MAX {
                    plan.remaining -= 1;
                }
                fail = true;
            }
        }
        if fail {
            return Err(DaybookError::RemoteOperationFailed(format!(
                "injected {:?} failure on {}",
                op, collection
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn create(
        &self,
        collection: Collection,
        owner: &str,
        fields: Fields,
    ) -> DaybookResult<Document> {
        self.check(Operation::Create, collection)?;
        self.inner.create(collection, owner, fields).await
    }

    async fn get(&self, collection: Collection, id: &str) -> DaybookResult<Option<Document>> {
        self.check(Operation::Get, collection)?;
        self.inner.get(collection, id).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> DaybookResult<Document> {
        self.check(Operation::Update, collection)?;
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> DaybookResult<()> {
        self.check(Operation::Delete, collection)?;
        self.inner.delete(collection, id).await
    }

    async fn query_by_owner(
        &self,
        collection: Collection,
        owner: &str,
    ) -> DaybookResult<Vec<Document>> {
        self.check(Operation::Query, collection)?;
        self.inner.query_by_owner(collection, owner).await
    }

    async fn subscribe(&self, collection: Collection, owner: &str) -> DaybookResult<Subscription> {
        self.check(Operation::Subscribe, collection)?;
        self.inner.subscribe(collection, owner).await
    }
}
