//! Synchronized collection store.
//!
//! The single in-memory source of truth for the active session's events and
//! todos. Every write goes through the gateway first and only touches the
//! cache once the remote call succeeded. Observers follow changes through
//! [`SyncStore::watch`].
//!
//! Each `clear_*` and every principal change bumps an epoch. Loads and
//! subscription pushes carry the epoch they were issued under and are
//! dropped if it no longer matches when they complete.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{DaybookError, DaybookResult};
use crate::event::{Event, EventPatch, NewEvent, sort_by_date};
use crate::gateway::Gateway;
use crate::principal::Principal;
use crate::todo::{NewTodo, Todo, TodoPatch, sort_newest_first};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Empty,
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub user: Option<Principal>,
    /// Ascending by date.
    pub events: Vec<Event>,
    /// Newest first as loaded; local inserts go to the front.
    pub todos: Vec<Todo>,
    pub selected_date: NaiveDate,
    pub events_state: LoadState,
    pub todos_state: LoadState,
}

impl Snapshot {
    fn empty(today: NaiveDate) -> Self {
        Snapshot {
            user: None,
            events: Vec::new(),
            todos: Vec::new(),
            selected_date: today,
            events_state: LoadState::Empty,
            todos_state: LoadState::Empty,
        }
    }

    pub fn loading_events(&self) -> bool {
        self.events_state == LoadState::Loading
    }

    pub fn loading_todos(&self) -> bool {
        self.todos_state == LoadState::Loading
    }

    pub fn event(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn todo(&self, id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }
}

/// How the cache catches up after a successful write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Re-fetch the whole collection.
    #[default]
    Reload,
    /// Patch the cache with the known result.
    Local,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub events: ReconcileMode,
    pub todos: ReconcileMode,
}

/// Identifies the session a load was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    epoch: u64,
    uid: String,
}

impl SessionTicket {
    pub fn uid(&self) -> &str {
        &self.uid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    /// The session changed while the load was in flight; nothing applied.
    Stale,
}

struct Guarded {
    snapshot: Snapshot,
    epoch: u64,
}

impl Guarded {
    fn is_current(&self, ticket: &SessionTicket) -> bool {
        self.epoch == ticket.epoch
            && self.snapshot.user.as_ref().map(|u| u.uid.as_str()) == Some(ticket.uid.as_str())
    }

    fn clear_events(&mut self) {
        self.epoch += 1;
        self.snapshot.events.clear();
        self.snapshot.events_state = LoadState::Empty;
    }

    fn clear_todos(&mut self) {
        self.epoch += 1;
        self.snapshot.todos.clear();
        self.snapshot.todos_state = LoadState::Empty;
    }
}

struct Inner {
    gateway: Gateway,
    clock: Arc<dyn Clock>,
    options: StoreOptions,
    state: Mutex<Guarded>,
    tx: watch::Sender<Snapshot>,
}

#[derive(Clone)]
pub struct SyncStore {
    inner: Arc<Inner>,
}

impl SyncStore {
    pub fn new(gateway: Gateway, clock: Arc<dyn Clock>, options: StoreOptions) -> Self {
        let snapshot = Snapshot::empty(clock.today());
        let (tx, _) = watch::channel(snapshot.clone());
        SyncStore {
            inner: Arc::new(Inner {
                gateway,
                clock,
                options,
                state: Mutex::new(Guarded { snapshot, epoch: 0 }),
                tx,
            }),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.inner.tx.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Guarded> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate under the lock and publish the result.
    fn modify<R>(&self, f: impl FnOnce(&mut Guarded) -> R) -> R {
        let mut guard = self.lock();
        let result = f(&mut guard);
        self.inner.tx.send_replace(guard.snapshot.clone());
        result
    }

    /// Like [`modify`](Self::modify) but only while `ticket` is still current.
    fn modify_if_current<R>(
        &self,
        ticket: &SessionTicket,
        f: impl FnOnce(&mut Snapshot) -> R,
    ) -> Option<R> {
        let mut guard = self.lock();
        if !guard.is_current(ticket) {
            return None;
        }
        let result = f(&mut guard.snapshot);
        self.inner.tx.send_replace(guard.snapshot.clone());
        Some(result)
    }

    // SESSION LIFECYCLE:

    /// Switching to a different principal empties both collections first,
    /// so one user's data is never visible under another.
    pub fn set_user(&self, user: Option<Principal>) {
        self.modify(|state| {
            let same = state.snapshot.user.as_ref().map(|u| &u.uid) == user.as_ref().map(|u| &u.uid);
            if !same {
                state.clear_events();
                state.clear_todos();
                debug!(uid = ?user.as_ref().map(|u| &u.uid), "store user changed");
            }
            state.snapshot.user = user;
        });
    }

    pub fn clear_events(&self) {
        self.modify(Guarded::clear_events);
    }

    pub fn clear_todos(&self) {
        self.modify(Guarded::clear_todos);
    }

    /// Back to the signed-out state: no user, empty collections, today selected.
    pub fn clear_all_data(&self) {
        let today = self.inner.clock.today();
        self.modify(|state| {
            state.clear_events();
            state.clear_todos();
            state.snapshot.user = None;
            state.snapshot.selected_date = today;
        });
    }

    pub fn set_selected_date(&self, date: NaiveDate) {
        self.modify(|state| state.snapshot.selected_date = date);
    }

    /// The current session, or `Unauthenticated` when no user is set.
    pub fn ticket(&self) -> DaybookResult<SessionTicket> {
        let guard = self.lock();
        let user = guard
            .snapshot
            .user
            .as_ref()
            .ok_or(DaybookError::Unauthenticated)?;
        Ok(SessionTicket {
            epoch: guard.epoch,
            uid: user.uid.clone(),
        })
    }

    // LOADS:

    pub async fn load_events(&self) -> DaybookResult<LoadOutcome> {
        let ticket = self.ticket()?;
        self.load_events_for(&ticket).await
    }

    pub async fn load_todos(&self) -> DaybookResult<LoadOutcome> {
        let ticket = self.ticket()?;
        self.load_todos_for(&ticket).await
    }

    /// Replace the events cache with the remote set, if `ticket` is still
    /// current when the fetch completes. A failed fetch restores the load
    /// state the collection had before.
    pub async fn load_events_for(&self, ticket: &SessionTicket) -> DaybookResult<LoadOutcome> {
        let Some(previous) = self.begin_load(ticket, |s| &mut s.events_state)? else {
            return Ok(LoadOutcome::Stale);
        };

        match self.inner.gateway.list_events().await {
            Ok(mut events) => {
                sort_by_date(&mut events);
                let count = events.len();
                let applied = self.modify_if_current(ticket, |s| {
                    s.events = events;
                    s.events_state = LoadState::Ready;
                });
                Ok(self.finish_load("events", ticket, count, applied.is_some()))
            }
            Err(e) => {
                self.modify_if_current(ticket, |s| s.events_state = previous);
                Err(e)
            }
        }
    }

    pub async fn load_todos_for(&self, ticket: &SessionTicket) -> DaybookResult<LoadOutcome> {
        let Some(previous) = self.begin_load(ticket, |s| &mut s.todos_state)? else {
            return Ok(LoadOutcome::Stale);
        };

        match self.inner.gateway.list_todos().await {
            Ok(mut todos) => {
                sort_newest_first(&mut todos);
                let count = todos.len();
                let applied = self.modify_if_current(ticket, |s| {
                    s.todos = todos;
                    s.todos_state = LoadState::Ready;
                });
                Ok(self.finish_load("todos", ticket, count, applied.is_some()))
            }
            Err(e) => {
                self.modify_if_current(ticket, |s| s.todos_state = previous);
                Err(e)
            }
        }
    }

    /// Mark the collection as loading. `Ok(None)` means the ticket is stale
    /// or the identity provider already moved on to someone else.
    fn begin_load(
        &self,
        ticket: &SessionTicket,
        state: impl FnOnce(&mut Snapshot) -> &mut LoadState,
    ) -> DaybookResult<Option<LoadState>> {
        let principal = self.inner.gateway.principal()?;
        if principal.uid != ticket.uid {
            debug!(uid = %ticket.uid, current = %principal.uid, "identity moved on, skipping load");
            return Ok(None);
        }
        Ok(self.modify_if_current(ticket, |s| {
            let slot = state(s);
            std::mem::replace(slot, LoadState::Loading)
        }))
    }

    fn finish_load(
        &self,
        collection: &str,
        ticket: &SessionTicket,
        count: usize,
        applied: bool,
    ) -> LoadOutcome {
        if applied {
            info!(collection, count, uid = %ticket.uid, "collection loaded");
            LoadOutcome::Loaded(count)
        } else {
            debug!(collection, uid = %ticket.uid, "discarding stale load");
            LoadOutcome::Stale
        }
    }

    // EVENTS:

    pub async fn add_event(&self, event: NewEvent) -> DaybookResult<Event> {
        let ticket = self.ticket()?;
        let created = self.inner.gateway.add_event(event).await?;
        info!(id = %created.id, "event added");

        let local = created.clone();
        self.reconcile_events(&ticket, move |events| {
            upsert(events, local, |e| &e.id);
            sort_by_date(events);
        })
        .await;
        Ok(created)
    }

    pub async fn update_event(&self, id: &str, patch: EventPatch) -> DaybookResult<()> {
        let ticket = self.ticket()?;
        let patch = patch.validated()?;
        if patch.is_empty() {
            debug!(id, "empty event patch, nothing to write");
            return Ok(());
        }
        self.inner.gateway.update_event(id, patch.clone()).await?;
        debug!(id, "event updated");

        self.reconcile_events(&ticket, |events| {
            if let Some(event) = events.iter_mut().find(|e| e.id == id) {
                patch.apply(event);
            }
            sort_by_date(events);
        })
        .await;
        Ok(())
    }

    /// Always reconciled locally: nothing server-generated is needed to
    /// forget an id.
    pub async fn delete_event(&self, id: &str) -> DaybookResult<()> {
        let ticket = self.ticket()?;
        self.inner.gateway.delete_event(id).await?;
        debug!(id, "event deleted");
        self.modify_if_current(&ticket, |s| s.events.retain(|e| e.id != id));
        Ok(())
    }

    /// Flip `completed` based on the cached value. Returns the new value.
    pub async fn toggle_event_complete(&self, id: &str) -> DaybookResult<bool> {
        let completed = self
            .snapshot()
            .event(id)
            .map(|e| !e.completed)
            .ok_or_else(|| DaybookError::NotFound(format!("event {id}")))?;
        self.update_event(id, EventPatch::completed(completed)).await?;
        Ok(completed)
    }

    async fn reconcile_events(&self, ticket: &SessionTicket, local: impl FnOnce(&mut Vec<Event>)) {
        if self.inner.options.events == ReconcileMode::Reload {
            match self.load_events_for(ticket).await {
                Ok(_) => return,
                Err(e) => warn!(error = %e, "reload after write failed, patching events locally"),
            }
        }
        self.modify_if_current(ticket, |s| local(&mut s.events));
    }

    // TODOS:

    pub async fn add_todo(&self, todo: NewTodo) -> DaybookResult<Todo> {
        let ticket = self.ticket()?;
        let created = self.inner.gateway.add_todo(todo).await?;
        info!(id = %created.id, "todo added");

        let local = created.clone();
        self.reconcile_todos(&ticket, move |todos| {
            todos.retain(|t| t.id != local.id);
            todos.insert(0, local);
        })
        .await;
        Ok(created)
    }

    pub async fn update_todo(&self, id: &str, patch: TodoPatch) -> DaybookResult<()> {
        let ticket = self.ticket()?;
        let patch = patch.validated()?;
        if patch.is_empty() {
            debug!(id, "empty todo patch, nothing to write");
            return Ok(());
        }
        self.inner.gateway.update_todo(id, patch.clone()).await?;
        debug!(id, "todo updated");

        self.reconcile_todos(&ticket, |todos| {
            if let Some(todo) = todos.iter_mut().find(|t| t.id == id) {
                patch.apply(todo);
            }
        })
        .await;
        Ok(())
    }

    pub async fn delete_todo(&self, id: &str) -> DaybookResult<()> {
        let ticket = self.ticket()?;
        self.inner.gateway.delete_todo(id).await?;
        debug!(id, "todo deleted");
        self.modify_if_current(&ticket, |s| s.todos.retain(|t| t.id != id));
        Ok(())
    }

    pub async fn toggle_todo_complete(&self, id: &str) -> DaybookResult<bool> {
        let completed = self
            .snapshot()
            .todo(id)
            .map(|t| !t.completed)
            .ok_or_else(|| DaybookError::NotFound(format!("todo {id}")))?;
        self.update_todo(id, TodoPatch::completed(completed)).await?;
        Ok(completed)
    }

    async fn reconcile_todos(&self, ticket: &SessionTicket, local: impl FnOnce(&mut Vec<Todo>)) {
        if self.inner.options.todos == ReconcileMode::Reload {
            match self.load_todos_for(ticket).await {
                Ok(_) => return,
                Err(e) => warn!(error = %e, "reload after write failed, patching todos locally"),
            }
        }
        self.modify_if_current(ticket, |s| local(&mut s.todos));
    }

    // LIVE UPDATES:

    /// Forward remote pushes into the cache until the session changes or the
    /// returned handle is dropped.
    pub async fn follow_remote(&self) -> DaybookResult<RemoteFollow> {
        let ticket = self.ticket()?;
        let mut events = self.inner.gateway.subscribe_events().await?;
        let mut todos = self.inner.gateway.subscribe_todos().await?;

        let store = self.clone();
        let events_ticket = ticket.clone();
        let events_task = tokio::spawn(async move {
            while let Some(mut pushed) = events.next().await {
                sort_by_date(&mut pushed);
                let applied = store.modify_if_current(&events_ticket, |s| {
                    s.events = pushed;
                    s.events_state = LoadState::Ready;
                });
                if applied.is_none() {
                    break;
                }
            }
            debug!(uid = %events_ticket.uid, "stopped following events");
        });

        let store = self.clone();
        let todos_task = tokio::spawn(async move {
            while let Some(mut pushed) = todos.next().await {
                sort_newest_first(&mut pushed);
                let applied = store.modify_if_current(&ticket, |s| {
                    s.todos = pushed;
                    s.todos_state = LoadState::Ready;
                });
                if applied.is_none() {
                    break;
                }
            }
            debug!(uid = %ticket.uid, "stopped following todos");
        });

        Ok(RemoteFollow {
            tasks: vec![events_task, todos_task],
        })
    }
}

/// Handle for [`SyncStore::follow_remote`]. Dropping it stops forwarding.
pub struct RemoteFollow {
    tasks: Vec<JoinHandle<()>>,
}

impl RemoteFollow {
    pub fn stop(self) {}
}

impl Drop for RemoteFollow {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> &String) {
    match items.iter().position(|existing| key(existing) == key(&item)) {
        Some(i) => items[i] = item,
        None => items.push(item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::identity::{IdentityProvider, LocalIdentityProvider};
    use crate::remote::document::Collection;
    use crate::remote::faulty::{FaultyStore, Operation};
    use crate::remote::memory::MemoryDocumentStore;
    use crate::remote::store::{DocumentStore, Subscription};
    use crate::remote::{Document, Fields};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Harness {
        store: SyncStore,
        faulty: FaultyStore,
        identity: Arc<LocalIdentityProvider>,
    }

    async fn harness(options: StoreOptions) -> Harness {
        let clock = Arc::new(FixedClock::on(date(2024, 3, 5)));
        let documents = MemoryDocumentStore::with_clock(clock.clone());
        let faulty = FaultyStore::new(Arc::new(documents));
        let identity = Arc::new(LocalIdentityProvider::new());
        identity.sign_up("alice@example.com", "secret1").await.unwrap();

        let gateway = Gateway::new(Arc::new(faulty.clone()), identity.clone());
        let store = SyncStore::new(gateway, clock, options);
        store.set_user(identity.current());
        Harness {
            store,
            faulty,
            identity,
        }
    }

    fn local() -> StoreOptions {
        StoreOptions {
            events: ReconcileMode::Local,
            todos: ReconcileMode::Local,
        }
    }

    #[tokio::test]
    async fn load_sorts_events_by_date_and_marks_ready() {
        let h = harness(StoreOptions::default()).await;
        let gateway = h.store.gateway().clone();
        for (title, day) in [("b", 20), ("a", 5), ("c", 12)] {
            gateway.add_event(NewEvent::new(title, date(2024, 1, day))).await.unwrap();
        }

        assert_eq!(h.store.load_events().await.unwrap(), LoadOutcome::Loaded(3));
        let snapshot = h.store.snapshot();
        let titles: Vec<_> = snapshot.events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["a", "c", "b"]);
        assert_eq!(snapshot.events_state, LoadState::Ready);
        assert!(!snapshot.loading_events());
    }

    #[tokio::test]
    async fn failed_load_restores_previous_state() {
        let h = harness(StoreOptions::default()).await;
        h.faulty.fail_next(Operation::Query, 1);

        let err = h.store.load_todos().await.unwrap_err();
        assert!(matches!(err, DaybookError::RemoteOperationFailed(_)));
        assert_eq!(h.store.snapshot().todos_state, LoadState::Empty);
    }

    #[tokio::test]
    async fn load_without_user_is_unauthenticated() {
        let h = harness(StoreOptions::default()).await;
        h.store.clear_all_data();
        assert!(matches!(
            h.store.load_events().await,
            Err(DaybookError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn add_in_reload_mode_refetches_collection() {
        let h = harness(StoreOptions::default()).await;
        let todo = h.store.add_todo(NewTodo::new("buy milk")).await.unwrap();

        assert_eq!(h.faulty.calls(Operation::Query, Collection::Tasks), 1);
        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.todos.len(), 1);
        assert_eq!(snapshot.todos[0].id, todo.id);
    }

    #[tokio::test]
    async fn add_in_local_mode_skips_the_round_trip() {
        let h = harness(local()).await;
        h.store.add_todo(NewTodo::new("first")).await.unwrap();
        h.store.add_todo(NewTodo::new("second")).await.unwrap();

        assert_eq!(h.faulty.calls(Operation::Query, Collection::Tasks), 0);
        let texts: Vec<_> = h.store.snapshot().todos.iter().map(|t| t.text.clone()).collect();
        assert_eq!(texts, ["second", "first"]);
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_unchanged() {
        let h = harness(StoreOptions::default()).await;
        h.store
            .add_event(NewEvent::new("Keep", date(2024, 3, 10)))
            .await
            .unwrap();
        let before = h.store.snapshot();

        h.faulty.fail_next(Operation::Create, 1);
        assert!(h.store.add_event(NewEvent::new("Lost", date(2024, 3, 11))).await.is_err());
        h.faulty.fail_next(Operation::Update, 1);
        let id = before.events[0].id.clone();
        assert!(h.store.toggle_event_complete(&id).await.is_err());

        assert_eq!(h.store.snapshot(), before);
    }

    #[tokio::test]
    async fn reload_failure_after_write_falls_back_to_local_patch() {
        let h = harness(StoreOptions::default()).await;
        h.faulty.fail_next_in(Operation::Query, Collection::Events, 1);

        let event = h
            .store
            .add_event(NewEvent::new("Offline-ish", date(2024, 3, 9)))
            .await
            .unwrap();
        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.events, vec![event]);
        assert_eq!(snapshot.events_state, LoadState::Empty);
    }

    #[tokio::test]
    async fn delete_removes_exactly_one_entry() {
        let h = harness(local()).await;
        let mut ids = Vec::new();
        for text in ["a", "b", "c"] {
            ids.push(h.store.add_todo(NewTodo::new(text)).await.unwrap().id);
        }

        h.store.delete_todo(&ids[1]).await.unwrap();
        let remaining: Vec<_> = h.store.snapshot().todos.iter().map(|t| t.id.clone()).collect();
        assert_eq!(remaining, [ids[2].clone(), ids[0].clone()]);
    }

    #[tokio::test]
    async fn failed_delete_keeps_entry() {
        let h = harness(local()).await;
        let todo = h.store.add_todo(NewTodo::new("stay")).await.unwrap();
        h.faulty.fail_next(Operation::Delete, 1);

        assert!(h.store.delete_todo(&todo.id).await.is_err());
        assert!(h.store.snapshot().todo(&todo.id).is_some());
    }

    #[tokio::test]
    async fn toggle_flips_cached_value() {
        let h = harness(StoreOptions::default()).await;
        let event = h
            .store
            .add_event(NewEvent::new("Gym", date(2024, 3, 6)))
            .await
            .unwrap();

        assert!(h.store.toggle_event_complete(&event.id).await.unwrap());
        assert!(h.store.snapshot().event(&event.id).unwrap().completed);
        assert!(!h.store.toggle_event_complete(&event.id).await.unwrap());
        assert!(!h.store.snapshot().event(&event.id).unwrap().completed);
    }

    #[tokio::test]
    async fn toggle_unknown_id_is_not_found() {
        let h = harness(StoreOptions::default()).await;
        let err = h.store.toggle_todo_complete("missing").await.unwrap_err();
        assert!(matches!(err, DaybookError::NotFound(_)));
    }

    #[tokio::test]
    async fn clear_all_data_is_idempotent() {
        let h = harness(local()).await;
        h.store.add_todo(NewTodo::new("x")).await.unwrap();
        h.store.set_selected_date(date(2024, 12, 25));

        for _ in 0..2 {
            h.store.clear_all_data();
            let snapshot = h.store.snapshot();
            assert!(snapshot.events.is_empty());
            assert!(snapshot.todos.is_empty());
            assert_eq!(snapshot.user, None);
            assert_eq!(snapshot.selected_date, date(2024, 3, 5));
        }
    }

    #[tokio::test]
    async fn switching_user_clears_before_loading() {
        let h = harness(local()).await;
        h.store.add_todo(NewTodo::new("alice's")).await.unwrap();

        let bob = h.identity.sign_up("bob@example.com", "secret2").await.unwrap();
        h.store.set_user(Some(bob.clone()));
        assert!(h.store.snapshot().todos.is_empty());

        h.store.add_todo(NewTodo::new("bob's")).await.unwrap();
        h.store.load_todos().await.unwrap();
        let todos = h.store.snapshot().todos;
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "bob's");
    }

    #[tokio::test]
    async fn setting_same_user_keeps_cache() {
        let h = harness(local()).await;
        h.store.add_todo(NewTodo::new("kept")).await.unwrap();
        h.store.set_user(h.identity.current());
        assert_eq!(h.store.snapshot().todos.len(), 1);
    }

    /// Holds every query until released.
    struct GatedStore {
        inner: MemoryDocumentStore,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl DocumentStore for GatedStore {
        async fn create(&self, c: Collection, owner: &str, f: Fields) -> DaybookResult<Document> {
            self.inner.create(c, owner, f).await
        }
        async fn get(&self, c: Collection, id: &str) -> DaybookResult<Option<Document>> {
            self.inner.get(c, id).await
        }
        async fn update(&self, c: Collection, id: &str, f: Fields) -> DaybookResult<Document> {
            self.inner.update(c, id, f).await
        }
        async fn delete(&self, c: Collection, id: &str) -> DaybookResult<()> {
            self.inner.delete(c, id).await
        }
        async fn query_by_owner(&self, c: Collection, owner: &str) -> DaybookResult<Vec<Document>> {
            self.gate.notified().await;
            self.inner.query_by_owner(c, owner).await
        }
        async fn subscribe(&self, c: Collection, owner: &str) -> DaybookResult<Subscription> {
            self.inner.subscribe(c, owner).await
        }
    }

    #[tokio::test]
    async fn late_load_from_previous_session_is_discarded() {
        let clock = Arc::new(FixedClock::on(date(2024, 3, 5)));
        let gate = Arc::new(Notify::new());
        let documents = GatedStore {
            inner: MemoryDocumentStore::with_clock(clock.clone()),
            gate: gate.clone(),
        };
        let identity = Arc::new(LocalIdentityProvider::new());
        let alice = identity.sign_up("alice@example.com", "secret1").await.unwrap();
        let gateway = Gateway::new(Arc::new(documents), identity.clone());
        gateway.add_todo(NewTodo::new("alice's")).await.unwrap();

        let store = SyncStore::new(gateway, clock, StoreOptions::default());
        store.set_user(Some(alice));

        let (outcome, _) = tokio::join!(store.load_todos(), async {
            store.clear_all_data();
            gate.notify_one();
        });

        assert_eq!(outcome.unwrap(), LoadOutcome::Stale);
        let snapshot = store.snapshot();
        assert!(snapshot.todos.is_empty());
        assert_eq!(snapshot.todos_state, LoadState::Empty);
    }

    #[tokio::test]
    async fn empty_patch_skips_the_remote_write() {
        let h = harness(StoreOptions::default()).await;
        let todo = h.store.add_todo(NewTodo::new("buy milk")).await.unwrap();

        h.store.update_todo(&todo.id, TodoPatch::default()).await.unwrap();
        h.store.update_event("missing", EventPatch::default()).await.unwrap();

        assert_eq!(h.faulty.calls(Operation::Update, Collection::Tasks), 0);
        assert_eq!(h.faulty.calls(Operation::Update, Collection::Events), 0);
        // Only the reload that followed the add.
        assert_eq!(h.faulty.calls(Operation::Query, Collection::Tasks), 1);
        assert_eq!(h.store.snapshot().todos[0].text, "buy milk");
    }

    #[tokio::test]
    async fn watchers_see_every_change() {
        let h = harness(local()).await;
        let mut rx = h.store.watch();
        h.store.set_selected_date(date(2024, 4, 1));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().selected_date, date(2024, 4, 1));
    }

    #[tokio::test]
    async fn follow_remote_applies_pushes_until_session_changes() {
        let h = harness(local()).await;
        let follow = h.store.follow_remote().await.unwrap();
        let mut rx = h.store.watch();

        // A write from "another device", straight to the gateway.
        h.store.gateway().add_todo(NewTodo::new("remote")).await.unwrap();
        let snapshot = rx
            .wait_for(|s| s.todos.iter().any(|t| t.text == "remote"))
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.todos_state, LoadState::Ready);

        h.store.clear_all_data();
        h.store.gateway().add_todo(NewTodo::new("after")).await.unwrap();
        tokio::task::yield_now().await;
        assert!(h.store.snapshot().todos.is_empty());
        follow.stop();
    }
}
