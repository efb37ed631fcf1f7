//! Session manager.
//!
//! Follows the identity provider and drives the store through the session
//! lifecycle: clear and load on sign-in, clear on sign-out. Initial loads
//! are retried a bounded number of times per collection; a collection that
//! never loads is left empty and the session still becomes ready.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{DaybookError, DaybookResult};
use crate::identity::IdentityProvider;
use crate::principal::Principal;
use crate::retry::{RetryPolicy, Sleeper};
use crate::store::{LoadOutcome, SyncStore};

/// What happened to one collection during a session load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionLoad {
    Loaded { count: usize, attempts: u32 },
    /// Every attempt failed; the collection stays empty.
    Failed { attempts: u32, error: String },
    /// The session changed before the load could be applied.
    Superseded,
}

impl CollectionLoad {
    pub fn is_failed(&self) -> bool {
        matches!(self, CollectionLoad::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub events: CollectionLoad,
    pub todos: CollectionLoad,
}

impl LoadReport {
    /// One collection gave up while the other loaded.
    pub fn is_partial_failure(&self) -> bool {
        self.events.is_failed() != self.todos.is_failed()
    }

    pub fn any_failed(&self) -> bool {
        self.events.is_failed() || self.todos.is_failed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    SignedOut,
    Loading,
    /// Collections may be read as authoritative (possibly empty).
    Ready(LoadReport),
}

impl SessionStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SessionStatus::Loading)
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: SyncStore,
    identity: Arc<dyn IdentityProvider>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    status: Arc<watch::Sender<SessionStatus>>,
}

impl SessionManager {
    pub fn new(
        store: SyncStore,
        identity: Arc<dyn IdentityProvider>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::SignedOut);
        SessionManager {
            store,
            identity,
            retry,
            sleeper,
            status: Arc::new(status),
        }
    }

    pub fn store(&self) -> &SyncStore {
        &self.store
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn status_changes(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Resolves once the session is signed out or ready.
    pub async fn wait_ready(&self) -> SessionStatus {
        let mut rx = self.status.subscribe();
        match rx.wait_for(SessionStatus::is_settled).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }

    // AUTHENTICATION:

    pub async fn sign_up(&self, email: &str, password: &str) -> DaybookResult<SessionStatus> {
        let principal = self.identity.sign_up(email, password).await?;
        Ok(self.on_identity_change(Some(principal)).await)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> DaybookResult<SessionStatus> {
        let principal = self.identity.sign_in(email, password).await?;
        Ok(self.on_identity_change(Some(principal)).await)
    }

    pub async fn sign_out(&self) -> DaybookResult<()> {
        self.identity.sign_out().await?;
        self.on_identity_change(None).await;
        Ok(())
    }

    /// Pick up whoever the identity provider already has signed in.
    pub async fn restore(&self) -> SessionStatus {
        self.on_identity_change(self.identity.current()).await
    }

    /// Follow the identity provider until its change stream closes.
    pub async fn run(&self) {
        let mut changes = self.identity.changes();
        let initial = changes.borrow_and_update().clone();
        self.on_identity_change(initial).await;

        while changes.changed().await.is_ok() {
            let principal = changes.borrow_and_update().clone();
            self.on_identity_change(principal).await;
        }
        debug!("identity stream closed");
    }

    // LIFECYCLE:

    /// Apply one authentication transition. A repeated notification for the
    /// principal already loading or loaded is ignored.
    pub async fn on_identity_change(&self, principal: Option<Principal>) -> SessionStatus {
        let Some(principal) = principal else {
            self.store.clear_all_data();
            self.status.send_replace(SessionStatus::SignedOut);
            info!("signed out, cache cleared");
            return SessionStatus::SignedOut;
        };

        let already = self.store.snapshot().user.as_ref() == Some(&principal)
            && *self.status.borrow() != SessionStatus::SignedOut;
        if already {
            debug!(uid = %principal.uid, "duplicate identity notification");
            return self.wait_ready().await;
        }

        info!(uid = %principal.uid, "session started");
        self.store.set_user(Some(principal));
        self.store.clear_events();
        self.store.clear_todos();
        self.load_session().await
    }

    /// Reload both collections for the current session without clearing
    /// them first.
    pub async fn refresh(&self) -> DaybookResult<SessionStatus> {
        if self.store.snapshot().user.is_none() {
            return Err(DaybookError::Unauthenticated);
        }
        Ok(self.load_session().await)
    }

    /// Drop the session's cached data and report signed out. The principal
    /// at the identity provider is left as is.
    pub fn close(&self) {
        self.store.clear_all_data();
        self.status.send_replace(SessionStatus::SignedOut);
        debug!("session closed");
    }

    /// Load both collections and publish a settled status. A load overtaken
    /// by a clear is started again for the current session unless someone
    /// else has settled the status in the meantime.
    async fn load_session(&self) -> SessionStatus {
        loop {
            let Ok(ticket) = self.store.ticket() else {
                self.status.send_replace(SessionStatus::SignedOut);
                return SessionStatus::SignedOut;
            };
            self.status.send_replace(SessionStatus::Loading);

            let (events, todos) = tokio::join!(
                self.load_collection("events", || self.store.load_events_for(&ticket)),
                self.load_collection("todos", || self.store.load_todos_for(&ticket)),
            );
            let report = LoadReport { events, todos };

            if self.store.ticket().ok().as_ref() == Some(&ticket) {
                if report.is_partial_failure() {
                    warn!(uid = %ticket.uid(), ?report, "session ready with a partial load");
                }
                let status = SessionStatus::Ready(report);
                self.status.send_replace(status.clone());
                info!(uid = %ticket.uid(), "session ready");
                return status;
            }

            debug!(uid = %ticket.uid(), "session moved on during load");
            let current = self.status();
            if current.is_settled() {
                return current;
            }
        }
    }

    async fn load_collection<F, Fut>(&self, name: &str, mut load: F) -> CollectionLoad
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DaybookResult<LoadOutcome>>,
    {
        let result = self
            .retry
            .run(self.sleeper.as_ref(), name, |attempt| {
                let pending = load();
                async move { pending.await.map(|outcome| (attempt, outcome)) }
            })
            .await;

        match result {
            Ok((attempts, LoadOutcome::Loaded(count))) => CollectionLoad::Loaded { count, attempts },
            Ok((_, LoadOutcome::Stale)) => CollectionLoad::Superseded,
            Err(exhausted) => {
                warn!(
                    collection = name,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "load gave up, continuing with an empty collection"
                );
                CollectionLoad::Failed {
                    attempts: exhausted.attempts,
                    error: exhausted.error.to_string(),
                }
            }
        }
    }
}
