//! The context object bundling one client's session and store.
//!
//! Each `Daybook` is fully isolated: its own document store handle, identity
//! provider, cache and session status. Tests build several side by side.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::DaybookConfig;
use crate::error::DaybookResult;
use crate::gateway::Gateway;
use crate::identity::{IdentityProvider, LocalIdentityProvider};
use crate::remote::memory::MemoryDocumentStore;
use crate::remote::store::DocumentStore;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::session::SessionManager;
use crate::store::{Snapshot, StoreOptions, SyncStore};
use crate::views::Overview;

#[derive(Clone)]
pub struct Daybook {
    session: SessionManager,
    clock: Arc<dyn Clock>,
}

impl Daybook {
    pub fn builder(
        documents: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> DaybookBuilder {
        DaybookBuilder {
            documents,
            identity,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
            options: StoreOptions::default(),
            verify_ownership: true,
        }
    }

    /// File-backed daybook under the configured data directory.
    pub fn open(config: &DaybookConfig) -> DaybookResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let documents = MemoryDocumentStore::open(config.documents_path(), clock.clone())?;
        let identity = LocalIdentityProvider::open(config.identity_path())?;
        debug!(path = %config.data_path().display(), "opened daybook");

        Ok(Self::builder(Arc::new(documents), Arc::new(identity))
            .clock(clock)
            .retry(config.retry_policy())
            .options(config.store_options())
            .verify_ownership(config.verify_ownership)
            .build())
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn store(&self) -> &SyncStore {
        self.session.store()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store().snapshot()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn overview(&self) -> Overview {
        Overview::compute(&self.snapshot(), self.today())
    }

    /// Tear down the session: cached data is dropped, the signed-in
    /// principal at the identity provider is left as is.
    pub fn close(&self) {
        self.session.close();
    }
}

pub struct DaybookBuilder {
    documents: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    options: StoreOptions,
    verify_ownership: bool,
}

impl DaybookBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn verify_ownership(mut self, enabled: bool) -> Self {
        self.verify_ownership = enabled;
        self
    }

    pub fn build(self) -> Daybook {
        let gateway = Gateway::new(self.documents, self.identity.clone())
            .verify_ownership(self.verify_ownership);
        let store = SyncStore::new(gateway, self.clock.clone(), self.options);
        let session = SessionManager::new(store, self.identity, self.retry, self.sleeper);
        Daybook {
            session,
            clock: self.clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::session::SessionStatus;

    #[tokio::test]
    async fn open_persists_accounts_and_documents() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaybookConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let daybook = Daybook::open(&config).unwrap();
        daybook
            .session()
            .sign_up("alice@example.com", "secret1")
            .await
            .unwrap();
        daybook
            .store()
            .add_todo(crate::todo::NewTodo::new("persisted"))
            .await
            .unwrap();
        drop(daybook);

        let reopened = Daybook::open(&config).unwrap();
        let status = reopened.session().restore().await;
        assert!(matches!(status, SessionStatus::Ready(_)));
        assert_eq!(reopened.snapshot().todos[0].text, "persisted");
    }

    #[tokio::test]
    async fn instances_are_isolated() {
        let documents: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()));
        let first = Daybook::builder(documents.clone(), Arc::new(LocalIdentityProvider::new()))
            .clock(clock.clone())
            .build();
        let second = Daybook::builder(documents, Arc::new(LocalIdentityProvider::new()))
            .clock(clock)
            .build();

        first.session().sign_up("a@example.com", "secret1").await.unwrap();
        assert!(first.snapshot().user.is_some());
        assert!(second.snapshot().user.is_none());
        assert_eq!(first.today(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[tokio::test]
    async fn close_signs_the_session_out() {
        let daybook = Daybook::builder(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(LocalIdentityProvider::new()),
        )
        .build();
        daybook.session().sign_up("a@example.com", "secret1").await.unwrap();

        daybook.close();
        assert_eq!(daybook.session().status(), SessionStatus::SignedOut);
        assert!(daybook.snapshot().user.is_none());
    }
}
