//! Identity provider seam and a local implementation.
//!
//! Providers publish every authentication transition on a `watch` channel;
//! the session manager is the only intended consumer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{DaybookError, DaybookResult};
use crate::principal::Principal;

pub const MIN_PASSWORD_LEN: usize = 6;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> DaybookResult<Principal>;

    async fn sign_in(&self, email: &str, password: &str) -> DaybookResult<Principal>;

    async fn sign_out(&self) -> DaybookResult<()>;

    /// The currently signed-in principal, if any.
    fn current(&self) -> Option<Principal>;

    /// Yields the principal (or `None`) on every transition.
    fn changes(&self) -> watch::Receiver<Option<Principal>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    uid: String,
    digest: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct IdentityFile {
    #[serde(default)]
    accounts: BTreeMap<String, Account>,
    #[serde(default)]
    current: Option<Principal>,
}

/// Email/password accounts kept in memory, optionally persisted to JSON
/// together with the signed-in principal.
pub struct LocalIdentityProvider {
    accounts: RwLock<BTreeMap<String, Account>>,
    current: watch::Sender<Option<Principal>>,
    path: Option<PathBuf>,
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::build(IdentityFile::default(), None)
    }

    pub fn open(path: impl Into<PathBuf>) -> DaybookResult<Self> {
        let path = path.into();
        let file = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            IdentityFile::default()
        };
        Ok(Self::build(file, Some(path)))
    }

    fn build(file: IdentityFile, path: Option<PathBuf>) -> Self {
        let (current, _) = watch::channel(file.current);
        LocalIdentityProvider {
            accounts: RwLock::new(file.accounts),
            current,
            path,
        }
    }

    fn transition(&self, principal: Option<Principal>) -> DaybookResult<()> {
        let changed = self.current.send_if_modified(|current| {
            if *current == principal {
                false
            } else {
                *current = principal.clone();
                true
            }
        });
        if changed {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> DaybookResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = IdentityFile {
            accounts: self
                .accounts
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            current: self.current.borrow().clone(),
        };
        write_atomic(path, &serde_json::to_string_pretty(&file)?)
    }
}

fn write_atomic(path: &Path, content: &str) -> DaybookResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("json.tmp");
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}

fn normalize_email(email: &str) -> DaybookResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'))
        && !email.chars().any(char::is_whitespace);
    if !valid {
        return Err(DaybookError::Validation(format!("invalid email address '{email}'")));
    }
    Ok(email)
}

fn digest(uid: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(uid.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> DaybookResult<Principal> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DaybookError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let uid = uuid::Uuid::new_v4().simple().to_string();
        {
            let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
            if accounts.contains_key(&email) {
                return Err(DaybookError::Validation(format!(
                    "an account for '{email}' already exists"
                )));
            }
            accounts.insert(
                email.clone(),
                Account {
                    uid: uid.clone(),
                    digest: digest(&uid, password),
                },
            );
        }
        info!(%email, %uid, "account created");

        let principal = Principal::new(uid).with_email(email);
        self.transition(Some(principal.clone()))?;
        Ok(principal)
    }

    async fn sign_in(&self, email: &str, password: &str) -> DaybookResult<Principal> {
        let email = normalize_email(email)?;
        let account = self
            .accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&email)
            .cloned();

        let Some(account) = account.filter(|a| a.digest == digest(&a.uid, password)) else {
            warn!(%email, "rejected sign-in");
            return Err(DaybookError::Unauthenticated);
        };

        debug!(%email, uid = %account.uid, "signed in");
        let principal = Principal::new(account.uid).with_email(email);
        self.transition(Some(principal.clone()))?;
        Ok(principal)
    }

    async fn sign_out(&self) -> DaybookResult<()> {
        debug!("signed out");
        self.transition(None)
    }

    fn current(&self) -> Option<Principal> {
        self.current.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Option<Principal>> {
        self.current.subscribe()
    }
}
