//! The authenticated identity that owns events and todos.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub email: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Principal {
            uid: uid.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} ({})", email, self.uid),
            None => write!(f, "{}", self.uid),
        }
    }
}
