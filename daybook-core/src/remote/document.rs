//! Documents as stored in the remote collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DaybookError, DaybookResult};

pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The two flat remote collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Events,
    Tasks,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Tasks => "tasks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored document: owner field, entity fields and server-assigned timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(rename = "userId")]
    pub owner: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    /// Decode the entity fields into a typed record.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> DaybookResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.fields.clone()))
            .map_err(|e| DaybookError::InvalidDocument(format!("{}: {}", self.id, e)))
    }
}

/// Serialize a record into a field map for create/update calls.
pub fn to_fields<T: Serialize>(value: &T) -> DaybookResult<Fields> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(DaybookError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Keys the store owns; entity fields may not overwrite them.
pub const RESERVED_KEYS: [&str; 4] = ["id", "userId", "createdAt", "updatedAt"];

pub fn strip_reserved(mut fields: Fields) -> Fields {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
    fields
}
