//! Todo items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DaybookError, DaybookResult};
use crate::remote::document::Document;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Todo {
    /// `created_at` comes from the document's server-assigned timestamp.
    pub fn from_document(doc: &Document) -> DaybookResult<Self> {
        let fields: NewTodo = doc.decode()?;
        let fields = fields
            .validated()
            .map_err(|e| DaybookError::InvalidDocument(format!("{}: {}", doc.id, e)))?;

        Ok(Todo {
            id: doc.id.clone(),
            text: fields.text,
            completed: fields.completed,
            created_at: doc.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTodo {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl NewTodo {
    pub fn new(text: impl Into<String>) -> Self {
        NewTodo {
            text: text.into(),
            completed: false,
        }
    }

    pub fn validated(self) -> DaybookResult<Self> {
        Ok(NewTodo {
            text: required_text(&self.text)?,
            ..self
        })
    }

    pub fn into_todo(self, id: String, created_at: DateTime<Utc>) -> Todo {
        Todo {
            id,
            text: self.text,
            completed: self.completed,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TodoPatch {
    pub fn completed(completed: bool) -> Self {
        TodoPatch {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &TodoPatch::default()
    }

    pub fn validated(self) -> DaybookResult<Self> {
        let text = match self.text {
            Some(t) => Some(required_text(&t)?),
            None => None,
        };
        Ok(TodoPatch { text, ..self })
    }

    pub fn apply(&self, todo: &mut Todo) {
        if let Some(text) = &self.text {
            todo.text = text.clone();
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
    }
}

fn required_text(text: &str) -> DaybookResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DaybookError::Validation("todo text must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

/// Newest first; ties keep their relative order.
pub fn sort_newest_first(todos: &mut [Todo]) {
    todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn todo(id: &str, hour: u32) -> Todo {
        Todo {
            id: id.to_string(),
            text: format!("task {id}"),
            completed: false,
            created_at: Utc.with_ymd_and_hms(2024, 4, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(NewTodo::new(" \t").validated().is_err());
        assert!(TodoPatch {
            text: Some(String::new()),
            completed: None
        }
        .validated()
        .is_err());
    }

    #[test]
    fn from_document_uses_document_creation_time() {
        let created = Utc.with_ymd_and_hms(2024, 4, 2, 8, 30, 0).unwrap();
        let doc = Document {
            id: "t1".into(),
            owner: "alice".into(),
            created_at: created,
            updated_at: created,
            fields: serde_json::json!({ "text": " buy milk ", "completed": true })
                .as_object()
                .unwrap()
                .clone(),
        };
        let todo = Todo::from_document(&doc).unwrap();
        assert_eq!(todo.text, "buy milk");
        assert!(todo.completed);
        assert_eq!(todo.created_at, created);
    }

    #[test]
    fn sorts_newest_first() {
        let mut todos = vec![todo("a", 8), todo("b", 12), todo("c", 10)];
        sort_newest_first(&mut todos);
        let ids: Vec<_> = todos.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }
}
