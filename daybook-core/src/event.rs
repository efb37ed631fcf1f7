//! Calendar events.
//!
//! `Event` is the cached record, `NewEvent` is what callers hand to the
//! gateway on creation and `EventPatch` is a partial update merged into an
//! existing document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DaybookError, DaybookResult};
use crate::remote::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Higher rank means more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" | "h" => Some(Priority::High),
            "medium" | "med" | "m" => Some(Priority::Medium),
            "low" | "l" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        };
        f.write_str(s)
    }
}

/// A calendar event owned by one principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub priority: Option<Priority>,
    pub completed: bool,
}

impl Event {
    pub fn from_document(doc: &Document) -> DaybookResult<Self> {
        let fields: NewEvent = doc.decode()?;
        let fields = fields
            .validated()
            .map_err(|e| DaybookError::InvalidDocument(format!("{}: {}", doc.id, e)))?;

        Ok(Event {
            id: doc.id.clone(),
            title: fields.title,
            date: fields.date,
            notes: fields.notes,
            priority: fields.priority,
            completed: fields.completed,
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.date.format("%Y-%m-%d"))
    }
}

/// Fields of an event before the store has assigned it an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub completed: bool,
}

impl NewEvent {
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        NewEvent {
            title: title.into(),
            date,
            notes: None,
            priority: None,
            completed: false,
        }
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Trim text fields and reject an empty title.
    pub fn validated(self) -> DaybookResult<Self> {
        Ok(NewEvent {
            title: required_title(&self.title)?,
            notes: optional_text(self.notes),
            ..self
        })
    }

    pub fn into_event(self, id: String) -> Event {
        Event {
            id,
            title: self.title,
            date: self.date,
            notes: self.notes,
            priority: self.priority,
            completed: self.completed,
        }
    }
}

/// Partial update for an event. `notes` and `priority` use a nested
/// option so that `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl EventPatch {
    pub fn completed(completed: bool) -> Self {
        EventPatch {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &EventPatch::default()
    }

    pub fn validated(self) -> DaybookResult<Self> {
        let title = match self.title {
            Some(t) => Some(required_title(&t)?),
            None => None,
        };
        let notes = self.notes.map(optional_text);
        Ok(EventPatch {
            title,
            notes,
            ..self
        })
    }

    /// Merge the patch into a cached event.
    pub fn apply(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(notes) = &self.notes {
            event.notes = notes.clone();
        }
        if let Some(priority) = self.priority {
            event.priority = priority;
        }
        if let Some(completed) = self.completed {
            event.completed = completed;
        }
    }
}

/// Ascending by date; events on the same day keep their relative order.
pub fn sort_by_date(events: &mut [Event]) {
    events.sort_by_key(|e| e.date);
}

fn required_title(title: &str) -> DaybookResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(DaybookError::Validation("event title must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

fn optional_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
