//! TUI rendering traits for daybook types.
//!
//! This module provides extension traits that add colored terminal rendering
//! to daybook-core types using owo_colors.

use chrono::NaiveDate;
use daybook_core::views::{MonthGroup, Overview};
use daybook_core::{CollectionLoad, Event, LoadReport, Principal, Priority, Todo};
use owo_colors::OwoColorize;

/// Characters of an id shown in listings; commands accept any unique prefix.
pub const SHORT_ID_LEN: usize = 8;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for Priority {
    fn render(&self) -> String {
        match self {
            Priority::High => "high".red().to_string(),
            Priority::Medium => "medium".yellow().to_string(),
            Priority::Low => "low".green().to_string(),
        }
    }
}

impl Render for Event {
    fn render(&self) -> String {
        let title = if self.completed {
            self.title.dimmed().strikethrough().to_string()
        } else {
            self.title.clone()
        };
        let mut line = format!(
            "{} {} {}",
            checkbox(self.completed),
            short_id(&self.id).dimmed(),
            title
        );
        if let Some(priority) = self.priority {
            line.push_str(&format!(" [{}]", priority.render()));
        }
        if let Some(notes) = &self.notes {
            line.push_str(&format!("\n            {}", notes.dimmed()));
        }
        line
    }
}

impl Render for Todo {
    fn render(&self) -> String {
        let text = if self.completed {
            self.text.dimmed().strikethrough().to_string()
        } else {
            self.text.clone()
        };
        format!(
            "{} {} {}",
            checkbox(self.completed),
            short_id(&self.id).dimmed(),
            text
        )
    }
}

impl Render for Principal {
    fn render(&self) -> String {
        match &self.email {
            Some(email) => email.bold().to_string(),
            None => self.uid.bold().to_string(),
        }
    }
}

impl Render for MonthGroup<'_> {
    fn render(&self) -> String {
        let mut lines = vec![self.label().bold().to_string()];
        for event in &self.events {
            let day = event.date.format("%a %-d").to_string();
            lines.push(format!("  {:>6}  {}", day.dimmed(), event.render()));
        }
        lines.join("\n")
    }
}

impl Render for Overview {
    fn render(&self) -> String {
        let mut lines = vec![
            self.today.format("%A, %B %-d").to_string().bold().to_string(),
            String::new(),
            format!("  Events today      {}", self.events_today),
            format!("  Upcoming          {}", self.upcoming_events),
            format!("  Completed events  {}", self.completed_events),
            format!("  Active todos      {}", self.active_todos),
            format!("  Todos done        {}%", self.completion_rate),
            String::new(),
        ];

        let priorities: Vec<String> = Priority::ALL
            .iter()
            .map(|p| format!("{} {}", self.priorities.get(*p), p.render()))
            .collect();
        lines.push(format!("  Priorities        {}", priorities.join("  ")));

        match &self.next_event {
            Some(event) => lines.push(format!(
                "  Next up           {} {}",
                event.title.bold(),
                format_date_label(event.date, self.today).dimmed()
            )),
            None => lines.push(format!("  Next up           {}", "nothing planned".dimmed())),
        }
        lines.join("\n")
    }
}

fn checkbox(done: bool) -> String {
    if done {
        "[x]".green().to_string()
    } else {
        "[ ]".to_string()
    }
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Format a date as a human-readable label (e.g. "Today", "Tomorrow", "Wed Feb 25")
pub fn format_date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}

/// Warnings for collections that could not be loaded, if any.
pub fn render_load_warnings(report: &LoadReport) -> Vec<String> {
    [("events", &report.events), ("todos", &report.todos)]
        .into_iter()
        .filter_map(|(name, load)| match load {
            CollectionLoad::Failed { attempts, error } => Some(format!(
                "{} could not load {} after {} attempts ({}); showing them as empty",
                "warning:".yellow(),
                name,
                attempts,
                error
            )),
            _ => None,
        })
        .collect()
}
