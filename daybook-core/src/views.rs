//! Read-only projections over a store snapshot.
//!
//! Nothing here mutates its input. Functions that depend on "today" take it
//! as an argument so results are deterministic.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::event::{Event, Priority};
use crate::store::Snapshot;
use crate::todo::Todo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    Upcoming,
    Past,
    All,
}

impl FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upcoming" => Ok(EventFilter::Upcoming),
            "past" => Ok(EventFilter::Past),
            "all" => Ok(EventFilter::All),
            other => Err(format!("unknown event filter '{other}' (upcoming, past, all)")),
        }
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            EventFilter::Upcoming => "upcoming",
            EventFilter::Past => "past",
            EventFilter::All => "all",
        })
    }
}

/// Today or later, and not yet done.
pub fn is_upcoming(event: &Event, today: NaiveDate) -> bool {
    event.date >= today && !event.completed
}

/// Events matching `filter`, ascending by date.
pub fn filter_events(events: &[Event], filter: EventFilter, today: NaiveDate) -> Vec<&Event> {
    let mut matched: Vec<&Event> = events
        .iter()
        .filter(|e| match filter {
            EventFilter::Upcoming => is_upcoming(e, today),
            EventFilter::Past => !is_upcoming(e, today),
            EventFilter::All => true,
        })
        .collect();
    matched.sort_by_key(|e| e.date);
    matched
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthGroup<'a> {
    pub year: i32,
    pub month: u32,
    pub events: Vec<&'a Event>,
}

impl MonthGroup<'_> {
    /// e.g. "January 2024".
    pub fn label(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%B %Y").to_string())
            .unwrap_or_default()
    }
}

/// Group by calendar month, oldest month first, events in date order.
pub fn group_by_month<'a>(events: impl IntoIterator<Item = &'a Event>) -> Vec<MonthGroup<'a>> {
    let mut sorted: Vec<&Event> = events.into_iter().collect();
    sorted.sort_by_key(|e| e.date);

    let mut groups: Vec<MonthGroup> = Vec::new();
    for event in sorted {
        let (year, month) = (event.date.year(), event.date.month());
        match groups.last_mut() {
            Some(group) if group.year == year && group.month == month => group.events.push(event),
            _ => groups.push(MonthGroup {
                year,
                month,
                events: vec![event],
            }),
        }
    }
    groups
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl PriorityCounts {
    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Count incomplete events per priority. Events without one are ignored.
pub fn priority_counts(events: &[Event]) -> PriorityCounts {
    let mut counts = PriorityCounts::default();
    for event in events.iter().filter(|e| !e.completed) {
        match event.priority {
            Some(Priority::High) => counts.high += 1,
            Some(Priority::Medium) => counts.medium += 1,
            Some(Priority::Low) => counts.low += 1,
            None => {}
        }
    }
    counts
}

/// Percentage of completed todos, rounded half up. Zero when there are none.
pub fn completion_rate(todos: &[Todo]) -> u32 {
    let total = todos.len() as u64;
    if total == 0 {
        return 0;
    }
    let completed = todos.iter().filter(|t| t.completed).count() as u64;
    ((200 * completed + total) / (2 * total)) as u32
}

/// The nearest upcoming event. On a tie the earlier one in `events` wins.
pub fn next_event(events: &[Event], today: NaiveDate) -> Option<&Event> {
    events
        .iter()
        .filter(|e| is_upcoming(e, today))
        .min_by_key(|e| e.date)
}

/// Events on one day, sorted by title.
pub fn events_on(events: &[Event], date: NaiveDate) -> Vec<&Event> {
    let mut day: Vec<&Event> = events.iter().filter(|e| e.date == date).collect();
    day.sort_by(|a, b| a.title.cmp(&b.title));
    day
}

/// Every day that has at least one event, with the most urgent priority
/// among that day's events (`None` when none of them has one).
pub fn marked_dates(events: &[Event]) -> BTreeMap<NaiveDate, Option<Priority>> {
    let mut marks: BTreeMap<NaiveDate, Option<Priority>> = BTreeMap::new();
    for event in events {
        let mark = marks.entry(event.date).or_insert(None);
        if let Some(priority) = event.priority
            && mark.is_none_or(|current| priority.rank() > current.rank())
        {
            *mark = Some(priority);
        }
    }
    marks
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TodoFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl FromStr for TodoFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TodoFilter::All),
            "active" => Ok(TodoFilter::Active),
            "completed" | "done" => Ok(TodoFilter::Completed),
            other => Err(format!("unknown todo filter '{other}' (all, active, completed)")),
        }
    }
}

impl fmt::Display for TodoFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            TodoFilter::All => "all",
            TodoFilter::Active => "active",
            TodoFilter::Completed => "completed",
        })
    }
}

/// Todos matching `filter`, in cache order.
pub fn filter_todos(todos: &[Todo], filter: TodoFilter) -> Vec<&Todo> {
    todos
        .iter()
        .filter(|t| match filter {
            TodoFilter::All => true,
            TodoFilter::Active => !t.completed,
            TodoFilter::Completed => t.completed,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodoCounts {
    pub active: usize,
    pub completed: usize,
}

pub fn todo_counts(todos: &[Todo]) -> TodoCounts {
    let completed = todos.iter().filter(|t| t.completed).count();
    TodoCounts {
        active: todos.len() - completed,
        completed,
    }
}

/// Dashboard numbers for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub today: NaiveDate,
    pub events_today: usize,
    pub upcoming_events: usize,
    pub completed_events: usize,
    pub active_todos: usize,
    pub completion_rate: u32,
    pub priorities: PriorityCounts,
    pub next_event: Option<Event>,
}

impl Overview {
    pub fn compute(snapshot: &Snapshot, today: NaiveDate) -> Self {
        let events = &snapshot.events;
        Overview {
            today,
            events_today: events.iter().filter(|e| e.date == today).count(),
            upcoming_events: events.iter().filter(|e| is_upcoming(e, today)).count(),
            completed_events: events.iter().filter(|e| e.completed).count(),
            active_todos: todo_counts(&snapshot.todos).active,
            completion_rate: completion_rate(&snapshot.todos),
            priorities: priority_counts(events),
            next_event: next_event(events, today).cloned(),
        }
    }
}
