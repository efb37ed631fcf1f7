use anyhow::Result;
use chrono::NaiveDate;
use daybook_core::config::DaybookConfig;
use daybook_core::views::{self, EventFilter};
use daybook_core::{NewEvent, Priority};
use owo_colors::OwoColorize;

use crate::render::{Render, format_date_label, short_id};

pub async fn list(config: &DaybookConfig, filter: EventFilter) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let snapshot = daybook.snapshot();
    let events = views::filter_events(&snapshot.events, filter, daybook.today());

    if events.is_empty() {
        println!("{}", format!("No {filter} events").dimmed());
        return Ok(());
    }

    let groups = views::group_by_month(events);
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", group.render());
    }

    Ok(())
}

pub async fn add(
    config: &DaybookConfig,
    title: String,
    date: Option<NaiveDate>,
    notes: Option<String>,
    priority: Option<Priority>,
) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let today = daybook.today();

    let mut event = NewEvent::new(title, date.unwrap_or(today));
    event.notes = notes;
    event.priority = priority;

    let event = daybook.store().add_event(event).await?;
    println!(
        "{} {} {}",
        "Added".green(),
        event.title.bold(),
        format_date_label(event.date, today).dimmed()
    );
    println!("{}", format!("id: {}", short_id(&event.id)).dimmed());
    Ok(())
}

pub async fn toggle(config: &DaybookConfig, id: &str) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let snapshot = daybook.snapshot();
    let id = super::resolve_id(snapshot.events.iter().map(|e| e.id.as_str()), id)?;

    let completed = daybook.store().toggle_event_complete(&id).await?;
    if let Some(event) = daybook.snapshot().event(&id) {
        let state = if completed { "done" } else { "not done" };
        println!("{} marked {}", event.title.bold(), state);
    }
    Ok(())
}

pub async fn delete(config: &DaybookConfig, id: &str) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let snapshot = daybook.snapshot();
    let id = super::resolve_id(snapshot.events.iter().map(|e| e.id.as_str()), id)?;
    let title = snapshot.event(&id).map(|e| e.title.clone()).unwrap_or_default();

    daybook.store().delete_event(&id).await?;
    println!("{} {}", "Deleted".red(), title);
    Ok(())
}
