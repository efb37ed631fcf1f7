use std::ops::RangeInclusive;

use anyhow::Result;
use chrono::{Days, NaiveDate};
use daybook_core::config::DaybookConfig;
use daybook_core::views;
use owo_colors::OwoColorize;

use crate::render::{Render, format_date_label};

pub async fn run(config: &DaybookConfig, date: Option<NaiveDate>) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let today = daybook.today();
    daybook.store().set_selected_date(date.unwrap_or(today));

    let snapshot = daybook.snapshot();
    let selected = snapshot.selected_date;
    let events = views::events_on(&snapshot.events, selected);

    let label = format_date_label(selected, today);
    println!("{} {}", label.bold(), selected.format("%Y-%m-%d").dimmed());

    if events.is_empty() {
        println!("{}", "No events".dimmed());
    }
    for event in events {
        println!("  {}", event.render());
    }

    // Days around the selected one that have something on them.
    let marks = views::marked_dates(&snapshot.events);
    let nearby: Vec<String> = marks
        .range(nearby_days(selected))
        .filter(|(day, _)| **day != selected)
        .map(|(day, priority)| match priority {
            Some(p) => format!("{} ({})", day.format("%a %-d"), p.render()),
            None => day.format("%a %-d").to_string(),
        })
        .collect();
    if !nearby.is_empty() {
        println!();
        println!("{} {}", "Also this week:".dimmed(), nearby.join(", "));
    }

    Ok(())
}

/// Three days either side of `selected`, cut short at the ends of the
/// calendar.
fn nearby_days(selected: NaiveDate) -> RangeInclusive<NaiveDate> {
    let start = selected.checked_sub_days(Days::new(3)).unwrap_or(selected);
    let end = selected.checked_add_days(Days::new(3)).unwrap_or(selected);
    start..=end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_days_span_a_week() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let range = nearby_days(day);
        assert_eq!(*range.start(), NaiveDate::from_ymd_opt(2024, 2, 27).unwrap());
        assert_eq!(*range.end(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    }

    #[test]
    fn nearby_days_stop_at_the_calendar_edges() {
        assert_eq!(*nearby_days(NaiveDate::MIN).start(), NaiveDate::MIN);
        assert_eq!(*nearby_days(NaiveDate::MAX).end(), NaiveDate::MAX);
    }
}
