use anyhow::Result;
use daybook_core::NewTodo;
use daybook_core::config::DaybookConfig;
use daybook_core::views::{self, TodoFilter};
use owo_colors::OwoColorize;

use crate::render::{Render, short_id};

pub async fn list(config: &DaybookConfig, filter: TodoFilter) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let snapshot = daybook.snapshot();
    let counts = views::todo_counts(&snapshot.todos);

    println!(
        "{}",
        format!(
            "{} active, {} completed ({}% done)",
            counts.active,
            counts.completed,
            views::completion_rate(&snapshot.todos)
        )
        .dimmed()
    );

    let todos = views::filter_todos(&snapshot.todos, filter);
    if todos.is_empty() {
        println!("{}", "Nothing here".dimmed());
    }
    for todo in todos {
        println!("  {}", todo.render());
    }
    Ok(())
}

pub async fn add(config: &DaybookConfig, text: String) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let todo = daybook.store().add_todo(NewTodo::new(text)).await?;
    println!("{} {}", "Added".green(), todo.text.bold());
    println!("{}", format!("id: {}", short_id(&todo.id)).dimmed());
    Ok(())
}

pub async fn toggle(config: &DaybookConfig, id: &str) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let snapshot = daybook.snapshot();
    let id = super::resolve_id(snapshot.todos.iter().map(|t| t.id.as_str()), id)?;

    let completed = daybook.store().toggle_todo_complete(&id).await?;
    if let Some(todo) = daybook.snapshot().todo(&id) {
        let state = if completed { "done" } else { "not done" };
        println!("{} marked {}", todo.text.bold(), state);
    }
    Ok(())
}

pub async fn delete(config: &DaybookConfig, id: &str) -> Result<()> {
    let daybook = super::open_session(config).await?;
    let snapshot = daybook.snapshot();
    let id = super::resolve_id(snapshot.todos.iter().map(|t| t.id.as_str()), id)?;
    let text = snapshot.todo(&id).map(|t| t.text.clone()).unwrap_or_default();

    daybook.store().delete_todo(&id).await?;
    println!("{} {}", "Deleted".red(), text);
    Ok(())
}
