use anyhow::Result;
use daybook_core::config::DaybookConfig;
use daybook_core::{Daybook, SessionStatus};
use owo_colors::OwoColorize;

use crate::render::{Render, render_load_warnings};
use crate::utils::tui;

pub async fn signup(config: &DaybookConfig, email: &str) -> Result<()> {
    let daybook = Daybook::open(config)?;

    let password = tui::prompt_password("Choose a password")?;
    let confirm = tui::prompt_password("Repeat password")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let spinner = tui::create_spinner("Creating account".into());
    let result = daybook.session().sign_up(email, &password).await;
    spinner.finish_and_clear();

    report_signed_in(&daybook, result?);
    Ok(())
}

pub async fn signin(config: &DaybookConfig, email: &str) -> Result<()> {
    let daybook = Daybook::open(config)?;
    let password = tui::prompt_password("Password")?;

    let spinner = tui::create_spinner(format!("Signing in as {email}"));
    let result = daybook.session().sign_in(email, &password).await;
    spinner.finish_and_clear();

    report_signed_in(&daybook, result?);
    Ok(())
}

pub async fn signout(config: &DaybookConfig) -> Result<()> {
    let daybook = Daybook::open(config)?;
    let Some(principal) = daybook.session().identity().current() else {
        println!("{}", "Not signed in".dimmed());
        return Ok(());
    };

    daybook.session().sign_out().await?;
    println!("Signed out {}", principal.render());
    Ok(())
}

pub fn whoami(config: &DaybookConfig) -> Result<()> {
    let daybook = Daybook::open(config)?;
    match daybook.session().identity().current() {
        Some(principal) => println!("{}", principal.render()),
        None => println!("{}", "Not signed in".dimmed()),
    }
    Ok(())
}

fn report_signed_in(daybook: &Daybook, status: SessionStatus) {
    let snapshot = daybook.snapshot();
    if let Some(user) = &snapshot.user {
        println!("Signed in as {}", user.render());
    }
    if let SessionStatus::Ready(report) = status {
        for warning in render_load_warnings(&report) {
            eprintln!("{warning}");
        }
    }
    println!(
        "{}",
        format!(
            "{} events, {} todos",
            snapshot.events.len(),
            snapshot.todos.len()
        )
        .dimmed()
    );
}
