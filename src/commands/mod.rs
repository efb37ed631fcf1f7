pub mod auth;
pub mod config;
pub mod day;
pub mod events;
pub mod overview;
pub mod todos;

use anyhow::Result;
use daybook_core::config::DaybookConfig;
use daybook_core::{Daybook, SessionStatus};

use crate::render::render_load_warnings;
use crate::utils::tui;

/// Open the daybook and load the signed-in user's data, or fail with a hint
/// when nobody is signed in.
pub async fn open_session(config: &DaybookConfig) -> Result<Daybook> {
    let daybook = Daybook::open(config)?;

    let spinner = tui::create_spinner("Loading your daybook".into());
    let status = daybook.session().restore().await;
    spinner.finish_and_clear();

    match status {
        SessionStatus::SignedOut => anyhow::bail!(
            "Not signed in.\n\n\
            Sign in with:\n  \
            daybook signin <email>\n\n\
            Or create an account:\n  \
            daybook signup <email>"
        ),
        SessionStatus::Ready(report) if report.any_failed() => {
            for warning in render_load_warnings(&report) {
                eprintln!("{warning}");
            }
        }
        SessionStatus::Ready(_) | SessionStatus::Loading => {}
    }

    Ok(daybook)
}

/// Expand an id prefix to the one id it matches.
pub fn resolve_id<'a>(ids: impl IntoIterator<Item = &'a str>, prefix: &str) -> Result<String> {
    let matches: Vec<&str> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();

    match matches.as_slice() {
        [id] => Ok(id.to_string()),
        [] => anyhow::bail!("No item with id '{}'", prefix),
        _ => anyhow::bail!(
            "Id '{}' is ambiguous ({} matches), use more characters",
            prefix,
            matches.len()
        ),
    }
}
