mod commands;
mod render;
mod utils;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use daybook_core::Priority;
use daybook_core::config::DaybookConfig;
use daybook_core::views::{EventFilter, TodoFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Your calendar and todo list, synced across devices")]
struct Cli {
    /// Log sync activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup { email: String },
    /// Sign in to an existing account
    Signin { email: String },
    /// Sign out and forget cached data
    Signout,
    /// Show who is signed in
    Whoami,
    /// Show the events on one day
    Day {
        /// Day to show (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// List events grouped by month
    Events {
        /// upcoming, past or all
        #[arg(short, long, default_value_t = EventFilter::Upcoming)]
        filter: EventFilter,
    },
    /// Add an event
    AddEvent {
        title: String,

        /// Event date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(short, long)]
        notes: Option<String>,

        /// high, medium or low
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,
    },
    /// Mark an event done, or not done
    ToggleEvent { id: String },
    DeleteEvent { id: String },
    /// List todos, newest first
    Todos {
        /// all, active or completed
        #[arg(short, long, default_value_t = TodoFilter::All)]
        filter: TodoFilter,
    },
    AddTodo { text: String },
    /// Mark a todo done, or not done
    ToggleTodo { id: String },
    DeleteTodo { id: String },
    /// Today at a glance
    Overview,
    /// Show config paths and the effective settings
    Config,
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::parse(s).ok_or_else(|| format!("unknown priority '{s}' (high, medium, low)"))
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,daybook=debug,daybook_core=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = DaybookConfig::load()?;
    tracing::debug!(data_dir = %config.data_path().display(), "loaded config");

    match cli.command {
        Commands::Signup { email } => commands::auth::signup(&config, &email).await,
        Commands::Signin { email } => commands::auth::signin(&config, &email).await,
        Commands::Signout => commands::auth::signout(&config).await,
        Commands::Whoami => commands::auth::whoami(&config),
        Commands::Day { date } => commands::day::run(&config, date).await,
        Commands::Events { filter } => commands::events::list(&config, filter).await,
        Commands::AddEvent {
            title,
            date,
            notes,
            priority,
        } => commands::events::add(&config, title, date, notes, priority).await,
        Commands::ToggleEvent { id } => commands::events::toggle(&config, &id).await,
        Commands::DeleteEvent { id } => commands::events::delete(&config, &id).await,
        Commands::Todos { filter } => commands::todos::list(&config, filter).await,
        Commands::AddTodo { text } => commands::todos::add(&config, text).await,
        Commands::ToggleTodo { id } => commands::todos::toggle(&config, &id).await,
        Commands::DeleteTodo { id } => commands::todos::delete(&config, &id).await,
        Commands::Overview => commands::overview::run(&config).await,
        Commands::Config => commands::config::run(&config),
    }
}
