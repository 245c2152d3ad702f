use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "havn", version, about = "Havn journal CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Journal entries
    Entry {
        #[command(subcommand)]
        action: commands::entry::EntryAction,
    },
    /// Current and best streak
    Streak(commands::streak::StreakArgs),
    /// Merge duplicate entries that share a day
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Home-screen widget state
    Widget {
        #[command(subcommand)]
        action: commands::widget::WidgetAction,
    },
    /// Daily reminder
    Reminder {
        #[command(subcommand)]
        action: commands::reminder::ReminderAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HAVN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Entry { action } => commands::entry::run(action),
        Commands::Streak(args) => commands::streak::run(args),
        Commands::Reconcile(args) => commands::reconcile::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Widget { action } => commands::widget::run(action),
        Commands::Reminder { action } => commands::reminder::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
