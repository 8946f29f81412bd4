use clap::{Parser, Subcommand};
use habitrack_core::{Config, CoreError};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "habitrack", version, about = "Habitrack CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, sign up, sign out
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Habit management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Completion history
    Completion {
        #[command(subcommand)]
        action: commands::completion::CompletionAction,
    },
    /// Print habits with today's completion state
    Board,
    /// Stream board snapshots as habits change (Ctrl-C to stop)
    Watch,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let fallback = Config::load()
        .map(|c| c.log.filter)
        .unwrap_or_else(|_| "warn".to_string());
    let filter =
        EnvFilter::try_from_env("HABITRACK_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    match err.downcast_ref::<CoreError>() {
        Some(core) => core.user_message(),
        None => err.to_string(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Auth { action } => commands::auth::run(action).await,
        Commands::Habit { action } => commands::habit::run(action).await,
        Commands::Completion { action } => commands::completion::run(action).await,
        Commands::Board => commands::board::run_board().await,
        Commands::Watch => commands::board::run_watch().await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {}", describe(e.as_ref()));
        std::process::exit(1);
    }
}
