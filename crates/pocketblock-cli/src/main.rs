use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "pocketblock-cli", version, about = "PocketBlock CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Block schedule management
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// App selection
    Apps {
        #[command(subcommand)]
        action: commands::apps::AppsAction,
    },
    /// Temporary unblock
    Unblock {
        #[command(subcommand)]
        action: commands::unblock::UnblockAction,
    },
    /// Report a cumulative step count for a walk
    Steps(commands::steps::StepsArgs),
    /// Simulate interval-monitor callbacks
    Monitor {
        #[command(subcommand)]
        action: commands::monitor::MonitorAction,
    },
    /// Show whether blocking is required
    Status(commands::status::StatusArgs),
    /// Diagnostics and debug actions
    Diagnostics {
        #[command(subcommand)]
        action: Option<commands::diagnostics::DiagnosticsAction>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Onboarding flag
    Onboarding {
        #[command(subcommand)]
        action: commands::onboarding::OnboardingAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pocketblock=warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Schedule { action } => commands::schedule::run(action),
        Commands::Apps { action } => commands::apps::run(action),
        Commands::Unblock { action } => commands::unblock::run(action),
        Commands::Steps(args) => commands::steps::run(args),
        Commands::Monitor { action } => commands::monitor::run(action),
        Commands::Status(args) => commands::status::run(args),
        Commands::Diagnostics { action } => commands::diagnostics::run(action.unwrap_or_default()),
        Commands::Config { action } => commands::config::run(action),
        Commands::Onboarding { action } => commands::onboarding::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
