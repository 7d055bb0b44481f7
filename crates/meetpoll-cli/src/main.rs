use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod context;

#[derive(Parser)]
#[command(name = "meetpoll-cli", version, about = "Meetpoll CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest meeting times from participants' calendars
    Suggest(commands::suggest::SuggestArgs),
    /// Meeting records
    Meeting {
        #[command(subcommand)]
        action: commands::meeting::MeetingAction,
    },
    /// Meeting-time polls
    Poll {
        #[command(subcommand)]
        action: commands::poll::PollAction,
    },
    /// Close polls whose deadline has passed
    Sweep(commands::sweep::SweepArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Suggest(args) => commands::suggest::run(args).await,
        Commands::Meeting { action } => commands::meeting::run(action).await,
        Commands::Poll { action } => commands::poll::run(action).await,
        Commands::Sweep(args) => commands::sweep::run(args).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
