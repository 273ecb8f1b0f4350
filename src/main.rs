use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratefetch::cli::setup::setup;
use ratefetch::core::log::init_logging;
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for ratefetch::AppCommand {
    fn from(cmd: Commands) -> ratefetch::AppCommand {
        match cmd {
            Commands::Fetch { force } => ratefetch::AppCommand::Fetch { force },
            Commands::Rate { from, to } => ratefetch::AppCommand::Rate { from, to },
            Commands::AddRate { from, to, rate } => {
                ratefetch::AppCommand::AddRate { from, to, rate }
            }
            Commands::Rates => ratefetch::AppCommand::Rates,
            Commands::Services => ratefetch::AppCommand::Services,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch exchange rates for services that are due
    Fetch {
        /// Fetch every active service regardless of its schedule
        #[arg(short, long)]
        force: bool,
    },
    /// Convert between two currencies using stored rates
    Rate {
        /// Currency code or id to convert from
        from: String,
        /// Currency code or id to convert to
        to: String,
    },
    /// Store a manual rate, 1 FROM = RATE TO
    AddRate {
        from: String,
        to: String,
        rate: Decimal,
    },
    /// List stored exchange rates
    Rates,
    /// List configured services and their schedules
    Services,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => ratefetch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
