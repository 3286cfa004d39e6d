use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratekeeper::core::log::init_logging;

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

impl From<Commands> for ratekeeper::AppCommand {
    fn from(cmd: Commands) -> ratekeeper::AppCommand {
        match cmd {
            Commands::Serve { listen } => ratekeeper::AppCommand::Serve { listen },
            Commands::Rates { server } => ratekeeper::AppCommand::Rates { server },
            Commands::Convert {
                amount,
                currency,
                server,
            } => ratekeeper::AppCommand::Convert {
                amount,
                currency,
                server,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Serve GET /rates until interrupted
    Serve {
        /// Listen address, overriding the configured one
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Fetch and display current rates
    Rates {
        /// Base URL of a running ratekeeper server to poll instead of the provider
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Convert an amount into the base unit and the other quoted currencies
    Convert {
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        /// One of IRT, USD, EUR, USDT
        currency: String,
        /// Base URL of a running ratekeeper server to poll instead of the provider
        #[arg(short, long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => ratekeeper::cli::setup::setup(),
        Some(cmd) => ratekeeper::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
