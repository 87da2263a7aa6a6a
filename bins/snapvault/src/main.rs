mod cmd;

use clap::Parser;
use cmd::config::{Cli, Commands, Effective};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let eff = match Effective::new(&cli) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(config = %cli.config, error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::Run(args) => cmd::run::run(&eff, args.once).await,
        Commands::Query(args) => cmd::query::run(&eff, &args.mode).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "snapvault failed");
        std::process::exit(1);
    }
}
