use clap::Parser;
use offer_engine::cli::{self, Cli, Commands};
use offer_engine::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if cli.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command {
        Commands::Fees {
            amount,
            method,
            coin,
        } => cli::handle_fees(&amount, &method, coin.as_deref()),
        Commands::Convert { amount, currency } => {
            cli::handle_convert(&config, &amount, &currency).await
        }
        Commands::Rates => cli::handle_rates(&config).await,
        Commands::Prices => cli::handle_prices(&config).await,
        Commands::Simulate(args) => cli::handle_simulate(&config, &args).await,
    }
}
