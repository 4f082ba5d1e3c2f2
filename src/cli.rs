use anyhow::Context;
use bigdecimal::BigDecimal;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{
    CoinGeckoClient, ExchangeRateApiClient, MemoryDocumentStore, SessionHandle, SimulatedOracle,
    SimulatedWallet,
};
use crate::config::Config;
use crate::domain::{PaymentMethod, PropertyRef};
use crate::ports::WalletProvider;
use crate::services::{
    calculate_fees_by_name, receipt, FeeBreakdown, FlowState, OrchestratorDeps,
    PaymentOrchestrator, PollingStatusChannel, RateCache, TransactionLedger, WalletConnector,
    SUPPORTED_CURRENCIES,
};

const SIMULATED_BUYER_WALLET: &str = "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd";
const SIMULATED_BALANCE_WEI: u128 = 1_000 * 1_000_000_000_000_000_000;

#[derive(Parser)]
#[command(name = "offer-engine")]
#[command(about = "Offer Engine - property offer payments with fee previews and status tracking", long_about = None)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the fee breakdown for an offer
    Fees {
        /// Offer amount in USD
        #[arg(value_name = "AMOUNT")]
        amount: String,

        /// Payment method (card, bank, crypto)
        #[arg(short, long, default_value = "card")]
        method: String,

        /// Coin id for crypto offers (e.g. bitcoin)
        #[arg(short, long)]
        coin: Option<String>,
    },

    /// Convert a USD amount into another currency
    Convert {
        #[arg(value_name = "AMOUNT")]
        amount: String,

        #[arg(value_name = "CURRENCY")]
        currency: String,
    },

    /// List exchange rates for the supported display currencies
    Rates,

    /// List tracked crypto prices
    Prices,

    /// Run a complete offer against in-process collaborators
    Simulate(SimulateArgs),
}

#[derive(clap::Args)]
pub struct SimulateArgs {
    /// Offer amount in USD
    #[arg(short, long, default_value = "250000")]
    pub amount: String,

    /// Payment method (card, bank, crypto)
    #[arg(short, long, default_value = "crypto")]
    pub method: String,

    /// Coin id for crypto offers
    #[arg(short, long, default_value = "bitcoin")]
    pub coin: String,

    /// Buyer account id
    #[arg(long, default_value = "buyer-1")]
    pub buyer: String,

    /// Listing title
    #[arg(long, default_value = "Harbor View Loft")]
    pub property: String,

    /// Give up tracking after this many seconds
    #[arg(long, default_value_t = 120)]
    pub max_wait_secs: u64,
}

fn parse_amount(raw: &str) -> anyhow::Result<BigDecimal> {
    BigDecimal::from_str(raw.trim()).with_context(|| format!("Invalid amount: {}", raw))
}

pub fn rate_cache(config: &Config) -> RateCache {
    let rates = ExchangeRateApiClient::with_circuit_breaker(
        config.exchange_rate_url.clone(),
        config.http_timeout(),
        config.circuit_breaker_threshold,
        config.circuit_breaker_reset_secs,
    );
    let prices = CoinGeckoClient::with_circuit_breaker(
        config.crypto_prices_url.clone(),
        config.http_timeout(),
        config.circuit_breaker_threshold,
        config.circuit_breaker_reset_secs,
    );
    RateCache::from_config(config, Arc::new(rates), Arc::new(prices))
}

fn print_fees(fees: &FeeBreakdown) {
    println!("  Processor Fee: {}", receipt::format_amount(&fees.processor_fee, "USD"));
    println!("  Network Fee:   {}", receipt::format_amount(&fees.network_fee, "USD"));
    println!("  Platform Fee:  {}", receipt::format_amount(&fees.platform_fee, "USD"));
    println!("  Total Fee:     {}", receipt::format_amount(&fees.total_fee, "USD"));
    println!("  Final Amount:  {}", receipt::format_amount(&fees.final_amount, "USD"));
}

pub fn handle_fees(amount: &str, method: &str, coin: Option<&str>) -> anyhow::Result<()> {
    let amount = parse_amount(amount)?;
    let Some(fees) = calculate_fees_by_name(&amount, method, coin) else {
        anyhow::bail!("Amount must be greater than 0");
    };

    println!("Fees for {} via {}:", receipt::format_amount(&amount, "USD"), method);
    print_fees(&fees);
    Ok(())
}

pub async fn handle_convert(config: &Config, amount: &str, currency: &str) -> anyhow::Result<()> {
    let amount = parse_amount(amount)?;
    let cache = rate_cache(config);
    let converted = cache.convert_currency(&amount, currency).await?;

    println!(
        "{} = {}",
        receipt::format_amount(&amount, "USD"),
        receipt::format_amount(&converted, currency)
    );
    Ok(())
}

pub async fn handle_rates(config: &Config) -> anyhow::Result<()> {
    let cache = rate_cache(config);
    let snapshot = cache.get_exchange_rates().await;

    println!("Exchange rates (1 USD), fetched {}:", snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S"));
    println!("{:<6} {:<20} {:>14}", "Code", "Currency", "Rate");
    println!("{}", "-".repeat(42));
    for (code, name) in SUPPORTED_CURRENCIES {
        let rate = if *code == "USD" {
            Some(BigDecimal::from(1))
        } else {
            snapshot.rates.get(*code).cloned()
        };
        match rate {
            Some(rate) => println!("{:<6} {:<20} {:>14}", code, name, rate.round(4)),
            None => println!("{:<6} {:<20} {:>14}", code, name, "n/a"),
        }
    }
    Ok(())
}

pub async fn handle_prices(config: &Config) -> anyhow::Result<()> {
    let cache = rate_cache(config);
    let snapshot = cache.get_crypto_prices().await;

    println!("{:<14} {:<8} {:>14} {:>10}", "Coin", "Symbol", "Price (USD)", "24h %");
    println!("{}", "-".repeat(49));
    for coin in &snapshot.prices {
        let change = coin
            .price_change_percentage_24h
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "{:<14} {:<8} {:>14} {:>10}",
            coin.id,
            coin.symbol.to_ascii_uppercase(),
            coin.current_price.round(2),
            change
        );
    }
    Ok(())
}

pub async fn handle_simulate(config: &Config, args: &SimulateArgs) -> anyhow::Result<()> {
    let amount = parse_amount(&args.amount)?;
    let method = PaymentMethod::from_str(&args.method).map_err(|e| anyhow::anyhow!(e))?;

    let ledger = TransactionLedger::new(Arc::new(MemoryDocumentStore::new()));
    let oracle = Arc::new(SimulatedOracle::new(config.oracle_latency()));
    let channel = Arc::new(PollingStatusChannel::from_config(config, ledger.clone(), oracle));
    let wallet: Arc<dyn WalletProvider> =
        Arc::new(SimulatedWallet::new(SIMULATED_BUYER_WALLET, SIMULATED_BALANCE_WEI));

    let mut flow = PaymentOrchestrator::new(
        OrchestratorDeps {
            identity: Arc::new(SessionHandle::signed_in(&args.buyer)),
            rates: Arc::new(rate_cache(config)),
            wallet: WalletConnector::new(Some(wallet)),
            ledger: ledger.clone(),
            channel,
        },
        config,
    );

    flow.open(
        PropertyRef {
            id: "simulated-listing".to_string(),
            title: args.property.clone(),
        },
        amount,
    );
    flow.select_method(method)?;
    if method == PaymentMethod::Crypto {
        let address = flow.connect_wallet().await?;
        println!("✓ Wallet connected: {}", address);
        flow.select_coin(&args.coin).await?;
    }

    if let Some(preview) = flow.preview().await {
        if let Some(fees) = &preview.fees {
            print_fees(fees);
        }
        if let Some(crypto) = &preview.crypto_amount {
            println!("  Crypto Amount: {} {}", crypto, args.coin);
        }
    }

    let transaction = flow.submit().await?;
    println!("✓ Transaction {} submitted ({})", transaction.id, transaction.hash);

    let tracking = async {
        loop {
            match flow.next_event().await {
                FlowState::Success { transaction } => break Ok(transaction.clone()),
                FlowState::Failed { error } => break Err(anyhow::anyhow!("{}", error.message)),
                state => tracing::debug!(state = %state, "tracking"),
            }
        }
    };
    let settled = tokio::time::timeout(Duration::from_secs(args.max_wait_secs), tracking)
        .await
        .context("Transaction did not settle in time")??;

    println!("✓ Transaction confirmed with {} confirmations", settled.confirmations);
    println!();
    print!("{}", receipt::render(&settled, None, Utc::now()));
    Ok(())
}
