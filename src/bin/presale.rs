//! Presale command-line tool
//!
//! Read-only access to the presale: registered chains, price quotes, sale
//! progress and a buyer's purchase history. Signing requires a wallet and is
//! not available here.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use presale_sdk::evm::types::utils::format_units;
use presale_sdk::notify::MarketingSignup;
use presale_sdk::{init_tracing, Address, PresaleClientBuilder, PresaleConfig};

#[derive(Debug, Parser)]
#[command(name = "presale", author, version, about = "Multi-chain presale client")]
struct Cli {
    /// Config file path (without extension), overrides PRESALE_CONFIG
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the chains the presale runs on
    Chains,

    /// Quote a purchase
    Quote {
        /// Whole tokens to buy
        #[arg(long)]
        amount: u128,

        /// Chain id to pay on
        #[arg(long, default_value_t = 1)]
        chain: u64,

        /// Payment token symbol (ETH, BNB, USDT, ...)
        #[arg(long, default_value = "USDT")]
        payment: String,

        /// Apply the genesis holder discount
        #[arg(long)]
        holder: bool,

        /// Cumulative tokens sold; read from the canonical chain when omitted
        #[arg(long)]
        sold: Option<u128>,
    },

    /// Show aggregate sale progress
    Progress,

    /// Show a buyer's purchase history
    History {
        #[arg(long)]
        buyer: String,

        /// Chain id; every chain when omitted
        #[arg(long)]
        chain: Option<u64>,
    },

    /// Write the default configuration to a file
    InitConfig {
        #[arg(long, default_value = "config/presale.toml")]
        path: PathBuf,
    },

    /// Register an email for presale updates
    Subscribe {
        #[arg(long)]
        email: String,

        #[arg(long, default_value = "cli")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig { path } = &cli.command {
        PresaleConfig::default()
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => PresaleConfig::load_from(path),
        None => PresaleConfig::load(),
    }
    .context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let client = PresaleClientBuilder::new()
        .with_config(config)
        .build()
        .context("Failed to build presale client")?;

    match cli.command {
        Command::Chains => {
            let chains: Vec<_> = client
                .registry()
                .iter()
                .map(|c| {
                    json!({
                        "chain_id": c.chain_id,
                        "name": c.display_name,
                        "native": c.native_symbol,
                        "presale": c.presale_contract_address.to_string(),
                        "payment_tokens": c.supported_payment_tokens.iter().map(|t| t.symbol.clone()).collect::<Vec<_>>(),
                        "gas_fee_tier": c.gas_fee_tier,
                    })
                })
                .collect();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&chains)?);
            } else {
                for c in client.registry().iter() {
                    let symbols: Vec<&str> = c
                        .supported_payment_tokens
                        .iter()
                        .map(|t| t.symbol.as_str())
                        .collect();
                    println!(
                        "{:>6}  {:<16} {:<4} {}  [{}]",
                        c.chain_id,
                        c.display_name,
                        c.native_symbol,
                        c.presale_contract_address,
                        symbols.join(", ")
                    );
                }
            }
        }

        Command::Quote {
            amount,
            chain,
            payment,
            holder,
            sold,
        } => {
            let descriptor = client.registry().get(chain)?;
            let token = descriptor.require_payment_token(&payment)?.clone();

            let sold = match sold {
                Some(sold) => sold,
                None => client.progress_monitor()?.fetch_sold_position().await?,
            };
            let engine = client.pricing()?.with_sold_position(sold);
            let quote = engine.quote(amount, holder, &token, descriptor)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&quote)?);
            } else {
                println!("Tier:     {}", quote.tier_label);
                println!("USD cost: ${}", quote.usd_cost.with_scale(2));
                println!(
                    "Pay:      {} {} (base units: {})",
                    format_units(quote.payment_amount, token.decimals),
                    token.symbol,
                    quote.payment_amount
                );
                if !token.usd_pegged {
                    println!("Note:     native-asset amounts are estimates; the contract prices the purchase");
                }
            }
        }

        Command::Progress => {
            let progress = client.progress_monitor()?.fetch_progress().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&progress)?);
            } else {
                println!(
                    "{} / {} tokens sold ({}%)",
                    progress.sold, progress.target, progress.percent_of_target
                );
            }
        }

        Command::History { buyer, chain } => {
            let buyer = Address::from_str(&buyer).context("Invalid buyer address")?;
            let summaries = match chain {
                Some(chain_id) => vec![client.ledger().fetch_summary(buyer, chain_id).await?],
                None => client.ledger().fetch_all_chains(buyer).await,
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for summary in &summaries {
                    println!(
                        "chain {}: {} purchases, {} tokens",
                        summary.chain_id,
                        summary.purchase_count,
                        summary.total_tokens()
                    );
                    for event in &summary.events {
                        println!(
                            "  block {:<10} {} tokens  phase {}{}",
                            event.block_number.map(|b| b.to_string()).unwrap_or_default(),
                            event.tokens(),
                            event.phase,
                            if event.is_genesis_discount { "  (genesis)" } else { "" }
                        );
                    }
                }
            }
        }

        Command::InitConfig { .. } => {}

        Command::Subscribe { email, source } => {
            let notifier = client.notifier();
            if !notifier.is_enabled() {
                return Err(anyhow!("No webhook URL configured (webhook.url)"));
            }
            let signup = MarketingSignup::new(&email, &source);
            notifier.send(&signup).await?;
            info!(submission_id = %signup.submission_id, "Signup sent");
            println!("Subscribed {}", signup.email);
        }
    }

    Ok(())
}
