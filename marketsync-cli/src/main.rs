//! marketsync CLI
//!
//! Operational triggers for the marketsync catalog sync engine.
//!
//! # Usage
//!
//! ```bash
//! # Import every listing from one marketplace
//! marketsync import otto
//!
//! # Scheduled import of all marketplaces
//! CRON_SECRET=s3cret marketsync import-all --secret s3cret
//!
//! # Change a price centrally and push it to every linked marketplace
//! marketsync update 6f1c... --price 12.50
//!
//! # Apply a stock change reported by a marketplace
//! marketsync stock kaufland 987654 3
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use marketsync_core::{
    import_all, CatalogStore, ImportControl, LogQuery, Marketplace, Price, ProductId,
    ProductUpdate,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod engine;

use config::CliConfig;
use engine::Engine;

#[derive(Parser)]
#[command(name = "marketsync")]
#[command(about = "Keep a central product catalog in sync with Otto, eBay, Kaufland and Shopify")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import all listings from one marketplace
    Import {
        /// Marketplace (otto, ebay, kaufland, shopify)
        marketplace: Marketplace,
    },

    /// Import from every configured marketplace (scheduled trigger)
    ImportAll {
        /// Shared secret; must match the configured cron secret
        #[arg(long)]
        secret: String,
    },

    /// Create a listing for a product on a marketplace
    Publish {
        /// Product id
        id: ProductId,

        /// Target marketplace
        marketplace: Marketplace,
    },

    /// Edit a product centrally and push the change to its listings
    Update {
        /// Product id
        id: ProductId,

        /// New price in major units, e.g. 12.50
        #[arg(long, value_parser = parse_price)]
        price: Option<Price>,

        /// New stock level
        #[arg(long)]
        quantity: Option<u32>,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,
    },

    /// Re-push current content of products to all their listings
    Sync {
        /// Product ids
        #[arg(required = true)]
        ids: Vec<ProductId>,
    },

    /// Apply a stock change reported by a marketplace
    Stock {
        /// Marketplace the change came from
        marketplace: Marketplace,

        /// The marketplace's id for the listing
        external_id: String,

        /// New stock level
        quantity: u32,
    },

    /// Delete products and their marketplace links
    Delete {
        /// Product ids
        #[arg(required = true)]
        ids: Vec<ProductId>,
    },

    /// Remove every link to one marketplace
    Cleanup {
        /// Marketplace
        marketplace: Marketplace,
    },

    /// Show recent sync log entries
    Logs {
        /// Filter by marketplace
        #[arg(short, long)]
        marketplace: Option<Marketplace>,

        /// Maximum number of entries
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Check that a token can be obtained for a marketplace
    Token {
        /// Marketplace
        marketplace: Marketplace,

        /// Print the token itself
        #[arg(long)]
        reveal: bool,
    },
}

fn parse_price(s: &str) -> Result<Price, String> {
    Price::parse_major(s).ok_or_else(|| format!("invalid price: {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);
    info!("Loaded configuration from {:?}", config.config_path);

    let engine = Engine::from_config(&config)?;
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Import { marketplace } => import(&engine, marketplace, &out).await,
        Commands::ImportAll { secret } => import_all_marketplaces(&engine, &config, &secret, &out).await,
        Commands::Publish { id, marketplace } => {
            let result = engine.exporter(marketplace)?.publish_product(id).await;
            out.print(&result, || match &result.external_id {
                Some(external_id) if result.success => {
                    format!("Published {} to {} as {}", id, marketplace, external_id)
                }
                _ => format!("Publish failed: {}", result.error.as_deref().unwrap_or("unknown error")),
            });
            Ok(())
        }
        Commands::Update {
            id,
            price,
            quantity,
            title,
            description,
        } => {
            let updates = ProductUpdate {
                price,
                quantity,
                title,
                description,
                ..ProductUpdate::default()
            };
            if updates.is_empty() {
                bail!("nothing to update: pass --price, --quantity, --title or --description");
            }
            match engine.sync_service().apply_central_update(id, &updates).await {
                Ok(report) => out.print(&report, || fan_out_text(&report)),
                Err(e) => eprintln!("Update failed: {}", e),
            }
            Ok(())
        }
        Commands::Sync { ids } => {
            match engine.sync_service().sync_batch(&ids).await {
                Ok(report) => out.print(&report, || {
                    let mut lines: Vec<String> = report.synced.values().map(fan_out_text).collect();
                    lines.extend(report.missing.iter().map(|id| format!("{}: not found", id)));
                    lines.join("\n")
                }),
                Err(e) => eprintln!("Sync failed: {}", e),
            }
            Ok(())
        }
        Commands::Stock {
            marketplace,
            external_id,
            quantity,
        } => {
            match engine
                .sync_service()
                .handle_incoming_stock_update(marketplace, &external_id, quantity)
                .await
            {
                Ok(report) => out.print(&report, || fan_out_text(&report)),
                Err(e) => eprintln!("Stock update failed: {}", e),
            }
            Ok(())
        }
        Commands::Delete { ids } => {
            match engine.sync_service().delete_products(&ids).await {
                Ok(report) => out.print(&report, || {
                    format!("Deleted {} products and {} links", report.products, report.links)
                }),
                Err(e) => eprintln!("Delete failed: {}", e),
            }
            Ok(())
        }
        Commands::Cleanup { marketplace } => {
            match engine.sync_service().cleanup_marketplace(marketplace).await {
                Ok(removed) => out.print(&removed, || format!("Removed {} {} links", removed, marketplace)),
                Err(e) => eprintln!("Cleanup failed: {}", e),
            }
            Ok(())
        }
        Commands::Logs { marketplace, limit } => {
            let query = LogQuery {
                marketplace,
                limit: Some(limit),
                ..LogQuery::default()
            };
            let entries = engine.catalog.query_logs(&query).await?;
            out.print(&entries, || {
                entries
                    .iter()
                    .map(|e| {
                        format!(
                            "{} {:<9} {:?}/{:?}{}",
                            e.created_at.format("%Y-%m-%d %H:%M:%S"),
                            e.marketplace.as_str(),
                            e.action,
                            e.status,
                            e.error_message
                                .as_deref()
                                .map(|m| format!(": {}", m))
                                .unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            Ok(())
        }
        Commands::Token { marketplace, reveal } => {
            match engine.tokens.resolve_token(marketplace).await {
                Ok(Some(token)) if reveal => println!("{}", token.expose()),
                Ok(Some(token)) => println!("{}: token available ({} chars)", marketplace, token.expose().len()),
                Ok(None) => println!("{}: no credentials, requests would use the mock token", marketplace),
                Err(e) => eprintln!("{}: {}", marketplace, e),
            }
            Ok(())
        }
    }
}

fn init_logging(config: &CliConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Ctrl+C stops the running import at its next page boundary.
fn stop_on_ctrl_c(control: &ImportControl) {
    let control = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            control.stop();
        }
    });
}

async fn import(engine: &Engine, marketplace: Marketplace, out: &Output) -> Result<()> {
    let importer = engine.importer(marketplace)?;
    let control = ImportControl::new();
    stop_on_ctrl_c(&control);

    let outcome = importer.run_import(&control).await;
    out.print(&outcome, || match &outcome.error {
        None => format!("Imported {} products from {}", outcome.count, marketplace),
        Some(e) => format!("Import from {} failed after {} products: {}", marketplace, outcome.count, e),
    });
    Ok(())
}

async fn import_all_marketplaces(
    engine: &Engine,
    config: &CliConfig,
    secret: &str,
    out: &Output,
) -> Result<()> {
    let Some(expected) = config.cron_secret.as_deref() else {
        bail!("no cron secret configured; set cron_secret or CRON_SECRET");
    };
    if secret != expected {
        warn!("Rejected import-all with a wrong secret");
        bail!("unauthorized");
    }

    let importers = engine.configured_importers();
    let control = ImportControl::new();
    stop_on_ctrl_c(&control);

    let outcomes = import_all(&importers, &control).await;
    out.print(&outcomes, || {
        outcomes
            .iter()
            .map(|(marketplace, outcome)| match &outcome.error {
                None => format!("{}: {} products", marketplace, outcome.count),
                Some(e) => format!("{}: failed after {} products: {}", marketplace, outcome.count, e),
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
    Ok(())
}

fn fan_out_text(report: &marketsync_core::FanOutReport) -> String {
    let product = report
        .product_id
        .map(|id| id.to_string())
        .unwrap_or_default();
    if report.is_empty() {
        return format!("{}: no listings to update", product);
    }
    report
        .outcomes
        .iter()
        .map(|(marketplace, result)| match &result.error {
            None => format!("{} -> {}: ok", product, marketplace),
            Some(e) => format!("{} -> {}: failed: {}", product, marketplace, e),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prints results as text or JSON.
struct Output {
    json: bool,
}

impl Output {
    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) {
        if self.json {
            match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to encode result: {}", e),
            }
        } else {
            println!("{}", text());
        }
    }
}
