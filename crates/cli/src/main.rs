//! Tienda CLI - Database migrations and catalog management.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! tienda-cli migrate
//!
//! # Load the service catalog from YAML (existing names are skipped)
//! tienda-cli seed --file crates/cli/data/catalog.yaml
//!
//! # Add one service
//! tienda-cli product add -n "Clases de Guitarra" -p 50 -c educacion \
//!     -d "Aprende a tocar desde cero." -i https://img.example/guitarra.jpg
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Load catalog products from a YAML file
//! - `product add` - Add a single product to the catalog

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tienda_core::{Category, CurrencyCode};

mod commands;

#[derive(Parser)]
#[command(name = "tienda-cli")]
#[command(author, version, about = "Tienda CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Load catalog products from a YAML file
    Seed {
        /// Path to the catalog YAML file
        #[arg(short, long, default_value = "crates/cli/data/catalog.yaml")]
        file: String,
    },
    /// Manage catalog products
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },
}

#[derive(Subcommand)]
enum ProductAction {
    /// Add a product to the catalog
    Add {
        /// Product name (must be unique)
        #[arg(short, long)]
        name: String,

        /// Unit price, e.g. `49.99`
        #[arg(short, long)]
        price: Decimal,

        /// Category (`tecnologia`, `educacion`, `hogar`)
        #[arg(short, long)]
        category: Category,

        /// Short description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Image URL
        #[arg(short, long, default_value = "")]
        image: String,

        /// ISO 4217 currency code
        #[arg(long, default_value = "USD")]
        currency: CurrencyCode,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Seed { file } => commands::seed::catalog(&file).await?,
        Commands::Product { action } => match action {
            ProductAction::Add {
                name,
                price,
                category,
                description,
                image,
                currency,
            } => {
                let product = commands::product::ProductInput {
                    name,
                    description,
                    price,
                    currency,
                    image,
                    category,
                };
                commands::product::add(product).await?;
            }
        },
    }
    Ok(())
}
