//! # Seed Data Generator
//!
//! Populates a development database with tills, a small catalog, customers
//! and bank accounts.
//!
//! ## Usage
//! ```bash
//! # Database from the config file / CAJA_DB_PATH
//! cargo run -p caja-engine --bin caja-seed
//!
//! # Specific database file
//! cargo run -p caja-engine --bin caja-seed -- --db ./data/caja.db
//! ```

use std::env;
use std::path::PathBuf;

use caja_core::{Money, Product, Quantity};
use caja_engine::telemetry::init_tracing;
use caja_engine::{Engine, EngineConfig};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

const TILLS: &[&str] = &["Caja 1", "Caja 2", "Caja 3"];

/// (sku, name, price in cents, tax inclusive, stock in units)
const PRODUCTS: &[(&str, &str, i64, bool, i64)] = &[
    ("REF-COCA-600", "Refresco cola 600 ml", 2_000, true, 120),
    ("AGUA-1L", "Agua natural 1 L", 1_400, true, 200),
    ("PAN-BLANCO", "Pan de caja blanco", 4_800, true, 40),
    ("LECHE-1L", "Leche entera 1 L", 2_850, true, 60),
    ("HUEVO-12", "Huevo blanco 12 pzas", 5_800, true, 30),
    ("ARROZ-1K", "Arroz 1 kg", 3_200, false, 50),
    ("FRIJOL-1K", "Frijol negro 1 kg", 4_100, false, 50),
    ("CAFE-250", "Café molido 250 g", 9_500, true, 25),
    ("JABON-BARRA", "Jabón de barra", 1_850, false, 80),
    ("PAPEL-4", "Papel higiénico 4 rollos", 3_900, true, 45),
];

/// (name, credit limit in cents)
const CUSTOMERS: &[(&str, i64)] = &[
    ("Ferretería El Sol", 500_000),
    ("Cocina Doña Lupe", 150_000),
    ("Público en general", 0),
];

/// (name, bank)
const ACCOUNTS: &[(&str, &str)] = &[("Operativa", "BBVA"), ("Nómina", "Banorte")];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Caja Seed Data Generator");
                println!();
                println!("Usage: caja-seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: from config)");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(arg = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = EngineConfig::load_or_default(config_path);
    if db_path.is_some() {
        config.database.path = db_path;
    }

    let engine = Engine::open(&config).await?;
    let db = engine.db();
    let now = Utc::now();

    if !db.tills().list().await?.is_empty() {
        warn!("Database already has tills, skipping seed. Delete the file to regenerate.");
        return Ok(());
    }

    for name in TILLS {
        let till = db.tills().create(name, now).await?;
        info!(till_id = %till.id, name, "Till created");
    }

    for (idx, (sku, name, price_cents, tax_inclusive, stock_units)) in
        PRODUCTS.iter().enumerate()
    {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            barcode: Some(format!("750{:010}", idx + 1)),
            name: name.to_string(),
            unit_price: Money::from_cents(*price_cents),
            tax_inclusive: *tax_inclusive,
            stock: Quantity::from_units(*stock_units),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = db.products().insert(&product).await {
            warn!(sku, error = %e, "Failed to insert product");
        }
    }
    info!(count = PRODUCTS.len(), "Catalog seeded");

    for (name, limit_cents) in CUSTOMERS {
        let customer = db
            .customers()
            .create(name, Money::from_cents(*limit_cents), now)
            .await?;
        info!(customer_id = %customer.id, name, "Customer created");
    }

    for (name, bank) in ACCOUNTS {
        let account = db.bank().create_account(name, bank, now).await?;
        info!(account_id = %account.id, name, bank, "Bank account created");
    }

    info!("Seed complete");
    Ok(())
}
