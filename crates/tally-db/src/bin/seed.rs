//! # Seed Data Generator
//!
//! Populates the database with a demo catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default catalog into ./tally_dev.db
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//!
//! # Also book a few paid test orders for report demos
//! cargo run -p tally-db --bin seed -- --orders 20
//! ```
//!
//! ## Generated Products
//! - Drinks (19% VAT, bottle deposit)
//! - Food (7% VAT)
//! - Deposit returns and crates

use chrono::Utc;
use std::env;
use tally_core::order_number::format_order_number;
use tally_core::{Money, Order, PaymentMethod, Product, ProductCategory};
use tally_db::{generate_product_id, Database, DbConfig};
use uuid::Uuid;

/// (name, category, price cents, tax bps, deposit cents, stock, min stock)
const CATALOG: &[(&str, ProductCategory, i64, u32, Option<i64>, i64, i64)] = &[
    ("Cola 0.33l", ProductCategory::Drinks, 250, 1900, Some(25), 120, 24),
    ("Cola Zero 0.33l", ProductCategory::Drinks, 250, 1900, Some(25), 96, 24),
    ("Apfelschorle 0.5l", ProductCategory::Drinks, 280, 1900, Some(25), 60, 12),
    ("Mineralwasser 0.5l", ProductCategory::Drinks, 180, 1900, Some(25), 144, 24),
    ("Pils 0.5l", ProductCategory::Drinks, 350, 1900, Some(8), 200, 48),
    ("Weizen 0.5l", ProductCategory::Drinks, 380, 1900, Some(8), 80, 24),
    ("Kaffee", ProductCategory::Drinks, 200, 1900, None, 0, 0),
    ("Tee", ProductCategory::Drinks, 180, 1900, None, 0, 0),
    ("Bratwurst", ProductCategory::Food, 350, 700, None, 50, 10),
    ("Brezel", ProductCategory::Food, 150, 700, None, 40, 10),
    ("Pommes", ProductCategory::Food, 300, 700, None, 100, 20),
    ("Kuchen", ProductCategory::Food, 250, 700, None, 16, 4),
    ("Pfandrückgabe Flasche", ProductCategory::Deposit, 0, 0, Some(25), 0, 0),
    ("Kasten", ProductCategory::Deposit, 0, 0, Some(150), 0, 0),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./tally_dev.db");
    let mut orders: usize = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--orders" | "-o" => {
                if i + 1 < args.len() {
                    orders = args[i + 1].parse().unwrap_or(0);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>     Database file path (default: ./tally_dev.db)");
                println!("  -o, --orders <N>    Paid test orders to create (default: 0)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tally POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut products = Vec::with_capacity(CATALOG.len());
    for (index, entry) in CATALOG.iter().enumerate() {
        let product = catalog_product(index, entry);
        if let Err(e) = db.products().insert(&product).await {
            eprintln!("Failed to insert {}: {}", product.name, e);
            continue;
        }
        products.push(product);
    }
    println!("✓ Inserted {} products", products.len());

    let sellable: Vec<&Product> = products.iter().filter(|p| p.price_cents > 0).collect();
    let mut booked = 0;
    for n in 0..orders {
        if sellable.is_empty() {
            break;
        }
        let suffix = 1000 + (n % 9000) as u16;
        let number = format_order_number(Utc::now().date_naive(), suffix);

        let mut tx = db.begin().await?;
        if tx.order_number_exists(&number).await? {
            continue;
        }

        let mut order = Order::new(Uuid::new_v4().to_string(), number, 0, true);
        order.add_line_item(sellable[n % sellable.len()], 1 + (n % 3) as i64)?;
        order.add_line_item(sellable[(n * 7 + 3) % sellable.len()], 1)?;

        let method = PaymentMethod::ALL[n % PaymentMethod::ALL.len()];
        let due = order.totals().total;
        let adjustments = order.mark_paid(method, due + Money::from_cents(((n % 4) * 50) as i64))?;

        tx.save_order(&order).await?;
        for adj in &adjustments {
            tx.adjust_stock(&adj.product_id, adj.delta).await?;
        }
        tx.commit().await?;
        booked += 1;
    }
    if orders > 0 {
        println!("✓ Booked {} paid test orders", booked);
    }

    let low = db.products().low_stock().await?;
    println!("  Low stock products: {}", low.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn catalog_product(
    index: usize,
    (name, category, price_cents, tax_rate_bps, deposit_cents, stock, min_stock): &(
        &str,
        ProductCategory,
        i64,
        u32,
        Option<i64>,
        i64,
        i64,
    ),
) -> Product {
    let now = Utc::now();

    Product {
        id: generate_product_id(),
        name: name.to_string(),
        description: None,
        category: *category,
        // EAN-13 shape, checksum not valid
        barcode: Some(format!("400{:010}", index + 1)),
        price_cents: *price_cents,
        tax_rate_bps: *tax_rate_bps,
        requires_deposit: deposit_cents.is_some(),
        deposit_cents: *deposit_cents,
        stock_quantity: *stock,
        min_stock_level: *min_stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
