//! # Tally POS Command Line
//!
//! ## Startup Sequence
//! 1. Parse arguments
//! 2. Load configuration (defaults → tally.toml → TALLY_* env)
//! 3. Initialize tracing on stderr
//! 4. Open the database and wire the services
//! 5. Run one command, print JSON to stdout
//!
//! Service failures are printed as an error body and exit with status 1:
//! ```json
//! { "code": "INVALID_STATE", "message": "Order … is paid, operation not allowed", "retryable": false }
//! ```
//! Usage errors exit with status 2.

mod args;

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use args::{Cli, Command, ParseError, USAGE};
use tally_core::order_number::parse_order_number;
use tally_core::ReportRange;
use tally_service::{ErrorResponse, OrderError, OrderResult, Pos, PosConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match args::parse(env::args().skip(1)) {
        Ok(cli) => cli,
        Err(ParseError::Usage(message)) => {
            eprintln!("error: {}\n\n{}", message, USAGE);
            return ExitCode::from(2);
        }
        Err(ParseError::Invalid(e)) => return failure(&OrderError::InvalidInput(e)),
    };

    if cli.command == Command::Help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins over the configured `logging.filter`.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = PosConfig::load(cli.config.clone()).context("failed to load configuration")?;
    if let Some(db) = cli.db.clone() {
        config.database.path = Some(db);
    }

    init_tracing(&config.logging.filter);
    info!(store = %config.store.name, "Starting Tally POS");

    let pos = Pos::open(&config, cli.user)
        .await
        .context("failed to open the database")?;
    let user = cli.user.unwrap_or(config.orders.user_id);

    let outcome = dispatch(&pos, cli.command, user).await;
    pos.close().await;

    Ok(match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            ExitCode::SUCCESS
        }
        Err(e) => failure(&e),
    })
}

fn failure(err: &OrderError) -> ExitCode {
    let body = ErrorResponse::from(err);
    match serde_json::to_string_pretty(&body) {
        Ok(json) => println!("{}", json),
        Err(_) => eprintln!("error: {}", err),
    }
    ExitCode::FAILURE
}

fn json<T: Serialize>(value: T) -> OrderResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| {
        OrderError::PersistenceFailure(tally_service::StoreError::Backend(format!("serialization failed: {}", e)))
    })
}

/// Accepts an order id or a 12-digit order number.
async fn resolve(pos: &Pos, order: &str) -> OrderResult<String> {
    if parse_order_number(order).is_ok() {
        let found = pos.orders.find_by_order_number(order).await?;
        return Ok(found.id().to_string());
    }
    Ok(order.to_string())
}

async fn dispatch(pos: &Pos, command: Command, user: i64) -> OrderResult<serde_json::Value> {
    debug!(?command, user, "Dispatching command");

    match command {
        Command::Help => Ok(serde_json::Value::String(USAGE.to_string())),
        Command::Products { include_inactive } => json(pos.catalog.list_products(include_inactive).await?),
        Command::Search { query } => json(pos.catalog.search_products(&query, None).await?),
        Command::LowStock => json(pos.catalog.low_stock_products().await?),
        Command::Stock {
            product_id,
            quantity,
            reason,
        } => json(pos.catalog.set_stock(&product_id, quantity, reason).await?),
        Command::Create => json(pos.orders.create_order(user).await?),
        Command::Add {
            order,
            product_id,
            quantity,
        } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.add_item(&id, &product_id, quantity).await?)
        }
        Command::Remove { order, line_item_id } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.remove_item(&id, &line_item_id).await?)
        }
        Command::Qty {
            order,
            line_item_id,
            quantity,
        } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.set_quantity(&id, &line_item_id, quantity).await?)
        }
        Command::Discount { order, amount } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.apply_discount(&id, amount).await?)
        }
        Command::LineDiscount {
            order,
            line_item_id,
            amount,
        } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.apply_line_discount(&id, &line_item_id, amount).await?)
        }
        Command::Notes { order, text } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.set_notes(&id, text).await?)
        }
        Command::Pay { order, method, amount } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.process_payment(&id, method, amount).await?)
        }
        Command::Cancel { order, reason } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.cancel_order(&id, reason).await?)
        }
        Command::Show { order } => {
            let id = resolve(pos, &order).await?;
            json(pos.orders.get_order(&id).await?)
        }
        Command::Report { first, last } => {
            let range = ReportRange::days(first, last)?;
            json(pos.reports.sales_report(range).await?)
        }
        Command::DepositReturn { product_id, quantity } => {
            json(pos.deposits.return_deposit(&product_id, quantity).await?)
        }
        Command::DepositProducts => json(pos.deposits.products_with_deposit().await?),
        Command::DepositBalance => json(pos.deposits.balance().await?),
        Command::Deposits { first, last } => {
            let range = ReportRange::days(first, last)?;
            json(pos.deposits.statistics(range).await?)
        }
    }
}
