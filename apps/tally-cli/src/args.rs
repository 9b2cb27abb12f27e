//! Command-line parsing.
//!
//! Hand-rolled like the seed tool: global flags may appear anywhere, the
//! first bare word is the command and the rest are its arguments.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use tally_core::{Money, PaymentMethod, ValidationError};

pub const USAGE: &str = "\
Tally POS

Usage: tally [OPTIONS] <COMMAND>

Commands:
  products [--all]                   List the catalog
  search <query>                     Search products by name, description or barcode
  low-stock                          Products at or below their minimum level
  stock <product> <qty> [reason]     Set counted stock
  create                             Open a new order
  add <order> <product> <qty>        Add a product to an order
  remove <order> <line>              Remove a line
  qty <order> <line> <qty>           Set a line's quantity (0 removes)
  discount <order> <amount>          Set the order discount
  line-discount <order> <line> <amt> Set a per-unit discount on one line
  notes <order> [text]               Set the order note (no text clears it)
  pay <order> <method> <amount>      Pay (cash, card, voucher, other)
  cancel <order> [reason]            Cancel an open order
  show <order>                       Print an order
  report <start> <end>               Sales report for whole days (YYYY-MM-DD)
  deposit-return <product> <qty>     Pay out deposit for returned empties
  deposit-products                   Active products that carry a deposit
  deposit-balance                    All-time deposit collected, returned and held
  deposits <start> <end>             Deposit statistics per day and category

<order> is an order id or a 12-digit order number.

Options:
  -c, --config <PATH>   Config file (default: platform config dir)
  -d, --db <PATH>       Database file, overrides the config
  -u, --user <ID>       Acting user id
  -h, --help            Show this help message";

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Products { include_inactive: bool },
    Search { query: String },
    LowStock,
    Stock { product_id: String, quantity: i64, reason: Option<String> },
    Create,
    Add { order: String, product_id: String, quantity: i64 },
    Remove { order: String, line_item_id: String },
    Qty { order: String, line_item_id: String, quantity: i64 },
    Discount { order: String, amount: Money },
    LineDiscount { order: String, line_item_id: String, amount: Money },
    Notes { order: String, text: Option<String> },
    Pay { order: String, method: PaymentMethod, amount: Money },
    Cancel { order: String, reason: Option<String> },
    Show { order: String },
    Report { first: NaiveDate, last: NaiveDate },
    DepositReturn { product_id: String, quantity: i64 },
    DepositProducts,
    DepositBalance,
    Deposits { first: NaiveDate, last: NaiveDate },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub config: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub user: Option<i64>,
    pub command: Command,
}

pub fn parse<I>(args: I) -> Result<Cli, ParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut db = None;
    let mut user = None;
    let mut words = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config = Some(PathBuf::from(value(&mut args, &arg)?)),
            "--db" | "-d" => db = Some(PathBuf::from(value(&mut args, &arg)?)),
            "--user" | "-u" => {
                let raw = value(&mut args, &arg)?;
                user = Some(raw.parse::<i64>().map_err(|_| ValidationError::InvalidFormat {
                    field: "user".to_string(),
                    reason: format!("'{}' is not a user id", raw),
                })?);
            }
            "--help" | "-h" => words.insert(0, "help".to_string()),
            _ => words.push(arg),
        }
    }

    let command = command(&words)?;
    Ok(Cli {
        config,
        db,
        user,
        command,
    })
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, ParseError> {
    args.next()
        .ok_or_else(|| ParseError::Usage(format!("{} needs a value", flag)))
}

fn command(words: &[String]) -> Result<Command, ParseError> {
    let Some((name, rest)) = words.split_first() else {
        return Ok(Command::Help);
    };
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

    let command = match (name.as_str(), rest.as_slice()) {
        ("help", _) => Command::Help,
        ("products", []) => Command::Products {
            include_inactive: false,
        },
        ("products", ["--all"]) => Command::Products {
            include_inactive: true,
        },
        ("search", [query]) => Command::Search {
            query: query.to_string(),
        },
        ("low-stock", []) => Command::LowStock,
        ("stock", [product, qty, reason @ ..]) => Command::Stock {
            product_id: product.to_string(),
            quantity: quantity(qty)?,
            reason: joined(reason),
        },
        ("create", []) => Command::Create,
        ("add", [order, product, qty]) => Command::Add {
            order: order.to_string(),
            product_id: product.to_string(),
            quantity: quantity(qty)?,
        },
        ("remove", [order, line]) => Command::Remove {
            order: order.to_string(),
            line_item_id: line.to_string(),
        },
        ("qty", [order, line, qty]) => Command::Qty {
            order: order.to_string(),
            line_item_id: line.to_string(),
            quantity: quantity(qty)?,
        },
        ("discount", [order, amount]) => Command::Discount {
            order: order.to_string(),
            amount: amount.parse()?,
        },
        ("line-discount", [order, line, amount]) => Command::LineDiscount {
            order: order.to_string(),
            line_item_id: line.to_string(),
            amount: amount.parse()?,
        },
        ("notes", [order, text @ ..]) => Command::Notes {
            order: order.to_string(),
            text: joined(text),
        },
        ("pay", [order, method, amount]) => Command::Pay {
            order: order.to_string(),
            method: method.parse()?,
            amount: amount.parse()?,
        },
        ("cancel", [order, reason @ ..]) => Command::Cancel {
            order: order.to_string(),
            reason: joined(reason),
        },
        ("show", [order]) => Command::Show {
            order: order.to_string(),
        },
        ("report", [first, last]) => Command::Report {
            first: date("start", first)?,
            last: date("end", last)?,
        },
        ("deposit-return", [product, qty]) => Command::DepositReturn {
            product_id: product.to_string(),
            quantity: quantity(qty)?,
        },
        ("deposit-products", []) => Command::DepositProducts,
        ("deposit-balance", []) => Command::DepositBalance,
        ("deposits", [first, last]) => Command::Deposits {
            first: date("start", first)?,
            last: date("end", last)?,
        },
        (name, _) => {
            return Err(ParseError::Usage(format!(
                "unknown command or wrong arguments: {}",
                name
            )))
        }
    };
    Ok(command)
}

fn quantity(raw: &str) -> Result<i64, ValidationError> {
    raw.parse().map_err(|_| ValidationError::InvalidFormat {
        field: "quantity".to_string(),
        reason: format!("'{}' is not a whole number", raw),
    })
}

fn date(field: &str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("'{}' is not a YYYY-MM-DD date", raw),
    })
}

/// Free-text trailing words, e.g. a cancel reason or an order note.
fn joined(words: &[&str]) -> Option<String> {
    let text = words.join(" ");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
