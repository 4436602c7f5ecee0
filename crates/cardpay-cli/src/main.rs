//! cardpay - command-line dashboard for the cardpay card-payment services.
//!
//! Signs in against the ledger, keeps the session between runs, and lists
//! cards and transactions, makes payments, and drives the admin panel.

mod commands;
mod utils;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cardpay_core::models::{CardType, TransactionStatus};

/// Optional directory for a daily rolling log file
const ENV_LOG_DIR: &str = "CARDPAY_LOG_DIR";

const LOG_FILE_PREFIX: &str = "cardpay.log";

#[derive(Parser, Debug)]
#[command(name = "cardpay", version, about = "Card-payment dashboard in your terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with email and password
    Login {
        /// Defaults to the last email used
        #[arg(long, env = "CARDPAY_EMAIL")]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register(RegisterArgs),
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in profile
    Whoami,
    /// Change the account password
    Passwd,
    /// Manage saved cards
    #[command(subcommand)]
    Cards(CardsCommand),
    /// Browse transactions
    #[command(subcommand)]
    Txns(TxnsCommand),
    /// Pay a merchant with a saved card
    Pay(PayArgs),
    /// Admin panel (admin accounts only)
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Show or toggle the theme preference
    Theme {
        #[arg(long)]
        toggle: bool,
    },
    /// Check that the payment service is up
    Health,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub first_name: Option<String>,
    #[arg(long)]
    pub last_name: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CardsCommand {
    List,
    /// Add a card. The number is prompted for and never echoed.
    Add {
        #[arg(long)]
        holder: String,
        #[arg(long = "type", value_parser = parse_card_type, default_value = "VISA")]
        card_type: CardType,
        /// Expiry as MM/YYYY
        #[arg(long, value_parser = parse_expiry)]
        expiry: (u32, i32),
        #[arg(long)]
        default: bool,
    },
    Rename {
        id: i64,
        holder: String,
    },
    /// Make a card the default
    Default {
        id: i64,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TransactionStatus>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub to: Option<NaiveDate>,
    #[arg(long)]
    pub min: Option<Decimal>,
    #[arg(long)]
    pub max: Option<Decimal>,
    /// Merchant name or reference
    #[arg(long)]
    pub search: Option<String>,
    /// e.g. -created_at, amount
    #[arg(long)]
    pub ordering: Option<String>,
    #[arg(long)]
    pub page: Option<u32>,
}

/// Filters the admin transaction list understands
#[derive(Args, Debug, Default)]
pub struct AdminTxnArgs {
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TransactionStatus>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// Only this user's transactions
    #[arg(long)]
    pub user: Option<i64>,
    #[arg(long)]
    pub page: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum TxnsCommand {
    List(FilterArgs),
    Show { id: i64 },
}

#[derive(Args, Debug)]
pub struct PayArgs {
    #[arg(long)]
    pub amount: Decimal,
    #[arg(long)]
    pub merchant: String,
    /// Card id, defaults to the default card
    #[arg(long)]
    pub card: Option<i64>,
    #[arg(long, default_value = "USD")]
    pub currency: String,
    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    Users,
    UpdateUser {
        id: i64,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        admin: Option<bool>,
    },
    DeleteUser {
        id: i64,
    },
    Cards,
    Txns(AdminTxnArgs),
    /// Per-day totals by status
    Summary,
    /// Export every transaction as CSV
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    /// Admin audit log
    Logs,
}

fn parse_status(s: &str) -> Result<TransactionStatus, String> {
    TransactionStatus::from_str(s)
        .ok_or_else(|| format!("unknown status '{}' (PENDING, SUCCESS, FAILED)", s))
}

fn parse_card_type(s: &str) -> Result<CardType, String> {
    Ok(CardType::from_str(s))
}

fn parse_expiry(s: &str) -> Result<(u32, i32), String> {
    let (month, year) = s
        .split_once('/')
        .ok_or_else(|| "expected MM/YYYY".to_string())?;
    let month: u32 = month.trim().parse().map_err(|_| "invalid month".to_string())?;
    let year: i32 = year.trim().parse().map_err(|_| "invalid year".to_string())?;
    if !(1..=12).contains(&month) {
        return Err("month must be 1-12".to_string());
    }
    let year = if year < 100 { 2000 + year } else { year };
    Ok((month, year))
}

/// Initialize the tracing subscriber for logging.
///
/// Returns the file writer guard when file logging is on; it must live until
/// exit so buffered lines are flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    let cli = Cli::parse();
    info!(command = ?cli.command, "cardpay starting");

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut app = commands::App::new().await?;

    match cli.command {
        Command::Login { email } => app.login(email).await,
        Command::Register(args) => app.register(args).await,
        Command::Logout => app.logout().await,
        Command::Whoami => app.whoami(),
        Command::Passwd => app.change_password().await,
        Command::Cards(cmd) => app.cards(cmd).await,
        Command::Txns(cmd) => app.transactions(cmd).await,
        Command::Pay(args) => app.pay(args).await,
        Command::Admin(cmd) => app.admin(cmd).await,
        Command::Theme { toggle } => app.theme(toggle),
        Command::Health => app.health().await,
    }
}
