//! Command handlers. Each one drives the session controller or a typed API
//! surface and prints plain text to stdout.

use std::io::{self, Write};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info, warn};

use cardpay_core::api::ApiClient;
use cardpay_core::models::{
    AdminTransactionFilter, Card, NewCard, NewUser, Page, PasswordChange, PaymentRequest,
    Transaction, TransactionFilter, UserProfile, UserUpdate,
};
use cardpay_core::{Checkout, CheckoutError, Config, SessionController, SessionState};

use crate::utils::{format_amount, format_date, format_optional, mask_email, truncate_string};
use crate::{
    AdminCommand, AdminTxnArgs, CardsCommand, FilterArgs, PayArgs, RegisterArgs, TxnsCommand,
};

/// Password env var for non-interactive sign in
const ENV_PASSWORD: &str = "CARDPAY_PASSWORD";

const MERCHANT_WIDTH: usize = 24;
const DESCRIPTION_WIDTH: usize = 40;

impl FilterArgs {
    fn to_filter(&self) -> TransactionFilter {
        TransactionFilter {
            status: self.status,
            date_from: self.from,
            date_to: self.to,
            amount_min: self.min,
            amount_max: self.max,
            search: self.search.clone(),
            ordering: self.ordering.clone(),
            page: self.page,
        }
    }
}

impl AdminTxnArgs {
    fn to_filter(&self) -> AdminTransactionFilter {
        AdminTransactionFilter {
            status: self.status,
            date_from: self.from,
            date_to: self.to,
            user_id: self.user,
            page: self.page,
        }
    }
}

pub struct App {
    config: Config,
    session: SessionController,
}

impl App {
    /// Load config, open the credential store and restore any stored session
    pub async fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(api_url = %config.api_url, payment_url = %config.payment_url, "Config loaded");

        let store = config
            .open_store()
            .context("Failed to open credential store")?;
        let client = ApiClient::new(&config, store).context("Failed to create API client")?;
        let session = SessionController::new(client);

        let state = session.bootstrap().await?;
        debug!(state = state.name(), "Session bootstrapped");

        Ok(Self { config, session })
    }

    fn client(&self) -> &ApiClient {
        self.session.client()
    }

    fn require_profile(&self) -> Result<UserProfile> {
        self.session
            .profile()
            .ok_or_else(|| anyhow!("Not signed in. Run `cardpay login` first."))
    }

    fn require_admin(&self) -> Result<()> {
        self.require_profile()?;
        if !self.session.is_admin() {
            bail!("Admin access required");
        }
        Ok(())
    }

    pub async fn login(&mut self, email: Option<String>) -> Result<()> {
        if let SessionState::Authenticated(profile) = self.session.state() {
            println!("Already signed in as {}", profile.email);
            return Ok(());
        }

        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = match std::env::var(ENV_PASSWORD) {
            Ok(password) if !password.is_empty() => password,
            _ => rpassword::prompt_password("Password: ")?,
        };

        info!(email = %mask_email(&email), "Signing in");
        let profile = self
            .session
            .login(&email, &password)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;

        self.remember_email(email);
        println!("Signed in as {}", profile.display_name());
        Ok(())
    }

    pub async fn register(&mut self, args: RegisterArgs) -> Result<()> {
        let password = rpassword::prompt_password("Password: ")?;
        let password2 = rpassword::prompt_password("Confirm password: ")?;

        let user = NewUser {
            email: args.email.clone(),
            username: args.username,
            password,
            password2,
            first_name: args.first_name,
            last_name: args.last_name,
            phone: args.phone,
        };
        let profile = self
            .session
            .register(&user)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;

        self.remember_email(args.email);
        println!("Welcome, {}! Your account is ready.", profile.display_name());
        Ok(())
    }

    fn remember_email(&mut self, email: String) {
        if let Err(e) = self.config.remember_email(email) {
            warn!(error = %e, "Failed to save config");
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await?;
        println!("Signed out");
        Ok(())
    }

    pub fn whoami(&self) -> Result<()> {
        let profile = self.require_profile()?;
        println!("{} <{}>", profile.display_name(), profile.email);
        println!("  Username: {}", profile.username);
        println!("  Phone:    {}", format_optional(profile.phone.as_deref(), "-"));
        if let Some(created) = profile.created_at {
            println!("  Joined:   {}", format_date(&created));
        }
        if profile.is_admin {
            println!("  Role:     admin");
        }
        Ok(())
    }

    pub async fn change_password(&self) -> Result<()> {
        self.require_profile()?;
        let change = PasswordChange {
            old_password: rpassword::prompt_password("Current password: ")?,
            new_password: rpassword::prompt_password("New password: ")?,
            new_password2: rpassword::prompt_password("Confirm new password: ")?,
        };
        self.client()
            .auth()
            .change_password(&change)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
        println!("Password changed");
        Ok(())
    }

    pub async fn cards(&self, cmd: CardsCommand) -> Result<()> {
        self.require_profile()?;
        let cards = self.client().cards();

        match cmd {
            CardsCommand::List => {
                let list = cards.list().await.context("Failed to load cards")?;
                print_cards(&list);
            }
            CardsCommand::Add {
                holder,
                card_type,
                expiry: (expiry_month, expiry_year),
                default,
            } => {
                let number = rpassword::prompt_password("Card number: ")?;
                let new_card = NewCard {
                    card_holder_name: holder,
                    card_number: number.chars().filter(|c| c.is_ascii_digit()).collect(),
                    card_type,
                    expiry_month,
                    expiry_year,
                    is_default: default,
                };
                let card = cards
                    .add(&new_card)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("Added {} {}", card.card_type.display_name(), card.masked_number);
            }
            CardsCommand::Rename { id, holder } => {
                let card = cards
                    .rename(id, &holder)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("Card {} now belongs to {}", card.id, card.card_holder_name);
            }
            CardsCommand::Default { id } => {
                let card = cards
                    .set_default(id)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("Default card is now {}", card.masked_number);
            }
            CardsCommand::Delete { id } => {
                cards
                    .delete(id)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("Card {} deleted", id);
            }
        }
        Ok(())
    }

    pub async fn transactions(&self, cmd: TxnsCommand) -> Result<()> {
        self.require_profile()?;

        match cmd {
            TxnsCommand::List(args) => {
                let page = self
                    .client()
                    .transactions()
                    .list(&args.to_filter())
                    .await
                    .context("Failed to load transactions")?;
                print_transactions(&page);
            }
            TxnsCommand::Show { id } => {
                let txn = self
                    .client()
                    .transactions()
                    .detail(id)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                print_transaction_detail(&txn);
            }
        }
        Ok(())
    }

    pub async fn pay(&self, args: PayArgs) -> Result<()> {
        self.require_profile()?;

        let card_id = match args.card {
            Some(id) => id,
            None => self
                .client()
                .cards()
                .list()
                .await
                .context("Failed to load cards")?
                .into_iter()
                .find(|c| c.is_default)
                .map(|c| c.id)
                .ok_or_else(|| anyhow!("No default card. Pass --card or set one first."))?,
        };

        let request = PaymentRequest {
            card_id,
            amount: args.amount,
            currency: args.currency,
            merchant_name: args.merchant,
            description: args.description,
        };

        match Checkout::new(self.client()).pay(&request).await {
            Ok(outcome) => {
                let receipt = &outcome.receipt;
                println!(
                    "Payment {}: {} to {}",
                    receipt.status.as_str(),
                    format_amount(receipt.amount, &receipt.currency),
                    receipt.merchant_name
                );
                if receipt.succeeded() {
                    println!("Reference: {}", outcome.transaction.reference_id);
                } else {
                    println!("Reason: {}", receipt.failure_reason());
                }
                Ok(())
            }
            Err(CheckoutError::Payment(e)) => bail!("Payment service error: {}", e.user_message()),
            Err(e @ CheckoutError::LedgerSync { .. }) => Err(e.into()),
        }
    }

    pub async fn admin(&self, cmd: AdminCommand) -> Result<()> {
        self.require_admin()?;
        let admin = self.client().admin();

        match cmd {
            AdminCommand::Users => {
                let users = admin
                    .users()
                    .await
                    .context("Failed to load users")?;
                println!("{:>5}  {:<28} {:<16} {:<7} {}", "ID", "EMAIL", "USERNAME", "ADMIN", "ACTIVE");
                for user in &users.results {
                    println!(
                        "{:>5}  {:<28} {:<16} {:<7} {}",
                        user.id,
                        truncate_string(&user.email, 28),
                        truncate_string(&user.username, 16),
                        if user.is_admin { "yes" } else { "no" },
                        match user.is_active {
                            Some(false) => "no",
                            _ => "yes",
                        }
                    );
                }
                print_page_footer(&users);
            }
            AdminCommand::UpdateUser { id, active, admin: is_admin } => {
                if active.is_none() && is_admin.is_none() {
                    bail!("Nothing to update. Pass --active and/or --admin.");
                }
                let update = UserUpdate {
                    is_active: active,
                    is_admin,
                };
                let user = admin
                    .update_user(id, &update)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("Updated {}", user.email);
            }
            AdminCommand::DeleteUser { id } => {
                admin
                    .delete_user(id)
                    .await
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("User {} deleted", id);
            }
            AdminCommand::Cards => {
                let cards = admin.cards().await.context("Failed to load cards")?;
                print_cards(&cards.results);
                print_page_footer(&cards);
            }
            AdminCommand::Txns(args) => {
                let page = admin
                    .transactions(&args.to_filter())
                    .await
                    .context("Failed to load transactions")?;
                print_transactions(&page);
            }
            AdminCommand::Summary => {
                let rows = admin
                    .daily_summary()
                    .await
                    .context("Failed to load summary")?;
                println!("{:<12} {:<8} {:>6} {:>16}", "DATE", "STATUS", "COUNT", "TOTAL");
                for row in rows {
                    println!(
                        "{:<12} {:<8} {:>6} {:>16}",
                        row.date.format("%Y-%m-%d"),
                        row.status.as_str(),
                        row.count,
                        row.total
                            .map(|t| t.round_dp(2).to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
            AdminCommand::Export { out } => {
                let bytes = admin.export_csv().await.context("Failed to export")?;
                std::fs::write(&out, &bytes)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                println!("Wrote {} bytes to {}", bytes.len(), out.display());
            }
            AdminCommand::Logs => {
                let logs = admin.logs().await.context("Failed to load admin logs")?;
                for entry in &logs.results {
                    println!(
                        "{}  {:<10} {:<14} {} {}",
                        format_date(&entry.timestamp),
                        format_optional(entry.admin.as_deref(), "system"),
                        entry.action,
                        entry.target_model,
                        entry.target_id
                    );
                    if !entry.description.is_empty() {
                        println!("    {}", truncate_string(&entry.description, 100));
                    }
                }
                print_page_footer(&logs);
            }
        }
        Ok(())
    }

    pub fn theme(&self, toggle: bool) -> Result<()> {
        let theme = if toggle {
            self.session.toggle_theme()?
        } else {
            self.session.theme()?
        };
        println!("Theme: {}", theme.as_str());
        Ok(())
    }

    pub async fn health(&self) -> Result<()> {
        let health = self
            .client()
            .payments()
            .health()
            .await
            .context("Payment service unreachable")?;
        println!(
            "Payment service: {} {}",
            health.status,
            format_optional(health.version.as_deref(), "")
        );
        Ok(())
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn print_cards(cards: &[Card]) {
    if cards.is_empty() {
        println!("No cards saved");
        return;
    }
    println!("{:>5}  {:<20} {:<22} {:<7} {}", "ID", "TYPE", "NUMBER", "EXPIRY", "HOLDER");
    for card in cards {
        println!(
            "{:>5}  {:<20} {:<22} {:<7} {}{}",
            card.id,
            card.card_type.display_name(),
            card.masked_number,
            card.expiry_display(),
            card.card_holder_name,
            if card.is_default { "  (default)" } else { "" }
        );
    }
}

fn print_transactions(page: &Page<Transaction>) {
    if page.results.is_empty() {
        println!("No transactions found");
        return;
    }
    println!(
        "{:>5}  {:<20} {:<w$} {:>16} {:<8} {}",
        "ID",
        "DATE",
        "MERCHANT",
        "AMOUNT",
        "STATUS",
        "REFERENCE",
        w = MERCHANT_WIDTH
    );
    for txn in &page.results {
        println!(
            "{:>5}  {:<20} {:<w$} {:>16} {:<8} {}",
            txn.id,
            format_date(&txn.created_at),
            truncate_string(&txn.merchant_name, MERCHANT_WIDTH),
            format_amount(txn.amount, &txn.currency),
            txn.status.as_str(),
            txn.reference_id,
            w = MERCHANT_WIDTH
        );
    }
    print_page_footer(page);
}

fn print_transaction_detail(txn: &Transaction) {
    println!("Transaction {}", txn.id);
    println!("  Reference: {}", txn.reference_id);
    println!("  Merchant:  {}", txn.merchant_name);
    println!("  Amount:    {}", format_amount(txn.amount, &txn.currency));
    println!("  Status:    {}", txn.status.as_str());
    if !txn.failure_reason.is_empty() {
        println!("  Reason:    {}", txn.failure_reason);
    }
    if !txn.description.is_empty() {
        println!(
            "  Note:      {}",
            truncate_string(&txn.description, DESCRIPTION_WIDTH)
        );
    }
    if let Some(card) = &txn.card_detail {
        println!(
            "  Card:      {} {}",
            card.card_type.display_name(),
            card.masked_number
        );
    }
    println!("  Created:   {}", format_date(&txn.created_at));
    if let Some(updated) = txn.updated_at {
        println!("  Updated:   {}", format_date(&updated));
    }
}

fn print_page_footer<T>(page: &Page<T>) {
    if page.has_next() || page.count > page.results.len() {
        println!(
            "Showing {} of {}. Use --page for more.",
            page.results.len(),
            page.count
        );
    }
}
