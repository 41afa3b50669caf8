//! Listly CLI - terminal client for the synchronization core.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the session persists under the data directory)
//! listly login -e you@example.com -p secret
//!
//! # Show your lists
//! listly lists show
//!
//! # Add and buy items
//! listly items add <LIST_ID> "Milk" --quantity 2
//! listly items buy <LIST_ID> "Milk" --price 4.50
//!
//! # Share a list
//! listly invite <LIST_ID> friend@example.com
//!
//! # Tail realtime changes to a list
//! listly watch <LIST_ID>
//! ```
//!
//! Configuration comes from the environment (`LISTLY_API_URL`,
//! `LISTLY_API_KEY`, optionally `LISTLY_DATA_DIR`, `LISTLY_PAGE_SIZE`,
//! `LISTLY_HTTP_TIMEOUT_SECS`), with `.env` support.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::print_stdout)]

use clap::{Parser, Subcommand};
use listly_client::config::Config;
use listly_client::AppContext;
use listly_core::ListId;
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "listly")]
#[command(author, version, about = "Listly terminal client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and persist the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Sign out and drop the persisted session
    Logout,
    /// Shopping lists
    Lists {
        #[command(subcommand)]
        action: ListsAction,
    },
    /// Items on a list
    Items {
        #[command(subcommand)]
        action: ItemsAction,
    },
    /// Invite a user to a list by email
    Invite {
        /// List id
        list: ListId,
        /// Email of the account to invite
        email: String,
    },
    /// Tail realtime changes to a list until interrupted
    Watch {
        /// List id
        list: ListId,
    },
    /// Device-local list templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum ListsAction {
    /// Show all lists
    Show,
    /// Create a list
    Create {
        /// List name
        name: String,
        /// Optional budget
        #[arg(short, long)]
        budget: Option<Decimal>,
    },
}

#[derive(Subcommand)]
enum ItemsAction {
    /// Show a list's items (all pages)
    Show {
        /// List id
        list: ListId,
    },
    /// Add an item
    Add {
        /// List id
        list: ListId,
        /// Item name
        name: String,
        /// Quantity
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Mark an item purchased by name
    Buy {
        /// List id
        list: ListId,
        /// Item name (first unpurchased match)
        name: String,
        /// Price paid
        #[arg(short, long)]
        price: Decimal,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Show saved templates
    Show,
    /// Save a list's current items as a template
    Save {
        /// List id
        list: ListId,
        /// Template name
        name: String,
    },
    /// Replay a template into a list
    Apply {
        /// List id
        list: ListId,
        /// Template name
        name: String,
    },
    /// Delete a template
    Delete {
        /// Template name
        name: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let ctx = AppContext::new(config)?;
    ctx.bootstrap().await;

    match cli.command {
        Commands::Login { email, password } => commands::auth::login(&ctx, &email, &password).await?,
        Commands::Logout => commands::auth::logout(&ctx).await,
        Commands::Lists { action } => match action {
            ListsAction::Show => commands::lists::show(&ctx).await?,
            ListsAction::Create { name, budget } => {
                commands::lists::create(&ctx, &name, budget).await?;
            }
        },
        Commands::Items { action } => match action {
            ItemsAction::Show { list } => commands::items::show(&ctx, list).await?,
            ItemsAction::Add {
                list,
                name,
                quantity,
            } => commands::items::add(&ctx, list, &name, quantity).await?,
            ItemsAction::Buy { list, name, price } => {
                commands::items::buy(&ctx, list, &name, price).await?;
            }
        },
        Commands::Invite { list, email } => commands::members::invite(&ctx, list, &email).await?,
        Commands::Watch { list } => commands::watch::run(&ctx, list).await?,
        Commands::Template { action } => match action {
            TemplateAction::Show => commands::template::show(&ctx),
            TemplateAction::Save { list, name } => {
                commands::template::save(&ctx, list, &name).await?;
            }
            TemplateAction::Apply { list, name } => {
                commands::template::apply(&ctx, list, &name).await?;
            }
            TemplateAction::Delete { name } => commands::template::delete(&ctx, &name),
        },
    }
    Ok(())
}
