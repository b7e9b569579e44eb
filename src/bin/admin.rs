//! CLI administration tool for weblink.
//!
//! Works on the store selected by the usual environment variables and goes
//! through the same cache orchestrator as the service, so cached listings stay
//! consistent with what the CLI changes.
//!
//! # Usage
//!
//! ```bash
//! # Create a link with a generated key
//! cargo run --bin admin -- link put --owner u1 --target https://example.com
//!
//! # List an owner's keys
//! cargo run --bin admin -- link list --owner u1
//!
//! # Follow a short key (counts a redirect)
//! cargo run --bin admin -- link open abc
//!
//! # Register a user
//! cargo run --bin admin -- user add --name alice --role creator
//!
//! # Check store and cache connectivity
//! cargo run --bin admin -- store check
//! ```

use weblink::config;
use weblink::prelude::*;
use weblink::runtime;
use weblink::utils::link_input::{generate_key, normalize_target, validate_key};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Confirm, Input, Password};

/// CLI tool for managing weblink data.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Commands {
    /// Manage links
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Backing store operations
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum LinkAction {
    /// Create or update a link
    Put {
        #[arg(short, long)]
        owner: String,

        /// Short key (generated if omitted)
        #[arg(short, long)]
        key: Option<String>,

        #[arg(short, long)]
        target: String,

        /// Overwrite an existing key of the owner
        #[arg(long)]
        update: bool,

        /// Act on the key regardless of owner
        #[arg(long)]
        superuser: bool,
    },

    /// Show one link
    Get {
        #[arg(short, long)]
        owner: String,

        #[arg(short, long)]
        key: String,

        #[arg(long)]
        superuser: bool,
    },

    /// List the keys of an owner
    List {
        #[arg(short, long)]
        owner: String,
    },

    /// List every active link
    All,

    /// Resolve a short key to its target, counting a redirect
    Open { key: String },

    /// Soft-delete a link
    Delete {
        #[arg(short, long)]
        owner: String,

        #[arg(short, long)]
        key: String,

        #[arg(long)]
        superuser: bool,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a user (prompts for missing fields)
    Add {
        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        email: Option<String>,

        /// superuser, creator or user
        #[arg(short, long, default_value = "user")]
        role: String,
    },

    /// List users
    List,

    /// Delete a user by uid
    Delete {
        uid: String,

        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Check store and cache connectivity
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = config::load_from_env()?;
    runtime::init_tracing(&config);

    let orchestrator = runtime::build_orchestrator(&config)
        .await
        .context("Failed to open storage")?;
    let ctx = RequestContext::background();

    let outcome = match cli.command {
        Commands::Link { action } => handle_link_action(action, &orchestrator, &ctx).await,
        Commands::User { action } => handle_user_action(action, &orchestrator, &ctx).await,
        Commands::Store { action } => handle_store_action(action, &orchestrator, &ctx).await,
    };

    // Let queued write-behinds reach the store before exiting.
    orchestrator.shutdown(config.shutdown_timeout()).await;

    outcome
}

/// Dispatches link commands.
async fn handle_link_action(
    action: LinkAction,
    orchestrator: &CacheOrchestrator,
    ctx: &RequestContext,
) -> Result<()> {
    match action {
        LinkAction::Put {
            owner,
            key,
            target,
            update,
            superuser,
        } => put_link(orchestrator, ctx, owner, key, target, update, superuser).await?,
        LinkAction::Get {
            owner,
            key,
            superuser,
        } => {
            let link = orchestrator.get(ctx, &owner, &key, superuser).await?;
            print_link(&link);
        }
        LinkAction::List { owner } => {
            let keys = orchestrator.list(ctx, &owner).await?;

            println!("{} {}", "Links of".bright_blue().bold(), owner.cyan());
            println!();
            if keys.is_empty() {
                println!("{}", "  No links found".yellow());
            }
            for key in &keys {
                println!("  {}", key.bright_white());
            }
            println!();
            println!("  Total: {}", keys.len().to_string().bright_white().bold());
        }
        LinkAction::All => {
            let links = orchestrator.get_all(ctx).await?;

            println!(
                "  {:<16} {:<16} {:>8}  {}",
                "Owner".bright_white().bold(),
                "Key".bright_white().bold(),
                "Opens".bright_white().bold(),
                "Target".bright_white().bold()
            );
            println!("  {}", "-".repeat(75).bright_black());
            for link in &links {
                println!(
                    "  {:<16} {:<16} {:>8}  {}",
                    link.owner.cyan(),
                    link.short_key.bright_white(),
                    link.redirect_count,
                    link.target.bright_black()
                );
            }
            println!();
            println!("  Total: {}", links.len().to_string().bright_white().bold());
        }
        LinkAction::Open { key } => {
            let target = orchestrator.resolve(ctx, &key).await?;
            println!("{} -> {}", key.cyan(), target.bright_green());
        }
        LinkAction::Delete {
            owner,
            key,
            superuser,
            yes,
        } => {
            let link = orchestrator.get(ctx, &owner, &key, superuser).await?;
            print_link(&link);

            if !yes
                && !Confirm::new()
                    .with_prompt("Delete this link?")
                    .default(false)
                    .interact()?
            {
                println!("{}", "Cancelled".red());
                return Ok(());
            }

            orchestrator.delete(ctx, &owner, &key, superuser).await?;
            println!("{}", "Link deleted".green().bold());
        }
    }

    Ok(())
}

/// Creates or updates a link and waits until the store has it.
async fn put_link(
    orchestrator: &CacheOrchestrator,
    ctx: &RequestContext,
    owner: String,
    key: Option<String>,
    target: String,
    update: bool,
    superuser: bool,
) -> Result<()> {
    let key = match key {
        Some(key) => {
            validate_key(&key)?;
            key
        }
        None => generate_key()?,
    };
    let target = normalize_target(&target)?;

    if !update && orchestrator.list(ctx, &owner).await?.contains(&key) {
        anyhow::bail!("{} already has a link '{}'; pass --update to replace it", owner, key);
    }

    let link = Link::new(owner.as_str(), key.as_str(), target);
    let receipt = orchestrator
        .put_acknowledged(ctx, &owner, &key, link, superuser)
        .await?;
    receipt
        .wait()
        .await
        .context("Link was accepted but not stored")?;

    println!("{} {}", "Link stored:".green().bold(), key.bright_yellow());
    Ok(())
}

fn print_link(link: &Link) {
    println!("  Owner:   {}", link.owner.cyan());
    println!("  Key:     {}", link.short_key.bright_white());
    println!("  Target:  {}", link.target);
    println!(
        "  Created: {}",
        link.created_at.format("%Y-%m-%d %H:%M").to_string().bright_black()
    );
    println!("  Opens:   {}", link.redirect_count);
    println!();
}

/// Dispatches user commands.
async fn handle_user_action(
    action: UserAction,
    orchestrator: &CacheOrchestrator,
    ctx: &RequestContext,
) -> Result<()> {
    match action {
        UserAction::Add { name, email, role } => {
            let role = UserRole::parse(&role)
                .with_context(|| format!("Unknown role '{}'", role))?;
            let name = match name {
                Some(n) => n,
                None => Input::new().with_prompt("Name").interact_text()?,
            };
            let email = match email {
                Some(e) => e,
                None => Input::new().with_prompt("Email").interact_text()?,
            };
            let password = Password::new()
                .with_prompt("Password")
                .with_confirmation("Repeat password", "Passwords do not match")
                .interact()?;

            let uid = orchestrator
                .put_user(
                    ctx,
                    NewUser {
                        name,
                        email,
                        password,
                        role,
                    },
                )
                .await?;

            println!("{} {}", "User stored, uid".green().bold(), uid.bright_yellow());
        }
        UserAction::List => {
            let users = orchestrator.list_users(ctx).await?;

            println!(
                "  {:<18} {:<20} {:<28} {:<10}",
                "UID".bright_white().bold(),
                "Name".bright_white().bold(),
                "Email".bright_white().bold(),
                "Role".bright_white().bold()
            );
            println!("  {}", "-".repeat(80).bright_black());
            for user in &users {
                let role = match user.role {
                    UserRole::Superuser => user.role.as_str().red(),
                    _ => user.role.as_str().normal(),
                };
                println!(
                    "  {:<18} {:<20} {:<28} {}",
                    user.uid.bright_black(),
                    user.name.cyan(),
                    user.email,
                    role
                );
            }
            println!();
            println!("  Total: {}", users.len().to_string().bright_white().bold());
        }
        UserAction::Delete { uid, yes } => {
            let user = orchestrator.get_user(ctx, &uid).await?;
            println!("  User: {} ({})", user.name.cyan(), user.uid.bright_black());

            if !yes
                && !Confirm::new()
                    .with_prompt("Delete this user?")
                    .default(false)
                    .interact()?
            {
                println!("{}", "Cancelled".red());
                return Ok(());
            }

            orchestrator.delete_user(ctx, &uid).await?;
            println!("{}", "User deleted".green().bold());
        }
    }

    Ok(())
}

/// Handles store diagnostics.
async fn handle_store_action(
    action: StoreAction,
    orchestrator: &CacheOrchestrator,
    ctx: &RequestContext,
) -> Result<()> {
    match action {
        StoreAction::Check => {
            println!(
                "{} {}",
                "Checking store".bright_blue(),
                orchestrator.store_kind().to_string().cyan()
            );

            let users = orchestrator.list_users(ctx).await?;
            println!("{} ({} users)", "Store OK".green().bold(), users.len());

            match orchestrator.find_superuser(ctx).await? {
                Some(uid) => println!("  Superuser: {}", uid.bright_black()),
                None => println!("{}", "  No superuser registered".yellow()),
            }

            if orchestrator.cache_healthy().await {
                println!("{} ({})", "Cache OK".green().bold(), orchestrator.mode());
            } else {
                println!("{}", "Cache unreachable".red().bold());
            }
        }
    }

    Ok(())
}
