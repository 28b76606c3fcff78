//! `BankID` Gateway CLI - migrations, terminal sign-in, and user lookup.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! bgw migrate
//!
//! # Sign in from the terminal (scan the printed QR payload or open the link)
//! bgw login
//! bgw login --personal-number 198001011234
//!
//! # Show the local user for a personal number
//! bgw user show 198001011234
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `login` - Run one sign-in against the configured authority
//! - `user show` - Look up a local user by personal number

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bgw")]
#[command(author, version, about = "BankID Gateway CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Sign in once and print the resolved user
    Login {
        /// Restrict the order to this personal number
        #[arg(short, long)]
        personal_number: Option<String>,

        /// End-user IP reported to the authority
        #[arg(long, default_value = "127.0.0.1")]
        ip: std::net::IpAddr,
    },
    /// Inspect local users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Show the user with a verified personal number
    Show {
        /// Twelve-digit personal number
        personal_number: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
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
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Login {
            personal_number,
            ip,
        } => commands::login::run(personal_number.as_deref(), ip).await?,
        Commands::User { action } => match action {
            UserAction::Show { personal_number } => {
                commands::user::show(&personal_number).await?;
            }
        },
    }
    Ok(())
}
