//! VICA CLI - sign in to VICA from the terminal.
//!
//! Credential sign-in, sign-up and Google sign-in, with the session token kept
//! between runs so later commands are authenticated.

mod app;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vica_core::{AuthError, Config};

use app::App;

#[derive(Debug, Parser)]
#[command(name = "vica", version, about = "Sign in to VICA and manage the local session")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in with email and password
    Signin {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
        /// Profile picture URL
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Sign in with Google through the browser
    Google,
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored and which backend is used
    Status,
    /// List users (requires a session)
    Users,
    /// Show one user (requires a session)
    User { id: String },
    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let config = Config::load()?;
    info!(environment = ?config.environment, "VICA CLI starting");

    let app = App::new(config)?;
    if let Err(e) = app.run(cli.command).await {
        match e.downcast_ref::<AuthError>() {
            // The session guard has already told the user
            Some(auth) if auth.is_session_expired() => {}
            Some(auth) => eprintln!("Error: {}", auth.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}
