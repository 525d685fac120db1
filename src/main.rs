use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use partner_gate::auth::{
    create_session_store, extract_from_location, secure_redirect_url, AddressBar, ApiClient,
    AuthSessionController, AuthStateBus, Navigator, StartupOutcome, Token,
};
use partner_gate::config::Config;
use partner_gate::security::{EncodedBlob, HandoffCipher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Encrypted session handoff between an identity authority and a partner app.
#[derive(Parser, Debug)]
#[command(name = "partner-gate", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a token into a handoff URL for a partner origin
    Issue {
        #[arg(long)]
        token: String,
        /// Partner origin, e.g. https://partner.example or a bare subdomain
        #[arg(long)]
        origin: String,
    },
    /// Decrypt a handoff blob, or the `token` parameter of a handoff URL
    Decrypt { blob: String },
    /// Run the partner startup sequence against an address
    Start {
        #[arg(long, default_value = "/")]
        url: String,
    },
    /// Log in with email and password and store the token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the stored session and print the identity authority's logout URL
    Logout,
    /// Show whether a session token is stored
    Status,
    /// GET an API path with the stored token and print the JSON response
    Get { path: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Issue { token, origin } => {
            let token = Token::new(token).context("Token must not be empty")?;
            println!("{}", secure_redirect_url(&cipher(&config)?, &origin, &token)?);
        }
        Commands::Decrypt { blob } => {
            let blob = match blob.split_once('?') {
                Some((_, query)) => {
                    extract_from_location(query).context("URL has no token parameter")?
                }
                None => EncodedBlob::new(blob),
            };
            println!("{}", cipher(&config)?.decrypt(&blob)?);
        }
        Commands::Start { url } => {
            let (controller, bar) = wire(&config, &url)?;
            match controller.start().await {
                StartupOutcome::Authenticated { source } => {
                    println!("authenticated ({source:?})");
                    println!("address: {}", bar.href());
                }
                StartupOutcome::LoginRequired { redirect } => {
                    println!("login required, redirect: {redirect}");
                }
                StartupOutcome::LoggedOut { redirect } => {
                    println!("logged out, redirect: {redirect}");
                }
            }
        }
        Commands::Login { email, password } => {
            let (controller, _) = wire(&config, "/")?;
            let success = controller.login(&email, &password).await?;
            println!("logged in, token {}", success.token.masked());
        }
        Commands::Logout => {
            let (controller, _) = wire(&config, "/")?;
            println!("{}", controller.logout().await);
        }
        Commands::Status => {
            let (controller, _) = wire(&config, "/")?;
            match controller.token() {
                Some(token) => {
                    let store = controller.store();
                    let lifetime = if store.is_persistent() {
                        "persistent"
                    } else {
                        "this process only"
                    };
                    println!(
                        "authenticated via {} store ({lifetime}), token {}",
                        store.name(),
                        token.masked()
                    );
                }
                None => println!("not authenticated"),
            }
        }
        Commands::Get { path } => {
            let (controller, _) = wire(&config, "/")?;
            let client = ApiClient::new(&config.api, Arc::new(controller))?;
            let body: serde_json::Value = client.get_json(&path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

fn cipher(config: &Config) -> Result<HandoffCipher> {
    if config.handoff.passphrase.is_empty() {
        bail!("handoff.passphrase is not configured (set PARTNER_GATE_PASSPHRASE)");
    }
    Ok(HandoffCipher::new(config.handoff.passphrase.clone()))
}

fn wire(config: &Config, href: &str) -> Result<(AuthSessionController, Arc<AddressBar>)> {
    let store = create_session_store(&config.storage)?;
    let bar = Arc::new(AddressBar::new(href));
    let controller = AuthSessionController::new(
        config,
        store,
        AuthStateBus::new(),
        Arc::clone(&bar) as Arc<dyn Navigator>,
    )?;
    Ok((controller, bar))
}
