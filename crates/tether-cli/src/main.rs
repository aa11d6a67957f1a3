//! Tether CLI
//!
//! Runs a server's relay connection from the command line.

mod config;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{ConnectionState, HttpHandshakeClient, SocketConnector};
use tether_transport::WsSocketFactory;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use config::Config;

/// How long to wait for the socket to close and the logout to go out
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Tether - connect a server to its relay
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server private key
    #[arg(long, env = "TETHER_PRIVATE_KEY", hide_env_values = true, global = true)]
    private_key: Option<String>,

    /// Server public key
    #[arg(long, env = "TETHER_PUBLIC_KEY", global = true)]
    public_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the assigned relay and stay connected until Ctrl+C
    Connect,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and print a summary
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        verbose,
        config,
        private_key,
        public_key,
        command,
    } = Cli::parse();
    let config_path = config.unwrap_or_else(Config::default_path);

    match command {
        Commands::Init { force } => {
            init_logging(verbose, "info");
            write_default_config(&config_path, force)
        }
        Commands::Connect => {
            let config = load_config(&config_path, private_key, public_key, verbose)?;
            connect(&config).await
        }
        Commands::Check => {
            let config = load_config(&config_path, private_key, public_key, verbose)?;
            show_summary(&config_path, &config);
            Ok(())
        }
    }
}

/// Load, apply key overrides, start logging and validate
fn load_config(
    path: &Path,
    private_key: Option<String>,
    public_key: Option<String>,
    verbose: bool,
) -> anyhow::Result<Config> {
    let mut config = if path.exists() {
        Config::load(path)?
    } else if path == Config::default_path() {
        Config::load_or_default()?
    } else {
        Config::load(path)? // Will fail with proper error
    };
    config.override_credentials(private_key, public_key);

    init_logging(verbose, &config.logging.level);
    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Connect and hold the session until Ctrl+C or until the relay drops it
async fn connect(config: &Config) -> anyhow::Result<()> {
    let handshake = HttpHandshakeClient::new(config.endpoints())?;
    let connector = Arc::new(
        SocketConnector::builder()
            .config(config.connector_config())
            .keys(config.key_set()?)
            .handshake(Arc::new(handshake))
            .sockets(Arc::new(WsSocketFactory::new()))
            .build()?,
    );

    let (tx, mut rx) = watch::channel(connector.state_service().current_state());
    connector.state_service().add_listener(move |_, new| {
        tx.send_replace(new.clone());
    });

    println!("Tether {}", env!("CARGO_PKG_VERSION"));
    println!("Backend: {}", config.relay.login_url);
    println!("Press Ctrl+C to stop");

    Arc::clone(&connector).spawn_setup();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                changed?;
                let state = rx.borrow_and_update().clone();
                println!("State: {}", state);
                if let ConnectionState::Idle(reason) = state {
                    anyhow::bail!("Relay session ended: {}", reason);
                }
            }
        }
    }

    println!("\nShutting down...");
    connector.disconnect();
    let closed = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = rx.wait_for(|state| !state.is_connected()).await;
        // logout runs on its own task
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await;
    if closed.is_err() {
        tracing::warn!("Relay socket did not close in time");
    }

    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Configuration written to: {}", path.display());
    println!("Set the server key pair under [credentials] or via TETHER_PRIVATE_KEY / TETHER_PUBLIC_KEY");
    Ok(())
}

fn show_summary(path: &Path, config: &Config) {
    println!("Tether Configuration");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("File: {}", path.display());
    println!();

    println!("Relay:");
    println!("  Login: {}", config.relay.login_url);
    println!("  Logout: {}", config.relay.logout_url);
    println!("  Handshake timeout: {}s", config.relay.handshake_timeout_secs);
    println!("  Socket timeout: {}s", config.relay.socket_timeout_secs);
    println!("  Request timeout: {}s", config.relay.request_timeout_secs);
    println!();

    println!("Credentials:");
    println!("  Private key: <redacted>");
    println!("  Public key: {}", config.credentials.public_key);
    println!();

    println!("Logging: {}", config.logging.level);
    println!("Configuration OK");
}
