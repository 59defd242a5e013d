// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use livesync_gate::{
    api::router,
    auth::CredentialSigner,
    config::{Config, LogFormat, DEFAULT_LOG_FILTER},
    setup::{issue_setup_bundle, SetupOptions},
    state::AppState,
    storage::TokenStore,
    sweeper::TokenSweeper,
};

#[derive(Parser)]
#[command(
    name = "livesync-gate",
    version,
    about = "Per-device authentication gateway for a CouchDB sync backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Serve,
    /// Issue a device token and print an encrypted LiveSync setup URI.
    ///
    /// Opens the token database directly, so the server must not be running.
    /// Use `POST /admin/tokens/setup` against a live server instead.
    Setup(SetupArgs),
}

#[derive(Args)]
struct SetupArgs {
    /// Device label, also used as the vault/device name in the plugin
    device_name: String,

    /// Vault end-to-end encryption passphrase (generated if omitted)
    #[arg(long)]
    e2ee_passphrase: Option<String>,

    /// Passphrase protecting the setup URI itself (generated if omitted)
    #[arg(long)]
    uri_passphrase: Option<String>,

    /// Token lifetime in days (never expires if omitted)
    #[arg(long)]
    expires_in_days: Option<u32>,

    /// Disable vault end-to-end encryption
    #[arg(long)]
    no_encryption: bool,

    /// Keep file paths readable on the backend
    #[arg(long)]
    no_path_obfuscation: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Setup(args) => setup(config, args),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let tokens = TokenStore::open(&config.token_db_path).with_context(|| {
        format!(
            "failed to open token database {}",
            config.token_db_path.display()
        )
    })?;
    info!(path = %config.token_db_path.display(), "Token database opened");

    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN is not set; the admin API is disabled");
    }

    let shutdown = CancellationToken::new();
    if let Some(interval) = config.cleanup_interval {
        tokio::spawn(TokenSweeper::new(tokens.clone(), interval).run(shutdown.clone()));
    }

    let addr = config.bind_address();
    let backend = config.backend.url.to_string();
    let state = AppState::new(config, tokens).context("failed to build backend client")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, backend = %backend, "livesync-gate listening");

    tokio::spawn(watch_signals(shutdown.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;

    info!("livesync-gate stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

fn setup(config: Config, args: SetupArgs) -> anyhow::Result<()> {
    let tokens = TokenStore::open(&config.token_db_path).with_context(|| {
        format!(
            "failed to open token database {} (is the server running?)",
            config.token_db_path.display()
        )
    })?;
    let signer = CredentialSigner::new(config.jwt_secret.as_bytes());

    let options = SetupOptions {
        device_name: args.device_name,
        transport_passphrase: args.uri_passphrase,
        content_passphrase: args.e2ee_passphrase,
        expires_in_days: args.expires_in_days,
        encryption: !args.no_encryption,
        path_obfuscation: !args.no_path_obfuscation,
    };
    let bundle = issue_setup_bundle(&tokens, &signer, &config.setup, options)?;

    let expires = bundle
        .token
        .expires_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());

    println!("Device:          {}", bundle.token.device_name);
    println!("Token ID:        {}", bundle.token.token_id);
    println!("Created:         {}", bundle.token.created_at.to_rfc3339());
    println!("Expires:         {expires}");
    println!();
    match &bundle.e2ee_passphrase {
        Some(passphrase) => {
            println!("Vault encryption passphrase (same on every device of this vault):");
            println!("  {passphrase}");
        }
        None => println!("Vault encryption: disabled"),
    }
    println!();
    println!("Setup URI passphrase (share separately from the URI):");
    println!("  {}", bundle.uri_passphrase);
    println!();
    println!("Setup URI:");
    println!("{}", bundle.setup_uri);

    Ok(())
}
