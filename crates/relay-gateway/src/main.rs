use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use relay_core::config::RelayConfig;
use relay_discord::{DiscordAdapter, SerenityTransport};
use relay_engine::{Relay, SystemClock};

mod store;

#[derive(Parser)]
#[command(name = "relay-gateway", version, about = "Discord channel relay")]
struct Args {
    /// Config file (default ~/.relay/relay.toml).
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<String>,

    /// Validate config, print the routing table and exit without connecting.
    #[arg(long, default_value_t = false)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay_gateway=info,relay_engine=info,relay_discord=info,relay_store=info".into()
            }),
        )
        .init();

    let args = Args::parse();

    let config = load_config(args.config.as_deref(), args.check)?;

    let store = store::open(&config.storage)?;
    let transport = Arc::new(SerenityTransport::from_token(&config.discord.bot_token));
    let relay = Arc::new(Relay::new(
        store,
        transport,
        Arc::new(SystemClock),
        &config.relay,
    ));

    if args.check {
        print_routing(&relay, &config);
        return Ok(());
    }

    let adapter = DiscordAdapter::new(&config.discord, Arc::clone(&relay))?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let gateway = tokio::spawn(adapter.run(shutdown_rx));
    info!(
        prefix = %config.discord.command_prefix,
        store = relay.store_name(),
        "relay started"
    );

    shutdown_signal().await?;
    info!("shutdown requested");

    // Drain relays already in progress before the gateway goes away.
    relay.shutdown().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = gateway.await {
        warn!(error = %e, "gateway task ended abnormally");
    }
    info!("relay stopped");
    Ok(())
}

/// Load the config. A broken config falls back to defaults when serving,
/// but is an error under `--check`, whose job is to validate it.
fn load_config(path: Option<&str>, strict: bool) -> anyhow::Result<RelayConfig> {
    match RelayConfig::load(path) {
        Ok(config) => Ok(config),
        Err(e) if strict => Err(e.into()),
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            Ok(RelayConfig::default())
        }
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where signals exist.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// `--check` output: what would be relayed where.
fn print_routing(relay: &Relay, config: &RelayConfig) {
    let pairs = relay.routing().list_all();
    println!("storage: {} ({})", relay.store_name(), config.storage.path);
    println!(
        "bot token: {}",
        if config.discord.bot_token.trim().is_empty() {
            "MISSING"
        } else {
            "set"
        }
    );
    if pairs.is_empty() {
        println!("channel pairs: none configured");
    } else {
        println!("channel pairs ({}):", pairs.len());
        for pair in &pairs {
            println!("  {} -> {}  [{}]", pair.source, pair.destination, pair.name);
        }
    }
    let filters = relay.filters().list();
    println!("blocked phrases: {}", filters.len());
    for phrase in &filters {
        println!("  '{phrase}'");
    }
}
