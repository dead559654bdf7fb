use std::sync::Arc;
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tokio::sync::watch;
use tracing::{error, info, warn};

use relay_core::config::DiscordConfig;
use relay_engine::Relay;

use crate::error::DiscordError;
use crate::handler::{RelayHandler, ShardManagerContainer};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Discord side of the relay.
///
/// Wraps a serenity `Client` and drives the gateway until told to stop.
/// Reconnects whenever the gateway drops.
pub struct DiscordAdapter {
    relay: Arc<Relay>,
    config: DiscordConfig,
}

impl DiscordAdapter {
    pub fn new(config: &DiscordConfig, relay: Arc<Relay>) -> Result<Self, DiscordError> {
        if config.bot_token.trim().is_empty() {
            return Err(DiscordError::NoToken);
        }
        Ok(Self {
            relay,
            config: config.clone(),
        })
    }

    /// Gateway events the relay needs: guild messages with their content.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
    }

    /// Connect and keep reconnecting until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let Some(mut client) = self.connect(&mut shutdown).await else {
                return;
            };
            let shards = Arc::clone(&client.shard_manager);

            info!("Discord: gateway connecting");
            tokio::select! {
                result = client.start() => match result {
                    Err(e) => warn!("Discord: gateway error ({e}), reconnecting in 5s"),
                    Ok(()) => info!("Discord: gateway stopped cleanly, reconnecting in 5s"),
                },
                _ = stopped(&mut shutdown) => {
                    info!("Discord: shutting down gateway");
                    shards.shutdown_all().await;
                    return;
                }
            }

            if !pause(&mut shutdown, RECONNECT_DELAY).await {
                return;
            }
        }
    }

    /// Build a client, retrying until it succeeds. `None` once shutdown is requested.
    async fn connect(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Client> {
        loop {
            match self.build_client().await {
                Ok(client) => return Some(client),
                Err(e) => {
                    error!("Discord: connect failed ({e}), retrying in 30s");
                    if !pause(shutdown, CONNECT_RETRY_DELAY).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn build_client(&self) -> Result<Client, DiscordError> {
        let handler = RelayHandler::new(Arc::clone(&self.relay), self.config.clone());
        let client = Client::builder(&self.config.bot_token, Self::intents())
            .event_handler(handler)
            .await?;
        client
            .data
            .write()
            .await
            .insert::<ShardManagerContainer>(Arc::clone(&client.shard_manager));
        Ok(client)
    }
}

/// Resolves once shutdown is requested (or the sender is gone).
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `delay`. Returns `false` if shutdown was requested meanwhile.
async fn pause(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    let slept = tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = stopped(shutdown) => false,
    };
    slept && !*shutdown.borrow()
}
