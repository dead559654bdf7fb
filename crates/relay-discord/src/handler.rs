use std::sync::Arc;
use std::time::Duration;

use serenity::all::ActivityData;
use serenity::async_trait;
use serenity::gateway::ShardManager;
use serenity::model::channel::{ChannelType, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::model::user::OnlineStatus;
use serenity::prelude::{Context, EventHandler, TypeMapKey};
use tracing::{info, warn};

use relay_core::config::DiscordConfig;
use relay_core::error::RelayError;
use relay_core::types::{Author, ChannelId, UserId};
use relay_engine::admin::{self, AdminCommand, CommandEnv, CommandError, GuildSnapshot};
use relay_engine::Relay;

use crate::{convert, send};

/// Client data slot holding the shard manager, for latency lookups.
pub struct ShardManagerContainer;

impl TypeMapKey for ShardManagerContainer {
    type Value = Arc<ShardManager>;
}

const PERMISSION_DENIED: &str = "\u{274c} You don't have permission to use this command!";

/// Serenity event handler wired to the relay.
pub struct RelayHandler {
    relay: Arc<Relay>,
    config: DiscordConfig,
}

impl RelayHandler {
    pub fn new(relay: Arc<Relay>, config: DiscordConfig) -> Self {
        Self { relay, config }
    }

    async fn run_command(
        &self,
        ctx: &Context,
        msg: &Message,
        parsed: Result<AdminCommand, CommandError>,
        invoker: Author,
    ) {
        let reply = match parsed {
            Err(e) => e.to_string(),
            Ok(cmd) if cmd.requires_admin() && !is_admin(ctx, msg) => {
                warn!(user = %msg.author.name, command = ?cmd, "admin command refused");
                PERMISSION_DENIED.to_string()
            }
            Ok(cmd) => {
                info!(user = %msg.author.name, command = ?cmd, "running command");
                let env = CommandEnv {
                    invoker: Some(invoker),
                    latency: shard_latency(ctx).await,
                    guild: guild_snapshot(ctx, msg),
                };
                admin::execute(&self.relay, &cmd, &env).await
            }
        };

        if let Err(e) = send::send_reply(&ctx.http, msg.channel_id, &reply).await {
            warn!(error = %e, channel = %msg.channel_id, "command reply failed");
        }
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.relay.set_self_id(UserId(ready.user.id.get()));

        // Config-driven presence.
        let status = parse_online_status(&self.config.status);
        let activity = build_activity(&self.config);
        ctx.set_presence(activity, status);

        info!(name = %ready.user.name, guilds = ready.guilds.len(), "Discord bot connected");
        log_relay_summary(&self.relay, &self.config.command_prefix);
    }

    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        info!(guilds = guilds.len(), "guild cache ready");
        for channel in unseen_channels(&self.relay, |id| ctx.cache.channel(id.0).is_some()) {
            warn!(
                %channel,
                "channel in a pair is not visible to the bot; check its server membership and channel permissions"
            );
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Every message goes through the relay first; commands typed in a
        // source channel are relayed like any other text.
        let inbound = convert::inbound_from(&msg);
        self.relay.handle_tracked(&inbound).await;

        if msg.author.bot {
            return;
        }
        if let Some(parsed) = admin::parse(&msg.content, &self.config.command_prefix) {
            self.run_command(&ctx, &msg, parsed, inbound.author).await;
        }
    }
}

/// Administrator permission in the message's guild. Always false in DMs.
fn is_admin(ctx: &Context, msg: &Message) -> bool {
    msg.author_permissions(&ctx.cache)
        .is_some_and(|perms| perms.administrator())
}

/// Heartbeat latency of the shard that delivered the event, once measured.
async fn shard_latency(ctx: &Context) -> Option<Duration> {
    let data = ctx.data.read().await;
    let shards = data.get::<ShardManagerContainer>()?;
    let runners = shards.runners.lock().await;
    let latency = runners.get(&ctx.shard_id).and_then(|runner| runner.latency);
    latency
}

/// Cached text channels of the message's guild, in display order.
fn guild_snapshot(ctx: &Context, msg: &Message) -> Option<GuildSnapshot> {
    let guild = msg.guild(&ctx.cache)?;
    let mut channels: Vec<_> = guild
        .channels
        .values()
        .filter(|c| c.kind == ChannelType::Text)
        .collect();
    channels.sort_by_key(|c| (c.position, c.id));
    Some(GuildSnapshot {
        name: guild.name.clone(),
        text_channels: channels
            .into_iter()
            .map(|c| admin::GuildChannel {
                id: ChannelId(c.id.get()),
                name: c.name.clone(),
            })
            .collect(),
    })
}

/// Pair channels, sources first, for which `visible` is false.
fn unseen_channels(relay: &Relay, visible: impl Fn(ChannelId) -> bool) -> Vec<ChannelId> {
    let pairs = relay.routing().list_all();
    let mut unseen: Vec<ChannelId> = Vec::new();
    let channels = pairs
        .iter()
        .map(|p| p.source)
        .chain(pairs.iter().map(|p| p.destination));
    for channel in channels {
        if !unseen.contains(&channel) && !visible(channel) {
            unseen.push(channel);
        }
    }
    unseen
}

fn log_relay_summary(relay: &Relay, prefix: &str) {
    match relay.routing().check_configured() {
        Ok(pairs) => info!(pairs, store = relay.store_name(), "channel pairs loaded"),
        Err(RelayError::ConfigurationMissing) => warn!(
            store = relay.store_name(),
            "no channel pairs configured, use {prefix}addpair #source #destination"
        ),
        Err(e) => warn!(error = %e, "channel pairs unavailable"),
    }

    let filters = relay.filters().list();
    if filters.is_empty() {
        warn!("no message filters configured (all messages will be forwarded)");
    } else {
        info!(blocked = filters.len(), "message filters configured");
    }
}

/// Parse a config status string into serenity's `OnlineStatus`.
fn parse_online_status(s: &str) -> OnlineStatus {
    match s.to_lowercase().as_str() {
        "idle" => OnlineStatus::Idle,
        "dnd" | "do_not_disturb" => OnlineStatus::DoNotDisturb,
        "invisible" => OnlineStatus::Invisible,
        _ => OnlineStatus::Online,
    }
}

/// Build an `ActivityData` from the Discord config.
fn build_activity(config: &DiscordConfig) -> Option<ActivityData> {
    let name = config.activity_name.as_deref()?;
    let kind = config.activity_type.as_deref().unwrap_or("playing");
    Some(match kind.to_lowercase().as_str() {
        "listening" => ActivityData::listening(name),
        "watching" => ActivityData::watching(name),
        "competing" => ActivityData::competing(name),
        "custom" => ActivityData::custom(name),
        _ => ActivityData::playing(name),
    })
}
