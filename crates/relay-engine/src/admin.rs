//! Administrative text commands (`!addpair`, `!listfilters`, ...).
//!
//! Parsing and execution are platform-neutral; the Discord adapter decides
//! whether a message is a command, checks the caller's permissions, gathers
//! the session facts in [`CommandEnv`] and posts the reply.

use std::fmt::Write as _;
use std::time::Duration;

use relay_core::error::RelayError;
use relay_core::types::{Author, ChannelId};

use crate::relay::Relay;

const ADDPAIR_USAGE: &str = "\u{274c} **Usage:** `{cmd} #source_channel #destination_channel [pair_name]`\n\
Or use channel IDs: `{cmd} 123456789 987654321 My Pair`";
const REMOVEPAIR_USAGE: &str = "\u{274c} **Usage:** `{cmd} #source_channel #destination_channel`\n\
Or use channel IDs: `{cmd} 123456789 987654321`";
const ADDFILTER_USAGE: &str = "\u{274c} **Usage:** `{cmd} <word or phrase>`\n\
Example: `{cmd} spam` or `{cmd} bad word`\n\
\u{2139}\u{fe0f} Messages containing these words will be **blocked** from forwarding.";
const REMOVEFILTER_USAGE: &str = "\u{274c} **Usage:** `{cmd} <word or phrase>`\n\
Example: `{cmd} hello world`";

pub const TEST_MESSAGE: &str = "\u{1f9ea} This is a test message from the forwarding bot!";

/// Channels shown by `debug` before the listing is cut short.
const CHANNEL_LISTING_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    AddPair {
        source: ChannelId,
        destination: ChannelId,
        name: Option<String>,
    },
    RemovePair {
        source: ChannelId,
        destination: ChannelId,
    },
    ListPairs,
    AddFilter(String),
    RemoveFilter(String),
    ListFilters,
    ClearFilters,
    Status,
    Ping,
    /// `debug`: text channels of the current guild with their ids.
    ListChannels,
    /// `test`: push a synthetic message to every destination.
    TestRelay,
}

impl AdminCommand {
    /// Everything except the filter listing and the liveness check exposes
    /// or changes relay configuration.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, AdminCommand::ListFilters | AdminCommand::Ping)
    }
}

/// A text channel visible in the guild a command was issued from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildChannel {
    pub id: ChannelId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSnapshot {
    pub name: String,
    /// Text channels in display order.
    pub text_channels: Vec<GuildChannel>,
}

/// Session facts some commands report, collected by the chat adapter.
#[derive(Debug, Clone, Default)]
pub struct CommandEnv {
    /// Who issued the command; the author of `test` messages.
    pub invoker: Option<Author>,
    /// Gateway heartbeat latency, once measured.
    pub latency: Option<Duration>,
    /// `None` outside a guild (DMs).
    pub guild: Option<GuildSnapshot>,
}

/// A recognised command that could not be parsed. Displays as the reply text.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),

    #[error("\u{274c} **Invalid channel:** {source}\n{usage}")]
    BadChannel { source: RelayError, usage: String },
}

/// Parse `<#123>` mentions or bare numeric ids.
pub fn parse_channel_ref(input: &str) -> Result<ChannelId, RelayError> {
    let raw = input
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(input);
    match raw.parse::<u64>() {
        Ok(id) if id != 0 => Ok(ChannelId(id)),
        _ => Err(RelayError::MalformedChannelReference(format!("`{input}`"))),
    }
}

/// Parse a message as a command.
///
/// Returns `None` when the text does not start with `prefix` or names an
/// unknown command, so ordinary chatter is left alone.
pub fn parse(content: &str, prefix: &str) -> Option<Result<AdminCommand, CommandError>> {
    let rest = content.trim().strip_prefix(prefix)?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let name = name.to_lowercase();

    // Usage text quotes the command the way it was typed.
    let usage = |template: &str| template.replace("{cmd}", &format!("{prefix}{name}"));

    let cmd = match name.as_str() {
        "addpair" | "quicksetup" => parse_pair_args(args, &usage(ADDPAIR_USAGE)).map(
            |(source, destination, name)| AdminCommand::AddPair {
                source,
                destination,
                name,
            },
        ),
        "removepair" => parse_pair_args(args, &usage(REMOVEPAIR_USAGE))
            .map(|(source, destination, _)| AdminCommand::RemovePair {
                source,
                destination,
            }),
        "listpairs" => Ok(AdminCommand::ListPairs),
        "addfilter" if args.is_empty() => Err(CommandError::Usage(usage(ADDFILTER_USAGE))),
        "addfilter" => Ok(AdminCommand::AddFilter(args.to_string())),
        "removefilter" if args.is_empty() => {
            Err(CommandError::Usage(usage(REMOVEFILTER_USAGE)))
        }
        "removefilter" => Ok(AdminCommand::RemoveFilter(args.to_string())),
        "listfilters" => Ok(AdminCommand::ListFilters),
        "clearfilters" => Ok(AdminCommand::ClearFilters),
        "status" => Ok(AdminCommand::Status),
        "ping" | "check" => Ok(AdminCommand::Ping),
        "debug" => Ok(AdminCommand::ListChannels),
        "test" => Ok(AdminCommand::TestRelay),
        _ => return None,
    };
    Some(cmd)
}

/// Split off the first whitespace-delimited token.
fn next_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    s.split_at(end)
}

/// `<source> <destination> [name...]`
fn parse_pair_args(
    args: &str,
    usage: &str,
) -> Result<(ChannelId, ChannelId, Option<String>), CommandError> {
    let (src, rest) = next_token(args);
    let (dst, rest) = next_token(rest);
    if src.is_empty() || dst.is_empty() {
        return Err(CommandError::Usage(usage.to_string()));
    }
    let name = Some(rest.trim())
        .filter(|s| !s.is_empty())
        .map(String::from);

    let bad = |source| CommandError::BadChannel {
        source,
        usage: usage.to_string(),
    };
    let source = parse_channel_ref(src).map_err(bad)?;
    let destination = parse_channel_ref(dst).map_err(bad)?;
    Ok((source, destination, name))
}

/// Run a parsed command and produce the reply text.
pub async fn execute(relay: &Relay, cmd: &AdminCommand, env: &CommandEnv) -> String {
    match cmd {
        AdminCommand::AddPair {
            source,
            destination,
            name,
        } => match relay
            .routing()
            .add_pair(*source, *destination, name.as_deref())
        {
            Ok(pair) => format!(
                "\u{2705} **Channel pair added successfully!**\n\
                 **Name:** {}\n**Source:** {}\n**Destination:** {}",
                pair.name,
                pair.source.mention(),
                pair.destination.mention()
            ),
            Err(e) => declined(&e),
        },
        AdminCommand::RemovePair {
            source,
            destination,
        } => match relay.routing().remove_pair(*source, *destination) {
            Ok(pair) => format!(
                "\u{2705} **Channel pair removed successfully!**\nRemoved channel pair: {}",
                pair.name
            ),
            Err(e) => declined(&e),
        },
        AdminCommand::ListPairs => list_pairs(relay),
        AdminCommand::AddFilter(phrase) => match relay.filters().add_filter(phrase) {
            Ok(total) => format!(
                "\u{2705} Added blocked word: '{phrase}'\n\
                 \u{1f6ab} Messages containing this word will now be filtered out.\n\
                 Total blocked words: {total}"
            ),
            Err(e) => declined(&e),
        },
        AdminCommand::RemoveFilter(phrase) => match relay.filters().remove_filter(phrase) {
            Ok(remaining) => format!(
                "\u{2705} Removed blocked word: '{phrase}'\n\
                 \u{2709}\u{fe0f} Messages with this word will now be forwarded again.\n\
                 Remaining blocked words: {remaining}"
            ),
            Err(e) => declined(&e),
        },
        AdminCommand::ListFilters => list_filters(relay),
        AdminCommand::ClearFilters => match relay.filters().clear_all() {
            Ok(0) => "\u{1f4cb} No blocked words to clear.".to_string(),
            Ok(n) => format!(
                "\u{2705} Cleared all {n} filter(s).\n\
                 \u{26a0}\u{fe0f} **Warning:** All messages will now be forwarded until you add new filters."
            ),
            Err(e) => declined(&e),
        },
        AdminCommand::Status => status(relay),
        AdminCommand::Ping => ping_reply(env.latency),
        AdminCommand::ListChannels => match &env.guild {
            Some(guild) => channel_listing(relay, guild),
            None => "\u{274c} This command must be used in a server!".to_string(),
        },
        AdminCommand::TestRelay => {
            let author = env
                .invoker
                .clone()
                .unwrap_or_else(|| Author::user(0, "Relay"));
            match relay.send_test(author, TEST_MESSAGE).await {
                Ok(deliveries) => {
                    let failed: Vec<_> = deliveries.iter().filter(|d| !d.is_ok()).collect();
                    if failed.is_empty() {
                        format!(
                            "\u{2705} Test message sent to {} destination channel(s)!",
                            deliveries.len()
                        )
                    } else {
                        let mut out = format!(
                            "\u{26a0}\u{fe0f} Test message reached {} of {} destination channel(s).",
                            deliveries.len() - failed.len(),
                            deliveries.len()
                        );
                        for d in failed {
                            let error = d.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
                            let _ = write!(out, "\n\u{274c} {}: {}", d.destination.mention(), error);
                        }
                        out
                    }
                }
                Err(RelayError::ConfigurationMissing) => {
                    "\u{274c} Destination channel not configured!".to_string()
                }
                Err(e) => declined(&e),
            }
        }
    }
}

/// Liveness reply, with the gateway latency when known.
pub fn ping_reply(latency: Option<Duration>) -> String {
    let ping = match latency {
        Some(d) => format!("{}ms", d.as_millis()),
        None => "unknown".to_string(),
    };
    format!(
        "\u{2705} **Bot is Online!**\n\u{1f4e1} **Ping:** `{ping}`\n\u{1f552} **Status:** Active and Monitoring"
    )
}

/// `debug` reply: the guild's text channels, then whether each configured
/// source channel lives in this guild.
fn channel_listing(relay: &Relay, guild: &GuildSnapshot) -> String {
    let mut out = format!("**\u{1f50d} Available channels in {}:**\n", guild.name);
    for channel in guild.text_channels.iter().take(CHANNEL_LISTING_LIMIT) {
        let _ = writeln!(out, "#{} - ID: `{}`", channel.name, channel.id);
    }
    if guild.text_channels.len() > CHANNEL_LISTING_LIMIT {
        let _ = writeln!(
            out,
            "\n... and {} more channels",
            guild.text_channels.len() - CHANNEL_LISTING_LIMIT
        );
    }

    let mut sources: Vec<ChannelId> = Vec::new();
    for pair in relay.routing().list_all() {
        if !sources.contains(&pair.source) {
            sources.push(pair.source);
        }
    }
    if sources.is_empty() {
        out.push_str("\n**Configured source channels:** none");
        return out;
    }
    out.push_str("\n**Configured source channels:**");
    for source in sources {
        let found = guild.text_channels.iter().any(|c| c.id == source);
        let mark = if found {
            "\u{2705} (Found in this server)"
        } else {
            "\u{274c} (Not found in this server)"
        };
        let _ = write!(out, "\n`{source}` {mark}");
    }
    out
}

fn declined(e: &RelayError) -> String {
    match e {
        RelayError::AlreadyExists(msg) => format!("\u{26a0}\u{fe0f} {msg}"),
        RelayError::NotFound(msg) => format!("\u{274c} {msg}"),
        other => format!("\u{274c} **Error:** {other}"),
    }
}

fn list_pairs(relay: &Relay) -> String {
    let pairs = relay.routing().list_all();
    if pairs.is_empty() {
        return "\u{1f4dd} **No channel pairs configured yet!**\n\n\
                Use `addpair #source #destination [name]` to create one."
            .to_string();
    }

    // Group by source, keeping first-seen source order.
    let mut sources: Vec<ChannelId> = Vec::new();
    for pair in &pairs {
        if !sources.contains(&pair.source) {
            sources.push(pair.source);
        }
    }

    let mut out = format!("\u{1f4cb} **Channel Pairs ({})**\n", pairs.len());
    for source in sources {
        let _ = write!(out, "\n\u{1f4e4} **Source:** {}\n", source.mention());
        for pair in pairs.iter().filter(|p| p.source == source) {
            let _ = writeln!(
                out,
                "  \u{27a1}\u{fe0f} {} ({})",
                pair.destination.mention(),
                pair.name
            );
        }
    }
    out.trim_end().to_string()
}

fn list_filters(relay: &Relay) -> String {
    let filters = relay.filters().list();
    if filters.is_empty() {
        return "\u{1f4cb} **No blocked words configured**\n\
                All messages will be forwarded."
            .to_string();
    }
    let mut out = format!("\u{1f4cb} **Blocked Words/Phrases ({})**\n", filters.len());
    for (i, phrase) in filters.iter().enumerate() {
        let _ = writeln!(out, "{}. \u{1f6ab} '{}'", i + 1, phrase);
    }
    out.push_str("*Messages containing these words/phrases will be BLOCKED from forwarding*");
    out
}

fn status(relay: &Relay) -> String {
    let pairs = relay.routing().list_all();
    let mut sources: Vec<ChannelId> = pairs.iter().map(|p| p.source).collect();
    sources.sort_unstable();
    sources.dedup();
    let filters = relay.filters().list().len();

    let routing = if pairs.is_empty() {
        "\u{26a0}\u{fe0f} no channel pairs configured".to_string()
    } else {
        format!("{} pair(s) across {} source channel(s)", pairs.len(), sources.len())
    };
    let filtering = if filters == 0 {
        "none (all messages forwarded)".to_string()
    } else {
        format!("{filters} blocked phrase(s)")
    };

    format!(
        "\u{1f4ca} **Relay Status**\n\
         **Routing:** {routing}\n\
         **Filters:** {filtering}\n\
         **Recently processed:** {} message(s)\n\
         **Storage:** {}",
        relay.dedup_len(),
        relay.store_name()
    )
}
