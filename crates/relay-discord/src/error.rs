/// Errors produced while bringing up the Discord side of the relay.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("discord client error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("no bot token configured (set discord.bot_token or RELAY_DISCORD__BOT_TOKEN)")]
    NoToken,
}
