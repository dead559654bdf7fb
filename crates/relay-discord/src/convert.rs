//! serenity model → relay model.

use serenity::model::channel::{Attachment as DiscordAttachment, Embed as DiscordEmbed, Message};

use relay_core::types::{
    Attachment, Author, ChannelId, Embed, EmbedField, InboundMessage, MessageId, UserId,
};

/// Detach a gateway message from serenity's types.
pub fn inbound_from(msg: &Message) -> InboundMessage {
    let nick = msg.member.as_ref().and_then(|m| m.nick.as_deref());
    InboundMessage {
        id: MessageId(msg.id.get()),
        channel_id: ChannelId(msg.channel_id.get()),
        author: Author {
            id: UserId(msg.author.id.get()),
            display_name: display_name(nick, msg.author.display_name()),
            is_bot: msg.author.bot,
            is_webhook: msg.webhook_id.is_some(),
        },
        content: msg.content.clone(),
        embeds: msg.embeds.iter().map(embed_from).collect(),
        attachments: msg.attachments.iter().map(attachment_from).collect(),
    }
}

/// Guild nickname when set, otherwise the account's display name.
pub fn display_name(nick: Option<&str>, account: &str) -> String {
    nick.filter(|n| !n.trim().is_empty())
        .unwrap_or(account)
        .to_string()
}

pub fn embed_from(embed: &DiscordEmbed) -> Embed {
    Embed {
        title: embed.title.clone(),
        description: embed.description.clone(),
        fields: embed
            .fields
            .iter()
            .map(|f| EmbedField {
                name: f.name.clone(),
                value: f.value.clone(),
            })
            .collect(),
        footer: embed.footer.as_ref().map(|f| f.text.clone()),
    }
}

pub fn attachment_from(att: &DiscordAttachment) -> Attachment {
    Attachment {
        filename: att.filename.clone(),
        content_type: att.content_type.clone(),
    }
}
