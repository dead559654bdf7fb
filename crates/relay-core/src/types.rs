use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform channel identifier (Discord snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl ChannelId {
    pub fn get(self) -> u64 {
        self.0
    }

    /// Discord mention syntax, rendered by clients as `#channel-name`.
    pub fn mention(self) -> String {
        format!("<#{}>", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Platform-assigned message identifier, unique per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Platform account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A single source → destination routing entry.
///
/// Identity is `(source, destination)`; the name is display-only.
/// Serialises to the historical `channel_pairs.json` record shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPair {
    pub source: ChannelId,
    pub destination: ChannelId,
    pub name: String,
}

impl ChannelPair {
    pub fn new(source: ChannelId, destination: ChannelId, name: impl Into<String>) -> Self {
        Self {
            source,
            destination,
            name: name.into(),
        }
    }

    pub fn matches(&self, source: ChannelId, destination: ChannelId) -> bool {
        self.source == source && self.destination == destination
    }
}

/// Who sent an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    /// Guild nickname, falling back to the global display name.
    pub display_name: String,
    /// Automated account (bot user or webhook).
    pub is_bot: bool,
    /// Message was posted through a webhook.
    pub is_webhook: bool,
}

impl Author {
    /// A regular human account.
    pub fn user(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            display_name: display_name.into(),
            is_bot: false,
            is_webhook: false,
        }
    }

    pub fn bot(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            is_bot: true,
            ..Self::user(id, display_name)
        }
    }

    pub fn webhook(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            is_bot: true,
            is_webhook: true,
            ..Self::user(id, display_name)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

/// The text-bearing parts of a rich embed. Colours, images and author blocks
/// are not relayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// A message event as seen by the relay, detached from the gateway client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: Author,
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    /// A plain text message with no embeds or attachments.
    pub fn text(
        id: u64,
        channel_id: ChannelId,
        author: Author,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(id),
            channel_id,
            author,
            content: content.into(),
            embeds: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

/// Prefix put in front of every chunk after the first.
pub const CONTINUATION_PREFIX: &str = "...continued:\n";

/// One transport-sized piece of a relayed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundChunk {
    /// Payload, at most the configured chunk limit in characters.
    pub text: String,
    /// Set on every chunk after the first.
    pub continuation: bool,
}

impl OutboundChunk {
    /// Text as it goes over the wire, with the continuation prefix applied.
    pub fn wire_text(&self) -> String {
        if self.continuation {
            format!("{CONTINUATION_PREFIX}{}", self.text)
        } else {
            self.text.clone()
        }
    }
}
