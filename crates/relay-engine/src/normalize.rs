//! Message → plain text normalization.
//!
//! Relayed messages lose their rich structure: embeds become bolded prose,
//! attachments become one-line references, and server invite links are
//! removed so the destination doesn't inherit the source's advertising.
//! The result is split into transport-sized chunks.

use std::sync::LazyLock;

use regex::Regex;

use relay_core::types::{Embed, InboundMessage, OutboundChunk};

/// Invite link, bare or as a URL, plus an optional `| annotation` up to end of line.
static INVITE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.)?discord\.gg/\S+(?:[ \t]*\|[^\n]*)?")
        .expect("invite link pattern is valid")
});

static INVITE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)discord\.gg/").expect("invite marker pattern is valid"));

/// Any whitespace run spanning two or more line breaks.
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n\s*\n\s*").expect("blank line pattern is valid"));

const PARAGRAPH_SEP: &str = "\n\n";

/// Remove invite links, squeeze blank-line runs to a single blank line and trim.
///
/// Idempotent: `strip(strip(x)) == strip(x)`.
pub fn strip_platform_artifacts(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let without_invites = INVITE_LINK.replace_all(text, "");
    let squeezed = BLANK_LINES.replace_all(&without_invites, PARAGRAPH_SEP);
    squeezed.trim().to_string()
}

/// True when `text` carries an invite link anywhere.
pub fn contains_invite(text: &str) -> bool {
    INVITE_MARKER.is_match(text)
}

/// Render an embed as paragraphs of plain text.
///
/// Fields whose value is empty after cleaning are dropped together with their
/// name; footers that advertise an invite are dropped entirely.
pub fn render_embed(embed: &Embed) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = embed.title.as_deref().filter(|t| !t.trim().is_empty()) {
        parts.push(format!("**{title}**"));
    }

    if let Some(description) = embed.description.as_deref() {
        let clean = strip_platform_artifacts(description);
        if !clean.is_empty() {
            parts.push(clean);
        }
    }

    for field in &embed.fields {
        let value = strip_platform_artifacts(&field.value);
        if !value.is_empty() {
            parts.push(format!("**{}**\n{}", field.name, value));
        }
    }

    if let Some(footer) = embed.footer.as_deref() {
        if !footer.trim().is_empty() && !contains_invite(footer) {
            parts.push(format!("*{footer}*"));
        }
    }

    parts.join(PARAGRAPH_SEP)
}

/// Build the relayed text for `msg` and split it into chunks of at most
/// `limit` characters.
///
/// Returns an empty `Vec` when there is nothing worth sending.
pub fn compose_message(msg: &InboundMessage, limit: usize) -> Vec<OutboundChunk> {
    let candidate = compose_text(msg);
    if candidate.trim().is_empty() {
        return Vec::new();
    }

    split_chunks(&candidate, limit)
        .into_iter()
        .enumerate()
        .map(|(i, text)| OutboundChunk {
            text,
            continuation: i > 0,
        })
        .collect()
}

/// The full relayed text before chunking.
pub fn compose_text(msg: &InboundMessage) -> String {
    let header = format!("**{}:**", msg.author.display_name);
    let mut parts: Vec<String> = Vec::new();

    if !msg.content.is_empty() {
        let body = strip_platform_artifacts(&msg.content);
        if body.is_empty() {
            // Message was nothing but invite links; keep the attribution.
            parts.push(header.clone());
        } else {
            parts.push(format!("{header} {body}"));
        }
    }

    if !msg.embeds.is_empty() {
        if parts.is_empty() {
            parts.push(header);
        }
        for embed in &msg.embeds {
            let rendered = render_embed(embed);
            if !rendered.trim().is_empty() {
                parts.push(rendered);
            }
        }
    }

    for attachment in &msg.attachments {
        if attachment.is_image() {
            parts.push(format!("\u{1f4f7} **Image:** {}", attachment.filename));
        } else {
            parts.push(format!("\u{1f4ce} **File:** {}", attachment.filename));
        }
    }

    parts.join(PARAGRAPH_SEP)
}

/// Split `text` into consecutive pieces of at most `limit` characters.
///
/// Cuts fall on character boundaries only, so concatenating the pieces gives
/// back `text` exactly.
pub fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut taken = 0;
    for (idx, _) in text.char_indices() {
        if taken == limit {
            chunks.push(text[start..idx].to_string());
            start = idx;
            taken = 0;
        }
        taken += 1;
    }
    if start < text.len() {
        chunks.push(text[start..].to_string());
    }
    chunks
}
