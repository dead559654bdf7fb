use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::{Http, HttpError};
use serenity::model::id::ChannelId as DiscordChannelId;

use relay_core::config::DEFAULT_CHUNK_LIMIT;
use relay_core::error::TransportError;
use relay_core::types::{ChannelId, CONTINUATION_PREFIX};
use relay_engine::normalize::split_chunks;
use relay_engine::Transport;

/// Posts relayed text through Discord's REST API.
///
/// Holds only `Arc<Http>`, which stays valid across gateway reconnects.
#[derive(Clone)]
pub struct SerenityTransport {
    http: Arc<Http>,
}

impl SerenityTransport {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// A REST client of its own, independent of any gateway session.
    pub fn from_token(token: &str) -> Self {
        Self::new(Arc::new(Http::new(token)))
    }
}

#[async_trait]
impl Transport for SerenityTransport {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), TransportError> {
        if channel.get() == 0 {
            return Err(TransportError::UnknownChannel(0));
        }
        DiscordChannelId::new(channel.get())
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(|e| classify(channel, &e))
    }
}

fn classify(channel: ChannelId, err: &serenity::Error) -> TransportError {
    let status = match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => {
            Some(resp.status_code.as_u16())
        }
        _ => None,
    };
    transport_error(channel, status, err.to_string())
}

/// 404 means the channel is gone or invisible to us; everything else is a
/// plain send failure.
fn transport_error(channel: ChannelId, status: Option<u16>, detail: String) -> TransportError {
    match status {
        Some(404) => TransportError::UnknownChannel(channel.get()),
        _ => TransportError::SendFailed(detail),
    }
}

/// Split a command reply into Discord-sized messages, marking every message
/// after the first as a continuation.
pub fn reply_chunks(text: &str) -> Vec<String> {
    split_chunks(text, DEFAULT_CHUNK_LIMIT)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i == 0 {
                chunk
            } else {
                format!("{CONTINUATION_PREFIX}{chunk}")
            }
        })
        .collect()
}

/// Send a command reply to `channel_id`, chunked.
pub async fn send_reply(
    http: &Http,
    channel_id: DiscordChannelId,
    text: &str,
) -> Result<(), serenity::Error> {
    for chunk in reply_chunks(text) {
        channel_id.say(http, &chunk).await?;
    }
    Ok(())
}
