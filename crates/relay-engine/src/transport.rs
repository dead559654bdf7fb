use async_trait::async_trait;

use relay_core::error::TransportError;
use relay_core::types::ChannelId;

/// The outbound send capability of the chat platform.
///
/// `&self` so one transport can serve concurrent sends to different
/// destinations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post `text` as a new message in `channel`.
    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), TransportError>;
}
