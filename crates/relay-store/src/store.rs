use relay_core::types::ChannelPair;

use crate::error::Result;

/// Durable home of the routing table and the filter set.
///
/// Both collections are read and written whole: callers load the full set,
/// mutate it in memory and save it back. There are no partial updates.
///
/// Implementations must be `Send + Sync`; the relay shares one store across
/// every concurrently handled gateway event.
pub trait RelayStore: Send + Sync {
    /// Short backend name for logs (e.g. `"sqlite"`).
    fn name(&self) -> &str;

    /// Load every channel pair in table order.
    ///
    /// `Ok(None)` means pairs were never configured, which lets the routing
    /// table fall back to the legacy single pair. An explicitly emptied table
    /// is `Ok(Some(vec![]))`.
    fn load_pairs(&self) -> Result<Option<Vec<ChannelPair>>>;

    /// Replace the stored pairs with `pairs`.
    fn save_pairs(&self, pairs: &[ChannelPair]) -> Result<()>;

    /// Load the blocked phrases in insertion order. Never configured reads as empty.
    fn load_filters(&self) -> Result<Vec<String>>;

    /// Replace the stored phrases with `filters`.
    fn save_filters(&self, filters: &[String]) -> Result<()>;
}
