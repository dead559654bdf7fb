use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use relay_core::error::{RelayError, Result};
use relay_core::types::{ChannelId, ChannelPair};
use relay_store::RelayStore;

/// Source → destination routing entries, read from the store on every query.
///
/// No copy of the table is cached: an admin edit is visible to the very next
/// inbound message. Mutations hold `lock` across load → modify → save.
pub struct RoutingTable {
    store: Arc<dyn RelayStore>,
    /// Synthesized when the store has never had pairs written.
    legacy: Option<ChannelPair>,
    lock: Mutex<()>,
}

impl RoutingTable {
    pub fn new(store: Arc<dyn RelayStore>, legacy: Option<ChannelPair>) -> Self {
        Self {
            store,
            legacy,
            lock: Mutex::new(()),
        }
    }

    /// Every pair in table order.
    pub fn list_all(&self) -> Vec<ChannelPair> {
        match self.store.load_pairs() {
            Ok(Some(pairs)) => pairs,
            Ok(None) => self.legacy.iter().cloned().collect(),
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "channel pair load failed, using legacy config");
                self.legacy.iter().cloned().collect()
            }
        }
    }

    /// Destinations paired with `source`, in table order. Empty if `source`
    /// is not a configured source channel.
    pub fn destinations_for(&self, source: ChannelId) -> Vec<ChannelId> {
        self.list_all()
            .into_iter()
            .filter(|p| p.source == source)
            .map(|p| p.destination)
            .collect()
    }

    /// Add a pair. A missing or blank name becomes `Pair N` (N = count + 1).
    pub fn add_pair(
        &self,
        source: ChannelId,
        destination: ChannelId,
        name: Option<&str>,
    ) -> Result<ChannelPair> {
        let _guard = self.guard()?;
        let mut pairs = self.list_all();

        if pairs.iter().any(|p| p.matches(source, destination)) {
            return Err(RelayError::AlreadyExists(
                "This source-destination pair already exists".to_string(),
            ));
        }

        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => format!("Pair {}", pairs.len() + 1),
        };
        let pair = ChannelPair::new(source, destination, name);
        pairs.push(pair.clone());
        self.store.save_pairs(&pairs)?;

        info!(%source, %destination, name = %pair.name, "channel pair added");
        Ok(pair)
    }

    /// Remove the first pair matching `(source, destination)` and return it.
    pub fn remove_pair(&self, source: ChannelId, destination: ChannelId) -> Result<ChannelPair> {
        let _guard = self.guard()?;
        let mut pairs = self.list_all();

        let Some(index) = pairs.iter().position(|p| p.matches(source, destination)) else {
            return Err(RelayError::NotFound("Channel pair not found".to_string()));
        };
        let removed = pairs.remove(index);
        self.store.save_pairs(&pairs)?;

        info!(%source, %destination, name = %removed.name, "channel pair removed");
        Ok(removed)
    }

    /// Number of configured pairs, or `ConfigurationMissing` when there are none.
    pub fn check_configured(&self) -> Result<usize> {
        match self.list_all().len() {
            0 => Err(RelayError::ConfigurationMissing),
            n => Ok(n),
        }
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| RelayError::Storage("routing lock poisoned".to_string()))
    }
}
