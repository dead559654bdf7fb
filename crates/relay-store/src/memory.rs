use std::sync::Mutex;

use relay_core::types::ChannelPair;

use crate::error::{Result, StoreError};
use crate::store::RelayStore;

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    pairs: Mutex<Option<Vec<ChannelPair>>>,
    filters: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, as if the pairs had been configured earlier.
    pub fn with_pairs(pairs: Vec<ChannelPair>) -> Self {
        Self {
            pairs: Mutex::new(Some(pairs)),
            filters: Mutex::new(Vec::new()),
        }
    }
}

impl RelayStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load_pairs(&self) -> Result<Option<Vec<ChannelPair>>> {
        Ok(self.pairs.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn save_pairs(&self, pairs: &[ChannelPair]) -> Result<()> {
        *self.pairs.lock().map_err(|_| StoreError::Poisoned)? = Some(pairs.to_vec());
        Ok(())
    }

    fn load_filters(&self) -> Result<Vec<String>> {
        Ok(self.filters.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn save_filters(&self, filters: &[String]) -> Result<()> {
        *self.filters.lock().map_err(|_| StoreError::Poisoned)? = filters.to_vec();
        Ok(())
    }
}
