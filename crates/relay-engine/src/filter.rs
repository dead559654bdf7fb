use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use relay_core::error::{RelayError, Result};
use relay_store::RelayStore;

/// Returns `true` when `text` may be forwarded under `filters`.
///
/// Fail-open: an empty filter set or an empty text always passes. Otherwise
/// the text is blocked if any phrase occurs in it, compared case-insensitively
/// and anywhere in the text (mid-word included).
pub fn should_forward(text: &str, filters: &[String]) -> bool {
    if filters.is_empty() || text.is_empty() {
        return true;
    }
    let haystack = text.to_lowercase();
    !filters
        .iter()
        .any(|phrase| haystack.contains(&phrase.to_lowercase()))
}

/// The persisted set of blocked phrases.
///
/// Every mutation is a load → modify → save sequence held under one lock, so
/// two concurrent admins can't both add the same phrase.
pub struct FilterEngine {
    store: Arc<dyn RelayStore>,
    lock: Mutex<()>,
}

impl FilterEngine {
    pub fn new(store: Arc<dyn RelayStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Current phrases in insertion order. Unreadable storage reads as empty.
    pub fn list(&self) -> Vec<String> {
        match self.store.load_filters() {
            Ok(filters) => filters,
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "filter load failed, forwarding unfiltered");
                Vec::new()
            }
        }
    }

    /// Load the current set and test `text` against it.
    pub fn allows(&self, text: &str) -> bool {
        should_forward(text, &self.list())
    }

    /// Add a phrase. Returns the new total.
    pub fn add_filter(&self, phrase: &str) -> Result<usize> {
        let _guard = self.guard()?;
        let mut filters = self.list();
        let needle = phrase.to_lowercase();
        if filters.iter().any(|f| f.to_lowercase() == needle) {
            return Err(RelayError::AlreadyExists(format!(
                "Filter '{phrase}' already exists"
            )));
        }
        filters.push(phrase.to_string());
        self.store.save_filters(&filters)?;
        info!(phrase, total = filters.len(), "filter added");
        Ok(filters.len())
    }

    /// Remove every entry equal to `phrase` ignoring case. Returns how many remain.
    pub fn remove_filter(&self, phrase: &str) -> Result<usize> {
        let _guard = self.guard()?;
        let mut filters = self.list();
        let before = filters.len();
        let needle = phrase.to_lowercase();
        filters.retain(|f| f.to_lowercase() != needle);
        if filters.len() == before {
            return Err(RelayError::NotFound(format!("Filter '{phrase}' not found")));
        }
        self.store.save_filters(&filters)?;
        info!(phrase, remaining = filters.len(), "filter removed");
        Ok(filters.len())
    }

    /// Drop every phrase. Returns how many were removed.
    pub fn clear_all(&self) -> Result<usize> {
        let _guard = self.guard()?;
        let removed = self.list().len();
        if removed > 0 {
            self.store.save_filters(&[])?;
            info!(removed, "filters cleared");
        }
        Ok(removed)
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| RelayError::Storage("filter lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;

    fn phrases(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn engine() -> FilterEngine {
        FilterEngine::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn empty_filter_set_passes_everything() {
        assert!(should_forward("anything at all", &[]));
    }

    #[test]
    fn empty_text_passes() {
        assert!(should_forward("", &phrases(&["spam"])));
    }

    #[test]
    fn blocks_case_insensitive_substring() {
        let filters = phrases(&["Buy Now"]);
        assert!(!should_forward("please BUY NOW!!", &filters));
        assert!(!should_forward("xbuy nowx", &filters));
        assert!(should_forward("buy later", &filters));
    }

    #[test]
    fn matches_mid_word() {
        assert!(!should_forward("scrapped", &phrases(&["crap"])));
    }

    #[test]
    fn any_phrase_blocks() {
        let filters = phrases(&["alpha", "beta"]);
        assert!(!should_forward("the beta test", &filters));
        assert!(should_forward("gamma", &filters));
    }

    #[test]
    fn add_rejects_case_insensitive_duplicate() {
        let engine = engine();
        assert_eq!(engine.add_filter("Spam").unwrap(), 1);
        let err = engine.add_filter("sPAM").unwrap_err();
        assert!(matches!(err, RelayError::AlreadyExists(_)));
        assert_eq!(engine.list(), vec!["Spam"]);
    }

    #[test]
    fn add_preserves_insertion_order() {
        let engine = engine();
        engine.add_filter("zeta").unwrap();
        engine.add_filter("alpha").unwrap();
        engine.add_filter("mid").unwrap();
        assert_eq!(engine.list(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn remove_is_case_insensitive() {
        let engine = engine();
        engine.add_filter("Spam").unwrap();
        engine.add_filter("eggs").unwrap();
        assert_eq!(engine.remove_filter("SPAM").unwrap(), 1);
        assert_eq!(engine.list(), vec!["eggs"]);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let engine = engine();
        let err = engine.remove_filter("ghost").unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[test]
    fn clear_reports_count() {
        let engine = engine();
        assert_eq!(engine.clear_all().unwrap(), 0);
        engine.add_filter("a").unwrap();
        engine.add_filter("b").unwrap();
        assert_eq!(engine.clear_all().unwrap(), 2);
        assert!(engine.list().is_empty());
        assert!(engine.allows("a b"));
    }
}
