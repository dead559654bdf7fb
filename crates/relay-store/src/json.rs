//! JSON file backend using the historical on-disk layout.
//!
//! ```text
//! <dir>/channel_pairs.json   [{"source": 1, "destination": 2, "name": "Pair 1"}]
//! <dir>/filter_words.json    ["spam", "buy now"]
//! ```
//!
//! Files are pretty-printed with a two-space indent and replaced atomically
//! (write to a temp file, then rename).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use relay_core::types::ChannelPair;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::error::{Result, StoreError};
use crate::store::RelayStore;

pub const PAIRS_FILE: &str = "channel_pairs.json";
pub const FILTERS_FILE: &str = "filter_words.json";

pub struct JsonFileStore {
    dir: PathBuf,
    /// Serialises writers so two saves never interleave their temp files.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Use `dir` as the data directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `Ok(None)` when the file does not exist.
    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.dir.join(file);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn write<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!(".{file}.tmp"));
        fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl RelayStore for JsonFileStore {
    fn name(&self) -> &str {
        "json"
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    fn load_pairs(&self) -> Result<Option<Vec<ChannelPair>>> {
        self.read(PAIRS_FILE)
    }

    #[instrument(skip(self, pairs), fields(count = pairs.len()))]
    fn save_pairs(&self, pairs: &[ChannelPair]) -> Result<()> {
        self.write(PAIRS_FILE, pairs)
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    fn load_filters(&self) -> Result<Vec<String>> {
        match self.read(FILTERS_FILE) {
            Ok(filters) => Ok(filters.unwrap_or_default()),
            Err(StoreError::Corrupt(e)) => {
                warn!(error = %e, "filter file is corrupt, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, filters), fields(count = filters.len()))]
    fn save_filters(&self, filters: &[String]) -> Result<()> {
        self.write(FILTERS_FILE, filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::types::ChannelId;

    #[test]
    fn missing_files_read_as_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(store.load_pairs().unwrap().is_none());
        assert!(store.load_filters().unwrap().is_empty());
    }

    #[test]
    fn reads_files_written_by_older_deployments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PAIRS_FILE),
            r#"[
  {
    "source": 1413198472307277874,
    "destination": 42,
    "name": "News"
  }
]"#,
        )
        .unwrap();
        fs::write(dir.path().join(FILTERS_FILE), r#"["spam", "Buy Now"]"#).unwrap();

        let store = JsonFileStore::open(dir.path()).unwrap();
        let pairs = store.load_pairs().unwrap().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].source, ChannelId(1_413_198_472_307_277_874));
        assert_eq!(pairs[0].name, "News");
        assert_eq!(store.load_filters().unwrap(), vec!["spam", "Buy Now"]);
    }

    #[test]
    fn writes_pretty_json_with_two_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store
            .save_pairs(&[ChannelPair::new(ChannelId(1), ChannelId(2), "Pair 1")])
            .unwrap();

        let raw = fs::read_to_string(dir.path().join(PAIRS_FILE)).unwrap();
        assert!(raw.contains("\n    \"source\": 1,"));
        assert!(!dir.path().join(format!(".{PAIRS_FILE}.tmp")).exists());
    }

    #[test]
    fn corrupt_pair_file_is_an_error_for_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PAIRS_FILE), "{not json").unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(matches!(store.load_pairs(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn corrupt_filter_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FILTERS_FILE), "[1, 2").unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(store.load_filters().unwrap().is_empty());
    }
}
