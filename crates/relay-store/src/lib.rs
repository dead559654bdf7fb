pub mod db;
pub mod error;
pub mod json;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::RelayStore;
