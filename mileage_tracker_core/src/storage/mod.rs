use async_trait::async_trait;

use crate::TrackerError;

pub mod file_store;
pub mod memory_store;
pub mod session_store;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use session_store::{SessionStore, WriteReceipt};

/// String-valued durable storage, one value per key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, TrackerError>;

    /// Replaces any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), TrackerError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), TrackerError>;
}
