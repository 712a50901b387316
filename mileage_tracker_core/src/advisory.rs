use crate::{storage::KeyValueStore, TrackerError, BATTERY_NOTICE_KEY};

/// True the first time it is called against a store, false afterwards.
/// The caller shows its background-location notice when this is true.
pub async fn take_battery_notice(store: &dyn KeyValueStore) -> Result<bool, TrackerError> {
    if store.get(BATTERY_NOTICE_KEY).await?.is_some() {
        return Ok(false);
    }

    store.set(BATTERY_NOTICE_KEY, "true").await?;
    tracing::debug!("Battery notice shown");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::{storage::MemoryStore, test_support::FailingStore};

    use super::*;

    #[tokio::test]
    async fn shown_once_per_store() {
        let store = MemoryStore::new();
        assert!(take_battery_notice(&store).await.unwrap());
        assert!(!take_battery_notice(&store).await.unwrap());
        assert!(!take_battery_notice(&store).await.unwrap());

        assert!(take_battery_notice(&MemoryStore::new()).await.unwrap());
    }

    #[tokio::test]
    async fn failed_write_is_reported() {
        let store = FailingStore::default();
        assert!(matches!(take_battery_notice(&store).await, Err(TrackerError::Storage(_))));
    }
}
