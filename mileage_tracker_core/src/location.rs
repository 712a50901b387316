use std::{collections::HashMap, sync::atomic::{AtomicU64, Ordering}};

use async_trait::async_trait;
use mileage_tracker_lib::path_point::Fix;
use tokio::sync::{mpsc, Mutex};

use crate::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet, a request will ask the user.
    Prompt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub background_title: String,
    pub background_message: String,
    pub distance_filter_meters: f64,
    pub stale: bool,
    pub request_permissions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorCode {
    NotAuthorized,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Fix(Fix),
    Error(ProviderErrorCode),
}

/// Source of live location fixes. Events for a subscription are pushed,
/// one at a time, into the sink handed to `subscribe`.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn check_permission(&self) -> Result<PermissionState, TrackerError>;

    async fn request_permission(&self) -> Result<PermissionState, TrackerError>;

    async fn subscribe(&self, options: WatchOptions, sink: mpsc::UnboundedSender<LocationEvent>) -> Result<SubscriptionId, TrackerError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TrackerError>;
}

/**
 * SimulatedProvider stands in for a device location service. Events pushed
 * into it are delivered to every live subscription.
 */
#[derive(Debug)]
pub struct SimulatedProvider {
    permission: Mutex<PermissionState>,
    grant_on_request: bool,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<LocationEvent>>>,
}

impl SimulatedProvider {
    pub fn new(permission: PermissionState, grant_on_request: bool) -> Self {
        Self {
            permission: Mutex::new(permission),
            grant_on_request,
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted, true)
    }

    pub fn denied() -> Self {
        Self::new(PermissionState::Denied, false)
    }

    /// Returns how many subscriptions the event reached.
    pub async fn emit(&self, event: LocationEvent) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        // Receivers that went away without unsubscribing are pruned
        subscribers.retain(|_, sink| !sink.is_closed());
        subscribers.values().filter(|sink| sink.send(event.clone()).is_ok()).count()
    }

    pub async fn push_fix(&self, fix: Fix) -> usize {
        self.emit(LocationEvent::Fix(fix)).await
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[async_trait]
impl LocationProvider for SimulatedProvider {
    async fn check_permission(&self) -> Result<PermissionState, TrackerError> {
        Ok(*self.permission.lock().await)
    }

    async fn request_permission(&self) -> Result<PermissionState, TrackerError> {
        let mut permission = self.permission.lock().await;
        if *permission == PermissionState::Prompt {
            *permission = if self.grant_on_request { PermissionState::Granted } else { PermissionState::Denied };
        }
        Ok(*permission)
    }

    async fn subscribe(&self, options: WatchOptions, sink: mpsc::UnboundedSender<LocationEvent>) -> Result<SubscriptionId, TrackerError> {
        if *self.permission.lock().await != PermissionState::Granted {
            return Err(TrackerError::Provider("Not authorized".into()));
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!("Simulated watcher {:?} added (distance filter {} m)", id, options.distance_filter_meters);
        self.subscribers.lock().await.insert(id, sink);
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TrackerError> {
        match self.subscribers.lock().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TrackerError::Provider(format!("No watcher with id {}", id.0))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;

    #[tokio::test]
    async fn prompt_resolves_on_request() {
        let provider = SimulatedProvider::new(PermissionState::Prompt, true);
        assert_eq!(provider.check_permission().await.unwrap(), PermissionState::Prompt);
        assert_eq!(provider.request_permission().await.unwrap(), PermissionState::Granted);

        let provider = SimulatedProvider::new(PermissionState::Prompt, false);
        assert_eq!(provider.request_permission().await.unwrap(), PermissionState::Denied);
    }

    #[tokio::test]
    async fn events_reach_live_subscribers_only() {
        let provider = SimulatedProvider::granted();
        let options = TrackerConfig::default().watch_options();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let a = provider.subscribe(options.clone(), tx_a).await.unwrap();
        let b = provider.subscribe(options, tx_b).await.unwrap();
        assert_ne!(a, b);

        drop(rx_b);
        assert_eq!(provider.push_fix(Fix::new(1., 2., 3.)).await, 1);
        assert_eq!(rx_a.recv().await, Some(LocationEvent::Fix(Fix::new(1., 2., 3.))));
        assert_eq!(provider.active_subscriptions().await, 1);

        provider.unsubscribe(a).await.unwrap();
        assert!(provider.unsubscribe(a).await.is_err());
        assert_eq!(provider.push_fix(Fix::new(1., 2., 3.)).await, 0);
    }

    #[tokio::test]
    async fn denied_provider_refuses_watchers() {
        let provider = SimulatedProvider::denied();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(provider.subscribe(TrackerConfig::default().watch_options(), tx).await.is_err());
    }
}
