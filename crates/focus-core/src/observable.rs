//! Observable values with change notifications.
//!
//! Drivers publish client-visible state (position, temperature, motion state) through
//! [`Observable<T>`]. Hosts call [`Observable::subscribe`] and await changes instead of
//! polling the driver.
//!
//! ```rust,ignore
//! let mut rx = driver.position_observable().subscribe();
//! while rx.changed().await.is_ok() {
//!     println!("position: {}", *rx.borrow());
//! }
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Descriptive metadata for an observable value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservableMetadata {
    /// Value name, unique within one driver.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Units (e.g., "ticks", "°C").
    pub units: Option<String>,
}

/// A thread-safe, observable value.
///
/// Uses `tokio::sync::watch` internally, so every subscriber sees the latest value and
/// no history is buffered. Clones share the same channel and metadata.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    metadata: Arc<RwLock<ObservableMetadata>>,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("metadata", &*self.metadata.read())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            metadata: Arc::new(RwLock::new(ObservableMetadata {
                name: name.into(),
                ..Default::default()
            })),
        }
    }

    /// Add a description to this observable.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.metadata.write().description = Some(description.into());
        self
    }

    /// Add units to this observable.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.metadata.write().units = Some(units.into());
        self
    }

    /// Get the current value (clone).
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Get the value name.
    pub fn name(&self) -> String {
        self.metadata.read().name.clone()
    }

    /// Get the metadata (returns a clone).
    pub fn metadata(&self) -> ObservableMetadata {
        self.metadata.read().clone()
    }

    /// Set a new value, notifying all subscribers.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Set a new value, notifying subscribers only if it differs from the current one.
    ///
    /// Returns whether the value changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observable_metadata() {
        let obs = Observable::new("position", 0i32)
            .with_description("Focuser position")
            .with_units("ticks");

        let meta = obs.metadata();
        assert_eq!(meta.name, "position");
        assert_eq!(meta.description.as_deref(), Some("Focuser position"));
        assert_eq!(meta.units.as_deref(), Some("ticks"));
        assert_eq!(obs.name(), "position");
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let obs = Observable::new("position", 0i32);
        let mut rx = obs.subscribe();
        assert_eq!(obs.subscriber_count(), 1);

        obs.set(42);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 42);
    }

    #[test]
    fn test_set_if_changed_only_notifies_on_change() {
        let obs = Observable::new("position", 10i32);
        let rx = obs.subscribe();

        assert!(!obs.set_if_changed(10));
        assert!(!rx.has_changed().unwrap());

        assert!(obs.set_if_changed(11));
        assert!(rx.has_changed().unwrap());
        assert_eq!(obs.get(), 11);
    }

    #[test]
    fn test_clones_share_channel() {
        let obs = Observable::new("temperature", None::<f64>);
        let clone = obs.clone();
        clone.set(Some(21.0));
        assert_eq!(obs.get(), Some(21.0));
    }
}
