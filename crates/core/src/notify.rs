//! Per-path change subscriptions.
//!
//! Views subscribe to one file path and receive a [`FileChange`] carrying
//! only the watched fields (`preview`, `feature_image`, `tags`) that changed.
//! Dispatch snapshots the subscriber list before calling anything, so a
//! callback may subscribe or unsubscribe freely, including itself.

use crate::models::FileChange;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

type Callback = Arc<dyn Fn(&FileChange) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_path: HashMap<String, Vec<(u64, Callback)>>,
}

impl Registry {
    fn remove(&mut self, path: &str, id: u64) {
        if let Some(subscribers) = self.by_path.get_mut(path) {
            subscribers.retain(|(sid, _)| *sid != id);
            if subscribers.is_empty() {
                self.by_path.remove(path);
            }
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // The lock is never held while user code runs.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Default)]
pub struct ChangeHub {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHub")
            .field("subscribers", &self.total_subscribers())
            .finish()
    }
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, path: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&FileChange) + Send + Sync + 'static,
    {
        let path = path.into();
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .by_path
            .entry(path.clone())
            .or_default()
            .push((id, Arc::new(callback)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            path,
            id,
        }
    }

    /// Delivers `change` to every subscriber of `path`. Empty changes are
    /// dropped. Returns how many callbacks ran.
    pub fn notify(&self, path: &str, change: &FileChange) -> usize {
        if change.is_empty() {
            return 0;
        }
        let snapshot: Vec<Callback> = match lock(&self.registry).by_path.get(path) {
            Some(subscribers) => subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };
        trace!("dispatching change for {} to {} subscribers", path, snapshot.len());
        for callback in &snapshot {
            callback(change);
        }
        snapshot.len()
    }

    pub fn notify_all(&self, changes: &[(String, FileChange)]) -> usize {
        changes
            .iter()
            .map(|(path, change)| self.notify(path, change))
            .sum()
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        lock(&self.registry)
            .by_path
            .get(path)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn total_subscribers(&self) -> usize {
        lock(&self.registry).by_path.values().map(Vec::len).sum()
    }
}

/// Handle returned by [`ChangeHub::subscribe`]. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    path: String,
    id: u64,
}

impl Subscription {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.path, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn preview(value: &str) -> FileChange {
        FileChange {
            preview: Some(Some(value.to_string())),
            ..FileChange::default()
        }
    }

    #[test]
    fn only_subscribers_of_the_path_are_called() {
        let hub = ChangeHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _a = hub.subscribe("notes/a.md", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = Arc::clone(&hits);
        let _b = hub.subscribe("notes/b.md", move |_| {
            h.fetch_add(100, Ordering::SeqCst);
        });

        assert_eq!(hub.notify("notes/a.md", &preview("x")), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(hub.notify("notes/a.md", &FileChange::default()), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_drop_unsubscribes() {
        let hub = ChangeHub::new();
        let sub = hub.subscribe("a.md", |_| {});
        let other = hub.subscribe("a.md", |_| {});
        assert_eq!(hub.subscriber_count("a.md"), 2);
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(hub.subscriber_count("a.md"), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count("a.md"), 1);
        drop(other);
        assert_eq!(hub.total_subscribers(), 0);
    }

    #[test]
    fn callback_can_unsubscribe_itself_during_dispatch() {
        let hub = ChangeHub::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&slot);
        let h = Arc::clone(&hits);
        let sub = hub.subscribe("a.md", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let Some(own) = s.lock().unwrap().take() {
                own.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);
        let h = Arc::clone(&hits);
        let _other = hub.subscribe("a.md", move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        });

        assert_eq!(hub.notify("a.md", &preview("1")), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        assert_eq!(hub.subscriber_count("a.md"), 1);
        assert_eq!(hub.notify("a.md", &preview("2")), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn subscription_outliving_hub_is_harmless() {
        let hub = ChangeHub::new();
        let sub = hub.subscribe("a.md", |_| {});
        drop(hub);
        sub.unsubscribe();
        assert_eq!(sub.path(), "a.md");
    }
}
