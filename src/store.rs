//! Observable state containers.
//!
//! A [`Store`] holds a value and notifies subscribers synchronously on every
//! `set`. Writes to one store are serialized together with their
//! notifications, so subscribers see values in the order they were stored.
//! The writer lock is re-entrant and the value lock is never held while a
//! transform or a callback runs, so callbacks may read or write the same
//! store again from the same thread.

use anyhow::{Context, Result};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: RwLock<T>,
    /// Held across write-and-notify.
    writer: ReentrantMutex<()>,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

/// A writable value with synchronous change notification.
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                writer: ReentrantMutex::new(()),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Replace the value and notify every subscriber.
    pub fn set(&self, value: T) {
        let _writer = self.inner.writer.lock();
        *self.inner.value.write() = value.clone();
        self.notify(&value);
    }

    /// Compute the next value from a snapshot of the current one.
    ///
    /// Other threads cannot write between the snapshot and the write.
    pub fn update(&self, f: impl FnOnce(T) -> T) {
        let _writer = self.inner.writer.lock();
        let next = f(self.get());
        self.set(next);
    }

    /// Like [`Store::update`], but `f` edits the value in place and decides
    /// whether it changed. Subscribers are notified only for `Some`.
    pub fn try_update<R>(&self, f: impl FnOnce(&mut T) -> Option<R>) -> Option<R> {
        let _writer = self.inner.writer.lock();
        let mut next = self.get();
        let result = f(&mut next)?;
        self.set(next);
        Some(result)
    }

    /// Register a callback. It runs once immediately with the current value and
    /// then after every `set` until the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let _writer = self.inner.writer.lock();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback<T> = Arc::new(f);
        self.inner
            .subscribers
            .lock()
            .push((id, Arc::clone(&callback)));

        callback(&self.get());

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().retain(|(i, _)| *i != id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// A read-only projection that follows this store.
    pub fn derive<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Derived<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        let target = Store::new(self.with(|v| f(v)));
        let sink = target.clone();
        let source = self.subscribe(move |v| sink.set(f(v)));
        Derived {
            store: target,
            _source: Arc::new(source),
        }
    }

    fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }
}

/// Handle for a store subscription. Dropping it unsubscribes.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(f: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(f)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Read-only view derived from another store.
///
/// The view stops following its source once every clone is dropped.
pub struct Derived<U> {
    store: Store<U>,
    _source: Arc<Subscription>,
}

impl<U> Clone for Derived<U> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _source: Arc::clone(&self._source),
        }
    }
}

impl<U: Clone + Send + Sync + 'static> Derived<U> {
    pub fn get(&self) -> U {
        self.store.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&U) -> R) -> R {
        self.store.with(f)
    }

    pub fn subscribe(&self, f: impl Fn(&U) + Send + Sync + 'static) -> Subscription {
        self.store.subscribe(f)
    }
}

/// A store persisted as JSON, restored on open and rewritten on every change.
pub struct Synced<T> {
    store: Store<T>,
    path: PathBuf,
    _persist: Subscription,
}

impl<T> Synced<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Open the store at `path`, falling back to `default` when the file is
    /// missing or unreadable.
    pub fn open(path: impl Into<PathBuf>, default: T) -> Self {
        let path = path.into();
        let value = if path.exists() {
            match read_json(&path) {
                Ok(value) => {
                    debug!("Restored state from {}", path.display());
                    value
                }
                Err(e) => {
                    warn!("Failed to restore {}: {e:#}; starting fresh", path.display());
                    default
                }
            }
        } else {
            default
        };

        let store = Store::new(value);
        let target = path.clone();
        let persist = store.subscribe(move |v| {
            if let Err(e) = write_json(&target, v) {
                warn!("Failed to persist {}: {e:#}", target.display());
            }
        });

        Self {
            store,
            path,
            _persist: persist,
        }
    }

    pub fn store(&self) -> &Store<T> {
        &self.store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Deref for Synced<T> {
    type Target = Store<T>;

    fn deref(&self) -> &Store<T> {
        &self.store
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribe_delivers_current_value_then_changes() {
        let store = Store::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(move |v| sink.lock().push(*v));

        store.set(2);
        store.update(|v| v + 1);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        assert_eq!(store.get(), 3);
    }

    #[test]
    fn dropping_subscription_stops_delivery() {
        let store = Store::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        store.set(1);
        drop(sub);
        store.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn callbacks_may_write_back_into_the_store() {
        let store = Store::new(0);
        let handle = store.clone();
        let _sub = store.subscribe(move |v| {
            if *v == 1 {
                handle.set(10);
            }
        });
        store.set(1);
        assert_eq!(store.get(), 10);
    }

    #[test]
    fn derived_follows_source() {
        let store = Store::new((1, "a".to_string()));
        let name = store.derive(|(_, n)| n.clone());
        assert_eq!(name.get(), "a");
        store.update(|(n, _)| (n, "b".to_string()));
        assert_eq!(name.get(), "b");

        drop(name);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn try_update_notifies_only_on_change() {
        let store = Store::new(vec![1]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(store.try_update(|_| None::<()>), None);
        assert_eq!(
            store.try_update(|v| {
                v.push(2);
                Some(v.len())
            }),
            Some(2)
        );
        assert_eq!(store.get(), vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_writers_keep_views_in_step() {
        let store = Store::new(0u64);
        let last_seen = store.derive(|v| *v);
        let order_ok = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let previous = Arc::new(Mutex::new(0u64));
        let (ok, prev) = (Arc::clone(&order_ok), Arc::clone(&previous));
        let _sub = store.subscribe(move |v| {
            let mut prev = prev.lock();
            if *v < *prev {
                ok.store(false, Ordering::SeqCst);
            }
            *prev = *v;
        });

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        store.update(|v| v + 1);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(store.get(), 1600);
        assert_eq!(last_seen.get(), 1600);
        assert!(order_ok.load(Ordering::SeqCst));
    }

    #[test]
    fn synced_store_persists_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        {
            let synced = Synced::open(&path, vec![1, 2]);
            synced.update(|mut v| {
                v.push(3);
                v
            });
        }
        let restored = Synced::open(&path, Vec::<i32>::new());
        assert_eq!(restored.get(), vec![1, 2, 3]);
    }

    #[test]
    fn synced_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let synced = Synced::open(&path, 7u32);
        assert_eq!(synced.get(), 7);
    }
}
