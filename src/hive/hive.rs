use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::StorageBackend;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Lifetime {
    /// Lives until the guard is dropped or `unsubscribe` is called.
    Strong,
    /// Lives while the owner handle is still reachable.
    Weak(Weak<dyn Any + Send + Sync>),
}

struct Subscriber<T> {
    id: u64,
    callback: Callback<T>,
    lifetime: Lifetime,
}

struct StoreBinding {
    key: String,
    backend: Arc<dyn StorageBackend>,
}

struct HiveInner<T> {
    initial: T,
    value: RwLock<T>,
    subscribers: RwLock<Vec<Subscriber<T>>>,
    next_id: AtomicU64,
    store: Option<StoreBinding>,
}

/// A reactive value cell with change notification.
///
/// `set` compares the incoming value against the current one and only
/// notifies when they differ, so redundant writes are free. Subscribers are
/// notified synchronously, in subscription order, and each callback is
/// isolated: one panicking subscriber never prevents the rest from running.
///
/// # Examples
///
/// ```
/// use apiary::Hive;
///
/// let hive = Hive::new(0);
/// let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
/// let seen_clone = seen.clone();
///
/// let _sub = hive.subscribe(move |n: &i32| {
///     seen_clone.store(*n as usize, std::sync::atomic::Ordering::SeqCst);
/// });
///
/// hive.set(7);
/// assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 7);
/// ```
pub struct Hive<T> {
    inner: Arc<HiveInner<T>>,
}

impl<T> Clone for Hive<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Hive<T> {
    /// Create a new hive holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(HiveInner {
                value: RwLock::new(initial.clone()),
                initial,
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                store: None,
            }),
        }
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Read the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.read().unwrap_or_else(|e| e.into_inner());
        f(&value)
    }

    /// Set a new value, notifying subscribers if it differs from the
    /// current one.
    pub fn set(&self, value: T) {
        let changed = {
            let mut current = self.inner.value.write().unwrap_or_else(|e| e.into_inner());
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Set via an updater of the previous value. Equality and notification
    /// semantics are the same as [`Hive::set`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = self.with(f);
        self.set(next);
    }

    /// Replace the value without notifying anyone. Used to seed state when
    /// side effects must not fire (hydration, test setup).
    pub fn set_silent(&self, value: T) {
        let mut current = self.inner.value.write().unwrap_or_else(|e| e.into_inner());
        *current = value;
    }

    /// Set the value back to the original initial value, notifying if it
    /// differs.
    pub fn reset(&self) {
        self.set(self.inner.initial.clone());
    }

    /// Register a strong subscriber.
    ///
    /// If the current value differs from the original initial value the
    /// callback fires immediately with the current value, so late
    /// subscribers catch up without a separate `get`. The returned guard
    /// unsubscribes on drop; call [`Subscription::detach`] to keep the
    /// subscription alive for the hive's lifetime.
    #[must_use = "dropping the guard unsubscribes; call detach() to keep the subscription"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add_subscriber(Arc::new(callback), Lifetime::Strong)
    }

    /// Register a subscriber whose lifetime is tied to `owner`.
    ///
    /// Once the last `Arc` clone of `owner` is gone the callback is never
    /// invoked again; the entry itself is purged by the next notification
    /// pass that finds it dead. The guard still allows earlier removal.
    #[must_use = "dropping the guard unsubscribes; call detach() to keep the subscription"]
    pub fn subscribe_weak<F, O>(&self, callback: F, owner: &Arc<O>) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        let owner: Arc<dyn Any + Send + Sync> = owner.clone();
        let handle: Weak<dyn Any + Send + Sync> = Arc::downgrade(&owner);
        self.add_subscriber(Arc::new(callback), Lifetime::Weak(handle))
    }

    /// Number of registered subscribers, dead weak entries included until
    /// the next notification pass purges them.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn add_subscriber(&self, callback: Callback<T>, lifetime: Lifetime) -> Subscription {
        // Replay before registering. The value is cloned out first so the
        // callback runs without the value lock held.
        let replay = self.with(|current| {
            if *current != self.inner.initial {
                Some(current.clone())
            } else {
                None
            }
        });
        if let Some(value) = replay {
            Self::invoke(&callback, &value);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber {
                id,
                callback,
                lifetime,
            });

        let inner = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    let mut subs = inner.subscribers.write().unwrap_or_else(|e| e.into_inner());
                    subs.retain(|s| s.id != id);
                }
            })),
        }
    }

    /// Notify all live subscribers with the current value, purging weak
    /// entries whose owner is gone.
    fn notify(&self) {
        let value = self.get();

        // Snapshot outside the lock so callbacks can subscribe or set
        // without deadlocking.
        let snapshot: Vec<(u64, Callback<T>, Option<Weak<dyn Any + Send + Sync>>)> = {
            let subs = self.inner.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subs.iter()
                .map(|s| {
                    let weak = match &s.lifetime {
                        Lifetime::Strong => None,
                        Lifetime::Weak(w) => Some(w.clone()),
                    };
                    (s.id, Arc::clone(&s.callback), weak)
                })
                .collect()
        };

        let mut dead = Vec::new();
        for (id, callback, weak) in snapshot {
            match weak {
                Some(handle) => match handle.upgrade() {
                    Some(_owner) => Self::invoke(&callback, &value),
                    None => dead.push(id),
                },
                None => Self::invoke(&callback, &value),
            }
        }

        if !dead.is_empty() {
            let mut subs = self.inner.subscribers.write().unwrap_or_else(|e| e.into_inner());
            subs.retain(|s| !dead.contains(&s.id));
        }
    }

    fn invoke(callback: &Callback<T>, value: &T) {
        let result = catch_unwind(AssertUnwindSafe(|| callback(value)));
        if result.is_err() {
            tracing::warn!("hive subscriber panicked; remaining subscribers still notified");
        }
    }
}

impl<T> Hive<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a hive backed by `backend` under `key`.
    ///
    /// A readable persisted snapshot replaces `initial` silently — it *is*
    /// the starting state, so no notification fires. Every subsequent
    /// change is persisted through a dedicated internal subscriber.
    /// Unreadable snapshots and write failures are swallowed; durability
    /// is best-effort.
    pub fn with_storage(initial: T, key: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        let key = key.into();
        let hive = Self {
            inner: Arc::new(HiveInner {
                value: RwLock::new(initial.clone()),
                initial,
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                store: Some(StoreBinding {
                    key: key.clone(),
                    backend: Arc::clone(&backend),
                }),
            }),
        };

        if let Some(stored) = backend.get(&key) {
            match serde_json::from_value::<T>(stored) {
                Ok(value) => hive.set_silent(value),
                Err(err) => tracing::debug!(%key, %err, "ignoring unreadable stored value"),
            }
        }

        hive.subscribe(move |value: &T| match serde_json::to_value(value) {
            Ok(json) => backend.set(&key, &json),
            Err(err) => tracing::debug!(%key, %err, "value not persisted"),
        })
        .detach();

        hive
    }

    /// Reset to the initial value and remove the persisted snapshot.
    pub fn clear_store(&self) {
        self.reset();
        if let Some(store) = &self.inner.store {
            store.backend.clear(&store.key);
        }
    }
}

/// RAII guard for a hive subscription.
///
/// Dropping the guard removes the subscriber, which is the deterministic
/// teardown path for UI owners: hold the guard alongside the owner and the
/// subscription dies with it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Remove the subscriber now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the subscription alive for the hive's lifetime.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
