//! Shared caches.
//!
//! [`BoundedCache`] is a get-or-create memoizer with an item bound. Factories
//! run outside any lock and may therefore run more than once for the same key
//! under contention; only the first value to land in the map is ever handed
//! out, so every caller of a race sees that one value.
//!
//! [`ExpiringValue`] recomputes its value once an absolute expiry has passed.
//! It is not synchronized itself; [`ExpiringCache`] puts each one behind a
//! mutex inside a [`BoundedCache`].

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::settings::Settings;

// ------------- BoundedCache -------------
pub struct BoundedCache<K, V> {
    entries: DashMap<K, V>,
    // insertion order, oldest first, for FIFO eviction
    order: Mutex<VecDeque<K>>,
    max_items: usize,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    pub fn new(max_items: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_items: max_items.max(1),
        }
    }
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.cache_max_items)
    }
    fn order(&self) -> MutexGuard<'_, VecDeque<K>> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
    pub fn get_or_add(&self, key: K, factory: impl FnOnce(&K) -> V) -> V {
        if let Some(existing) = self.get(&key) {
            return existing;
        }
        let candidate = factory(&key);
        let (value, inserted) = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                // queued under the shard lock, so the queue never misses a live key
                self.order().push_back(key);
                (entry.insert(candidate).value().clone(), true)
            }
        };
        if inserted {
            self.evict_overflow();
        }
        value
    }
    // Called without any map guard held, eviction needs the shard locks.
    fn evict_overflow(&self) {
        while self.entries.len() > self.max_items {
            let oldest = self.order().pop_front();
            match oldest {
                Some(oldest) => {
                    trace!(key = ?oldest, "evicting cache entry");
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
    pub fn remove(&self, key: &K) -> Option<V> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                self.order().retain(|kept| kept != key);
                Some(entry.remove())
            }
            Entry::Vacant(_) => None,
        }
    }
    pub fn clear(&self) {
        let tracked: Vec<K> = self.order().drain(..).collect();
        for key in tracked {
            self.entries.remove(&key);
        }
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn max_items(&self) -> usize {
        self.max_items
    }
}

impl<K: Eq + Hash, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.entries.len())
            .field("max_items", &self.max_items)
            .finish()
    }
}

// ------------- ExpiringValue -------------
pub struct ExpiringValue<T> {
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    ttl: Duration,
    current: Option<(T, Instant)>,
}

impl<T: Clone> ExpiringValue<T> {
    pub fn new(ttl: Duration, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            ttl,
            current: None,
        }
    }
    pub fn is_expired(&self) -> bool {
        match &self.current {
            Some((_, expires_at)) => Instant::now() >= *expires_at,
            None => true,
        }
    }
    /// The current value, computed first when missing or expired.
    pub fn get(&mut self) -> T {
        if self.is_expired() {
            let value = (self.factory)();
            self.current = Some((value, Instant::now() + self.ttl));
        }
        match &self.current {
            Some((value, _)) => value.clone(),
            None => (self.factory)(),
        }
    }
    pub fn invalidate(&mut self) {
        self.current = None;
    }
}

// ------------- ExpiringCache -------------
pub struct ExpiringCache<K, V> {
    values: BoundedCache<K, Arc<Mutex<ExpiringValue<V>>>>,
    ttl: Duration,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone,
{
    pub fn new(max_items: usize, ttl: Duration) -> Self {
        Self {
            values: BoundedCache::new(max_items),
            ttl,
        }
    }
    pub fn get_or_compute(&self, key: K, factory: impl Fn(&K) -> V + Send + Sync + 'static) -> V {
        let ttl = self.ttl;
        let slot = self.values.get_or_add(key, |key| {
            let key = key.clone();
            Arc::new(Mutex::new(ExpiringValue::new(ttl, move || factory(&key))))
        });
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get()
    }
    pub fn invalidate(&self, key: &K) {
        if let Some(slot) = self.values.get(key) {
            slot.lock().unwrap_or_else(PoisonError::into_inner).invalidate();
        }
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn get_or_add_memoizes() {
        let cache = BoundedCache::<String, usize>::new(10);
        let calls = AtomicUsize::new(0);
        let make = |key: &String| {
            calls.fetch_add(1, Ordering::SeqCst);
            key.len()
        };
        assert_eq!(cache.get_or_add(String::from("four"), make), 4);
        assert_eq!(cache.get_or_add(String::from("four"), make), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bound_evicts_oldest_first() {
        let cache = BoundedCache::<u32, u32>::new(2);
        cache.get_or_add(1, |k| *k);
        cache.get_or_add(2, |k| *k);
        cache.get_or_add(3, |k| *k);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn removed_keys_leave_the_eviction_order() {
        let cache = BoundedCache::<u32, u32>::new(2);
        cache.get_or_add(1, |k| *k);
        cache.get_or_add(2, |k| *k);
        assert_eq!(cache.remove(&1), Some(1));
        cache.get_or_add(3, |k| *k);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&2), Some(2));
    }

    #[test]
    fn reinserted_key_is_queued_as_newest() {
        let cache = BoundedCache::<u32, u32>::new(2);
        cache.get_or_add(1, |k| *k);
        cache.get_or_add(2, |k| *k);
        cache.remove(&1);
        cache.get_or_add(1, |k| k * 10);
        cache.get_or_add(3, |k| *k);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&2).is_none());
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&3), Some(3));
        cache.clear();
        assert!(cache.is_empty());
        cache.get_or_add(4, |k| *k);
        cache.get_or_add(5, |k| *k);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn expiring_value_recomputes_after_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut value = ExpiringValue::new(Duration::ZERO, move || {
            counter.fetch_add(1, Ordering::SeqCst)
        });
        assert_eq!(value.get(), 0);
        assert_eq!(value.get(), 1);

        let counter = Arc::clone(&calls);
        let mut value = ExpiringValue::new(Duration::from_secs(3600), move || {
            counter.fetch_add(1, Ordering::SeqCst)
        });
        let first = value.get();
        assert_eq!(value.get(), first);
        value.invalidate();
        assert_eq!(value.get(), first + 1);
    }

    #[test]
    fn expiring_cache_keeps_values_until_ttl() {
        let cache = ExpiringCache::<String, String>::new(8, Duration::from_secs(3600));
        let first = cache.get_or_compute(String::from("k"), |k| format!("{k}-1"));
        let second = cache.get_or_compute(String::from("k"), |k| format!("{k}-2"));
        assert_eq!(first, "k-1");
        assert_eq!(second, "k-1");
        assert_eq!(cache.len(), 1);
    }
}
