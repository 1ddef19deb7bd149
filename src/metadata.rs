//! Metadata attached to things that are not containers themselves.
//!
//! Entities that want metadata own a [`MetadataSlot`] and expose it through
//! [`HasMetadata`]. Foreign hosts that cannot carry a slot (anything shared as
//! an `Arc<H>`) go through a [`WeakMetadataStore`], which associates metadata
//! with the host's identity without keeping the host alive.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::container::{Container, ConcurrentPropertyContainer};

// ------------- MetadataSlot -------------
#[derive(Default)]
pub struct MetadataSlot {
    container: OnceLock<Arc<ConcurrentPropertyContainer>>,
}

impl MetadataSlot {
    pub fn new() -> Self {
        Self {
            container: OnceLock::new(),
        }
    }
    pub fn get(&self) -> Option<Arc<ConcurrentPropertyContainer>> {
        self.container.get().cloned()
    }
    pub fn get_or_create(&self) -> Arc<ConcurrentPropertyContainer> {
        Arc::clone(
            self.container
                .get_or_init(|| Arc::new(ConcurrentPropertyContainer::empty())),
        )
    }
}

impl fmt::Debug for MetadataSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.container.get() {
            Some(container) => write!(f, "MetadataSlot({} values)", container.count()),
            None => f.write_str("MetadataSlot(empty)"),
        }
    }
}

pub trait HasMetadata {
    fn metadata_slot(&self) -> &MetadataSlot;
    fn metadata(&self) -> Option<Arc<ConcurrentPropertyContainer>> {
        self.metadata_slot().get()
    }
    fn get_or_create_metadata(&self) -> Arc<ConcurrentPropertyContainer> {
        self.metadata_slot().get_or_create()
    }
}

// ------------- WeakMetadataStore -------------

// Dead hosts are swept after this many new associations.
const PURGE_INTERVAL: usize = 64;

struct WeakEntry<H: ?Sized> {
    host: Weak<H>,
    metadata: Arc<ConcurrentPropertyContainer>,
}

impl<H: ?Sized> WeakEntry<H> {
    fn new(host: &Arc<H>, metadata: Arc<ConcurrentPropertyContainer>) -> Self {
        Self {
            host: Arc::downgrade(host),
            metadata,
        }
    }
    fn belongs_to(&self, host: &Arc<H>) -> bool {
        self.host
            .upgrade()
            .is_some_and(|alive| Arc::ptr_eq(&alive, host))
    }
}

/// Identity keyed, weak-host metadata side table.
pub struct WeakMetadataStore<H: ?Sized + Send + Sync> {
    entries: DashMap<usize, WeakEntry<H>>,
    created: AtomicUsize,
}

fn identity<H: ?Sized>(host: &Arc<H>) -> usize {
    Arc::as_ptr(host) as *const () as usize
}

impl<H: ?Sized + Send + Sync> WeakMetadataStore<H> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            created: AtomicUsize::new(0),
        }
    }
    pub fn get(&self, host: &Arc<H>) -> Option<Arc<ConcurrentPropertyContainer>> {
        let entry = self.entries.get(&identity(host))?;
        if entry.belongs_to(host) {
            Some(Arc::clone(&entry.metadata))
        } else {
            None
        }
    }
    pub fn get_or_create(&self, host: &Arc<H>) -> Arc<ConcurrentPropertyContainer> {
        let mut created = false;
        let metadata = {
            let mut entry = self.entries.entry(identity(host)).or_insert_with(|| {
                created = true;
                WeakEntry::new(host, Arc::new(ConcurrentPropertyContainer::empty()))
            });
            if !entry.belongs_to(host) {
                *entry = WeakEntry::new(host, Arc::new(ConcurrentPropertyContainer::empty()));
                created = true;
            }
            Arc::clone(&entry.metadata)
        };
        // the entry guard is released above, purging needs every shard
        if created {
            self.after_insert();
        }
        metadata
    }
    pub fn set(&self, host: &Arc<H>, metadata: Arc<ConcurrentPropertyContainer>) {
        let previous = self
            .entries
            .insert(identity(host), WeakEntry::new(host, metadata));
        if previous.is_none() {
            self.after_insert();
        }
    }
    pub fn remove(&self, host: &Arc<H>) -> Option<Arc<ConcurrentPropertyContainer>> {
        self.entries
            .remove_if(&identity(host), |_, entry| entry.belongs_to(host))
            .map(|(_, entry)| entry.metadata)
    }
    /// Drops the metadata of every host that is no longer alive.
    pub fn purge(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.host.strong_count() > 0);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "purged metadata of dropped hosts");
        }
        purged
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    fn after_insert(&self) {
        if (self.created.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_INTERVAL == 0 {
            self.purge();
        }
    }
}

impl<H: ?Sized + Send + Sync> Default for WeakMetadataStore<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;
    use crate::search::ContainerExt;

    #[test]
    fn slot_is_created_once() {
        let slot = MetadataSlot::new();
        assert!(slot.get().is_none());
        let first = slot.get_or_create();
        let second = slot.get_or_create();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn properties_carry_their_own_metadata() {
        let width = Property::<i64>::new("ColumnWidth");
        let name = Property::<String>::new("Name");
        name.get_or_create_metadata().set_value(&width, 30);
        let metadata = name.metadata().unwrap();
        assert_eq!(metadata.get_value(&width), Some(30));
        // a derived definition starts without metadata
        assert!(name.with_alias("n").metadata().is_none());
    }

    #[test]
    fn store_does_not_keep_hosts_alive() {
        let store = WeakMetadataStore::<String>::new();
        let host = Arc::new(String::from("host"));
        let weak = Arc::downgrade(&host);
        let first = store.get_or_create(&host);
        assert!(Arc::ptr_eq(&first, &store.get(&host).unwrap()));
        drop(host);
        assert!(weak.upgrade().is_none());
        assert_eq!(store.purge(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn store_is_keyed_by_identity_not_equality() {
        let store = WeakMetadataStore::<String>::new();
        let a = Arc::new(String::from("same"));
        let b = Arc::new(String::from("same"));
        store.get_or_create(&a);
        assert!(store.get(&b).is_none());
        assert!(store.remove(&b).is_none());
        assert!(store.remove(&a).is_some());
    }
}
