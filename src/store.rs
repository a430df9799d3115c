//! The store handle and the committed state it publishes.
//!
//! Committed state is an immutable [`Snapshot`] behind an `ArcSwap`. A read transaction
//! grabs the current `Arc<Snapshot>` and never sees anything else. A write transaction takes
//! the writer gate, clones the snapshot (collections are shared until touched), and on commit
//! swaps its working copy in as the new committed state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// lock-free publication of committed snapshots
use arc_swap::ArcSwap;
// the writer gate, parking_lot gives us try_lock and try_lock_for
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::construct::{Collection, CollectionName, Tuple};
use crate::error::{LigatureError, Result};
use crate::matcher::{Matches, Pattern, match_in};
use crate::persist::Persistor;
use crate::transaction::{ReadTx, Transaction, WriteTx};

// ------------- Snapshot -------------
/// The whole store as one transaction sees it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    collections: BTreeMap<CollectionName, Arc<Collection>>,
    next_collection: u64,
    blank_high_water: u64,
}

impl Snapshot {
    /// Collection names in creation order.
    pub fn collections(&self) -> Vec<CollectionName> {
        let mut found: Vec<&Arc<Collection>> = self.collections.values().collect();
        found.sort_by_key(|c| c.created());
        found.into_iter().map(|c| c.name().clone()).collect()
    }
    pub fn collection(&self, name: &CollectionName) -> Option<&Arc<Collection>> {
        self.collections.get(name)
    }
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }
    /// The largest blank entity number committed so far.
    pub fn blank_high_water(&self) -> u64 {
        self.blank_high_water
    }
    /// Every tuple of one kind in a collection. An absent collection has none.
    pub fn all<T: Tuple>(&self, name: &CollectionName) -> Matches<T> {
        match self.collections.get(name) {
            Some(collection) => Matches::new(
                Arc::clone(collection),
                collection.keeper::<T>().ids().clone(),
            ),
            None => Matches::empty(),
        }
    }
    pub fn matching<P: Pattern>(&self, name: &CollectionName, pattern: &P) -> Matches<P::Item> {
        match self.collections.get(name) {
            Some(collection) => match_in(collection, pattern),
            None => Matches::empty(),
        }
    }

    // mutation is reserved for write transactions and restoring from disk
    pub(crate) fn create_collection(&mut self, name: &CollectionName) -> (Arc<Collection>, bool) {
        if let Some(existing) = self.collections.get(name) {
            return (Arc::clone(existing), true);
        }
        self.next_collection += 1;
        let created = Arc::new(Collection::new(name.clone(), self.next_collection));
        self.collections.insert(name.clone(), Arc::clone(&created));
        (created, false)
    }
    pub(crate) fn delete_collection(&mut self, name: &CollectionName) -> bool {
        self.collections.remove(name).is_some()
    }
    pub(crate) fn collection_mut(&mut self, name: &CollectionName) -> Result<&mut Collection> {
        self.collections
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| LigatureError::not_found(format!("collection '{name}'")))
    }
    pub(crate) fn raise_blank_high_water(&mut self, to: u64) {
        self.blank_high_water = self.blank_high_water.max(to);
    }
}

// ------------- Store -------------
/// State only the active writer may touch.
#[derive(Debug)]
pub(crate) struct Writer {
    pub(crate) persistor: Option<Persistor>,
}

/// A handle to one store. Share it by reference (or in an `Arc`) between threads.
///
/// ```
/// use ligature::{CollectionName, Entity, Literal, Predicate, Statement, Store, Transaction};
/// let store = Store::in_memory();
/// let test = CollectionName::new("test").unwrap();
/// store.write(|tx| {
///     tx.create_collection(&test)?;
///     tx.add_statement(
///         &test,
///         Statement::new(
///             Entity::named("valjean")?,
///             Predicate::new("nationality")?,
///             Literal::string("French"),
///         ),
///     )
/// }).unwrap();
/// let count = store.read(|tx| Ok(tx.all_statements(&test)?.len())).unwrap();
/// assert_eq!(count, 1);
/// ```
#[derive(Debug)]
pub struct Store {
    committed: ArcSwap<Snapshot>,
    writer: Mutex<Writer>,
    closed: AtomicBool,
    config: StoreConfig,
    medium: &'static str,
}

impl Store {
    pub fn open(config: StoreConfig) -> Result<Store> {
        let (persistor, snapshot) = match &config.path {
            Some(path) => {
                let mut persistor = Persistor::open(path)?;
                let snapshot = persistor.restore()?;
                (Some(persistor), snapshot)
            }
            None => (None, Snapshot::default()),
        };
        let store = Store::assemble(persistor, snapshot, config);
        info!(
            medium = store.medium(),
            collections = store.committed.load().collection_count(),
            read_only = store.config.read_only,
            "Opened store"
        );
        Ok(store)
    }
    pub fn in_memory() -> Store {
        Store::assemble(None, Snapshot::default(), StoreConfig::default())
    }
    /// Opens a store on an already opened persistor, restoring what it holds.
    pub fn with_persistor(mut persistor: Persistor, config: StoreConfig) -> Result<Store> {
        let snapshot = persistor.restore()?;
        Ok(Store::assemble(Some(persistor), snapshot, config))
    }
    fn assemble(persistor: Option<Persistor>, snapshot: Snapshot, config: StoreConfig) -> Store {
        let medium = if persistor.is_some() { "sqlite" } else { "memory" };
        Store {
            committed: ArcSwap::new(Arc::new(snapshot)),
            writer: Mutex::new(Writer { persistor }),
            closed: AtomicBool::new(false),
            config,
            medium,
        }
    }

    // ---- Transactions ----
    pub fn read_tx(&self) -> Result<ReadTx> {
        self.ensure_open()?;
        Ok(ReadTx::new(self.committed.load_full()))
    }
    /// Opens the write transaction, waiting for the active one to end first.
    ///
    /// With `write_timeout_ms` configured the wait is bounded and running out of time
    /// fails with [`LigatureError::ConcurrentWrite`].
    pub fn write_tx(&self) -> Result<WriteTx<'_>> {
        self.ensure_writable()?;
        let writer = match self.config.write_timeout_ms {
            None => self.writer.lock(),
            Some(ms) => self
                .writer
                .try_lock_for(Duration::from_millis(ms))
                .ok_or_else(|| {
                    LigatureError::ConcurrentWrite(format!(
                        "no write transaction available within {ms} ms"
                    ))
                })?,
        };
        // the store may have been closed while we waited
        self.ensure_open()?;
        Ok(WriteTx::new(self, writer, self.committed.load_full()))
    }
    /// Opens the write transaction only if no other is active.
    pub fn try_write_tx(&self) -> Result<WriteTx<'_>> {
        self.ensure_writable()?;
        let writer = self.writer.try_lock().ok_or_else(|| {
            LigatureError::ConcurrentWrite("another write transaction is active".into())
        })?;
        // close() may have landed between the check and the lock
        self.ensure_open()?;
        Ok(WriteTx::new(self, writer, self.committed.load_full()))
    }
    /// Runs `work` in a read transaction that ends when it returns.
    pub fn read<R, F>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&ReadTx) -> Result<R>,
    {
        let mut tx = self.read_tx()?;
        let result = work(&tx);
        tx.commit()?;
        result
    }
    /// Runs `work` in a write transaction, committing when it succeeds and cancelling when
    /// it fails.
    pub fn write<R, F>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&mut WriteTx<'_>) -> Result<R>,
    {
        let mut tx = self.write_tx()?;
        match work(&mut tx) {
            Ok(result) => {
                if tx.is_active() {
                    tx.commit()?;
                }
                Ok(result)
            }
            Err(e) => {
                if tx.is_active() {
                    tx.cancel()?;
                }
                Err(e)
            }
        }
    }

    // ---- Lifecycle ----
    /// Refuses new transactions from now on. Transactions already open keep their view,
    /// but an open write transaction can no longer commit.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(medium = self.medium(), "Closed store");
        }
    }
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
    /// Diagnostic key/value pairs, for observability only.
    pub fn description(&self) -> BTreeMap<String, String> {
        let committed = self.committed.load();
        let mut description = BTreeMap::new();
        description.insert("medium".to_string(), self.medium().to_string());
        if let Some(path) = &self.config.path {
            description.insert("path".to_string(), path.display().to_string());
        }
        description.insert(
            "collections".to_string(),
            committed.collection_count().to_string(),
        );
        description.insert(
            "blank_high_water".to_string(),
            committed.blank_high_water().to_string(),
        );
        description.insert("read_only".to_string(), self.config.read_only.to_string());
        description.insert("closed".to_string(), self.is_closed().to_string());
        description
    }

    fn medium(&self) -> &'static str {
        self.medium
    }
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(LigatureError::Closed);
        }
        Ok(())
    }
    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.config.read_only {
            return Err(LigatureError::ReadOnly(
                "the store was opened read only".into(),
            ));
        }
        Ok(())
    }
    pub(crate) fn publish(&self, snapshot: Snapshot) {
        debug!(
            collections = snapshot.collection_count(),
            blank_high_water = snapshot.blank_high_water(),
            "Publishing snapshot"
        );
        self.committed.store(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(label: &str) -> CollectionName {
        CollectionName::new(label).unwrap()
    }

    #[test]
    fn collections_keep_creation_order() {
        let mut snapshot = Snapshot::default();
        for label in ["zebra", "apple", "mango"] {
            snapshot.create_collection(&name(label));
        }
        snapshot.delete_collection(&name("zebra"));
        snapshot.create_collection(&name("zebra"));
        assert_eq!(
            snapshot.collections(),
            vec![name("apple"), name("mango"), name("zebra")]
        );
    }

    #[test]
    fn creating_twice_keeps_the_collection() {
        let mut snapshot = Snapshot::default();
        let (first, existed) = snapshot.create_collection(&name("test"));
        assert!(!existed);
        let (second, existed) = snapshot.create_collection(&name("test"));
        assert!(existed);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn clones_share_untouched_collections() {
        let mut snapshot = Snapshot::default();
        snapshot.create_collection(&name("a"));
        snapshot.create_collection(&name("b"));
        let mut working = snapshot.clone();
        working.collection_mut(&name("a")).unwrap();
        assert!(!Arc::ptr_eq(
            snapshot.collection(&name("a")).unwrap(),
            working.collection(&name("a")).unwrap()
        ));
        assert!(Arc::ptr_eq(
            snapshot.collection(&name("b")).unwrap(),
            working.collection(&name("b")).unwrap()
        ));
    }

    #[test]
    fn missing_collections_are_not_found() {
        let mut snapshot = Snapshot::default();
        assert!(matches!(
            snapshot.collection_mut(&name("nope")),
            Err(LigatureError::NotFound(_))
        ));
        assert!(snapshot.collection(&name("nope")).is_none());
    }

    #[test]
    fn writers_are_refused_once_closed() {
        let store = Store::in_memory();
        store.close();
        assert!(matches!(store.try_write_tx(), Err(LigatureError::Closed)));
        assert!(matches!(store.write_tx(), Err(LigatureError::Closed)));
        // the gate was not left taken
        assert!(store.writer.try_lock().is_some());
    }

    #[test]
    fn live_matches_make_the_next_write_copy() {
        let mut snapshot = Snapshot::default();
        snapshot.create_collection(&name("a"));
        let first: *const Collection = snapshot.collection_mut(&name("a")).unwrap();
        // nothing else holds the collection, so it is changed in place
        let again: *const Collection = snapshot.collection_mut(&name("a")).unwrap();
        assert_eq!(first, again);
        let held = snapshot.all::<crate::construct::Statement>(&name("a"));
        let copied: *const Collection = snapshot.collection_mut(&name("a")).unwrap();
        assert_ne!(first, copied);
        drop(held);
        let settled: *const Collection = snapshot.collection_mut(&name("a")).unwrap();
        assert_eq!(copied, settled);
    }

    #[test]
    fn description_names_the_medium() {
        let store = Store::in_memory();
        let description = store.description();
        assert_eq!(description["medium"], "memory");
        assert_eq!(description["closed"], "false");
        store.close();
        store.close();
        assert_eq!(store.description()["closed"], "true");
    }
}
