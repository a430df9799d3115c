//! Read and write transactions.
//!
//! Both kinds start `Active` and end exactly once, either committed or cancelled; after that
//! every operation fails with [`LigatureError::TransactionState`]. Mutations only exist on
//! [`WriteTx`], so a read transaction cannot even express one.

use std::fmt;
use std::sync::Arc;

use parking_lot::MutexGuard;
// used for unions of index lookups
use roaring::RoaringTreemap;
use tracing::{debug, warn};

use crate::construct::{BlankAllocator, Collection, CollectionName, Rule, Statement, Tuple};
use crate::error::{LigatureError, Result};
use crate::matcher::{Matches, RulePattern, StatementPattern};
use crate::store::{Snapshot, Store, Writer};
use crate::value::{Entity, Node, Object, Predicate};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TxStatus {
    Active,
    Committed,
    Cancelled,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status = match self {
            TxStatus::Active => "active",
            TxStatus::Committed => "committed",
            TxStatus::Cancelled => "cancelled",
        };
        write!(f, "{status}")
    }
}

fn ensure_active(status: TxStatus) -> Result<()> {
    match status {
        TxStatus::Active => Ok(()),
        ended => Err(LigatureError::transaction_state(format!(
            "the transaction is already {ended}"
        ))),
    }
}

/// The read operations shared by both kinds of transaction.
pub trait Transaction {
    /// The state this transaction reads from, as long as it is active.
    fn snapshot(&self) -> Result<&Snapshot>;
    fn status(&self) -> TxStatus;

    fn is_active(&self) -> bool {
        self.status() == TxStatus::Active
    }
    /// Collection names in creation order.
    fn collections(&self) -> Result<Vec<CollectionName>> {
        Ok(self.snapshot()?.collections())
    }
    fn collection(&self, name: &CollectionName) -> Result<Option<Arc<Collection>>> {
        Ok(self.snapshot()?.collection(name).cloned())
    }
    fn all_statements(&self, name: &CollectionName) -> Result<Matches<Statement>> {
        Ok(self.snapshot()?.all(name))
    }
    fn all_rules(&self, name: &CollectionName) -> Result<Matches<Rule>> {
        Ok(self.snapshot()?.all(name))
    }
    fn match_statements(
        &self,
        name: &CollectionName,
        pattern: &StatementPattern,
    ) -> Result<Matches<Statement>> {
        Ok(self.snapshot()?.matching(name, pattern))
    }
    fn match_rules(&self, name: &CollectionName, pattern: &RulePattern) -> Result<Matches<Rule>> {
        Ok(self.snapshot()?.matching(name, pattern))
    }
}

// ------------- Read transactions -------------
#[derive(Debug)]
pub struct ReadTx {
    snapshot: Arc<Snapshot>,
    status: TxStatus,
}

impl ReadTx {
    pub(crate) fn new(snapshot: Arc<Snapshot>) -> Self {
        debug!("Opened read transaction");
        Self {
            snapshot,
            status: TxStatus::Active,
        }
    }
    /// Ends the transaction. Nothing was changed, so this is the same as cancelling.
    pub fn commit(&mut self) -> Result<()> {
        self.end(TxStatus::Committed)
    }
    pub fn cancel(&mut self) -> Result<()> {
        self.end(TxStatus::Cancelled)
    }
    fn end(&mut self, status: TxStatus) -> Result<()> {
        ensure_active(self.status)?;
        self.status = status;
        debug!(%status, "Ended read transaction");
        Ok(())
    }
}

impl Transaction for ReadTx {
    fn snapshot(&self) -> Result<&Snapshot> {
        ensure_active(self.status)?;
        Ok(&self.snapshot)
    }
    fn status(&self) -> TxStatus {
        self.status
    }
}

// ------------- Journal -------------
/// A statement or a rule, as recorded in the journal.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Kept {
    Statement(Statement),
    Rule(Rule),
}

impl From<Statement> for Kept {
    fn from(statement: Statement) -> Self {
        Kept::Statement(statement)
    }
}
impl From<Rule> for Kept {
    fn from(rule: Rule) -> Self {
        Kept::Rule(rule)
    }
}

/// One effective change made by a write transaction. Replaying the journal of a committed
/// transaction against the state it started from yields the state it committed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Change {
    CreateCollection(CollectionName),
    DeleteCollection(CollectionName),
    Add(CollectionName, Kept),
    Remove(CollectionName, Kept),
}

// ------------- Write transactions -------------
/// The single write transaction of a store.
///
/// Changes go to a private copy of the committed state and become visible to transactions
/// opened after a successful [`WriteTx::commit`]. Dropping an active write transaction
/// cancels it.
pub struct WriteTx<'s> {
    store: &'s Store,
    writer: Option<MutexGuard<'s, Writer>>,
    working: Snapshot,
    allocator: BlankAllocator,
    journal: Vec<Change>,
    status: TxStatus,
}

impl<'s> WriteTx<'s> {
    pub(crate) fn new(store: &'s Store, writer: MutexGuard<'s, Writer>, base: Arc<Snapshot>) -> Self {
        debug!(
            blank_high_water = base.blank_high_water(),
            "Opened write transaction"
        );
        Self {
            store,
            writer: Some(writer),
            allocator: BlankAllocator::starting_after(base.blank_high_water()),
            working: base.as_ref().clone(),
            journal: Vec::new(),
            status: TxStatus::Active,
        }
    }

    // ---- Collections ----
    /// Creates the collection, or returns the existing one untouched.
    pub fn create_collection(&mut self, name: &CollectionName) -> Result<Arc<Collection>> {
        ensure_active(self.status)?;
        let (collection, existed) = self.working.create_collection(name);
        if !existed {
            debug!(collection = %name, "Created collection");
            self.journal.push(Change::CreateCollection(name.clone()));
        }
        Ok(collection)
    }
    /// Deletes the collection with everything in it. Returns `false` if there was none.
    pub fn delete_collection(&mut self, name: &CollectionName) -> Result<bool> {
        ensure_active(self.status)?;
        let deleted = self.working.delete_collection(name);
        if deleted {
            debug!(collection = %name, "Deleted collection");
            self.journal.push(Change::DeleteCollection(name.clone()));
        }
        Ok(deleted)
    }

    // ---- Blank entities ----
    pub fn new_entity(&mut self) -> Result<Entity> {
        ensure_active(self.status)?;
        self.allocator.generate()
    }

    // ---- Statements and rules ----
    /// Adds the statement. Returns `false` if the collection already held it.
    pub fn add_statement(&mut self, name: &CollectionName, statement: Statement) -> Result<bool> {
        self.add(name, statement)
    }
    /// Removes the statement. Returns `false` if the collection did not hold it.
    pub fn remove_statement(&mut self, name: &CollectionName, statement: &Statement) -> Result<bool> {
        self.remove(name, statement)
    }
    pub fn add_rule(&mut self, name: &CollectionName, rule: Rule) -> Result<bool> {
        self.add(name, rule)
    }
    pub fn remove_rule(&mut self, name: &CollectionName, rule: &Rule) -> Result<bool> {
        self.remove(name, rule)
    }
    /// Removes every statement mentioning the entity as subject, object or context, and
    /// every rule mentioning it as subject or object. Returns how many tuples went away.
    pub fn remove_entity(&mut self, name: &CollectionName, entity: &Entity) -> Result<usize> {
        ensure_active(self.status)?;
        let as_node = Node::Entity(entity.clone());
        let as_object = Object::Entity(entity.clone());
        let collection = self.working.collection_mut(name)?;
        let statements = collection.keeper_mut::<Statement>();
        let ids = union(&[
            statements.with_subject(&as_node),
            statements.with_object(&as_object),
            statements.with_context(entity),
        ]);
        let removed_statements = statements.release_all(&ids);
        let rules = collection.keeper_mut::<Rule>();
        let ids = union(&[rules.with_subject(&as_node), rules.with_object(&as_object)]);
        let removed_rules = rules.release_all(&ids);
        Ok(self.journal_removals(name, removed_statements, removed_rules))
    }
    /// Removes every statement and rule using the predicate, in predicate position or as a
    /// subject or object. Returns how many tuples went away.
    pub fn remove_predicate(&mut self, name: &CollectionName, predicate: &Predicate) -> Result<usize> {
        ensure_active(self.status)?;
        let as_node = Node::Predicate(predicate.clone());
        let as_object = Object::Predicate(predicate.clone());
        let collection = self.working.collection_mut(name)?;
        let statements = collection.keeper_mut::<Statement>();
        let ids = union(&[
            statements.with_predicate(predicate),
            statements.with_object(&as_object),
        ]);
        let removed_statements = statements.release_all(&ids);
        let rules = collection.keeper_mut::<Rule>();
        let ids = union(&[
            rules.with_predicate(predicate),
            rules.with_subject(&as_node),
            rules.with_object(&as_object),
        ]);
        let removed_rules = rules.release_all(&ids);
        Ok(self.journal_removals(name, removed_statements, removed_rules))
    }

    fn add<T: Tuple + Into<Kept>>(&mut self, name: &CollectionName, tuple: T) -> Result<bool> {
        ensure_active(self.status)?;
        let collection = self.working.collection_mut(name)?;
        // explicitly referenced blank entities are never minted again
        for entity in tuple.entities() {
            self.allocator.retain(entity);
        }
        let (kept, previously_kept) = collection.keeper_mut::<T>().keep(tuple);
        if !previously_kept {
            self.journal
                .push(Change::Add(name.clone(), kept.as_ref().clone().into()));
        }
        Ok(!previously_kept)
    }
    fn remove<T: Tuple + Into<Kept>>(&mut self, name: &CollectionName, tuple: &T) -> Result<bool> {
        ensure_active(self.status)?;
        let collection = self.working.collection_mut(name)?;
        match collection.keeper_mut::<T>().release(tuple) {
            Some(released) => {
                self.journal
                    .push(Change::Remove(name.clone(), released.as_ref().clone().into()));
                Ok(true)
            }
            None => Ok(false),
        }
    }
    fn journal_removals(
        &mut self,
        name: &CollectionName,
        statements: Vec<Arc<Statement>>,
        rules: Vec<Arc<Rule>>,
    ) -> usize {
        let removed = statements.len() + rules.len();
        for statement in statements {
            self.journal.push(Change::Remove(
                name.clone(),
                Kept::Statement(statement.as_ref().clone()),
            ));
        }
        for rule in rules {
            self.journal
                .push(Change::Remove(name.clone(), Kept::Rule(rule.as_ref().clone())));
        }
        removed
    }

    // ---- Ending ----
    /// Publishes every change atomically. With a persistor attached the journal is written
    /// first; if that fails nothing is published and the transaction is cancelled.
    pub fn commit(&mut self) -> Result<()> {
        ensure_active(self.status)?;
        if self.store.is_closed() {
            self.finish(TxStatus::Cancelled);
            return Err(LigatureError::Closed);
        }
        let mut working = std::mem::take(&mut self.working);
        working.raise_blank_high_water(self.allocator.high_water());
        let journal = std::mem::take(&mut self.journal);
        let persisted = match self
            .writer
            .as_mut()
            .and_then(|writer| writer.persistor.as_mut())
        {
            Some(persistor) => persistor.apply(&journal, working.blank_high_water()),
            None => Ok(()),
        };
        if let Err(e) = persisted {
            warn!(error = %e, changes = journal.len(), "Commit failed to persist");
            self.finish(TxStatus::Cancelled);
            return Err(e);
        }
        self.store.publish(working);
        debug!(
            changes = journal.len(),
            minted = self.allocator.minted(),
            "Committed write transaction"
        );
        self.finish(TxStatus::Committed);
        Ok(())
    }
    /// Discards every change, including minted blank entities.
    pub fn cancel(&mut self) -> Result<()> {
        ensure_active(self.status)?;
        debug!(changes = self.journal.len(), "Cancelled write transaction");
        self.finish(TxStatus::Cancelled);
        Ok(())
    }
    // Ends the transaction and lets the next writer in.
    fn finish(&mut self, status: TxStatus) {
        self.status = status;
        self.working = Snapshot::default();
        self.journal.clear();
        self.writer = None;
    }
}

impl Transaction for WriteTx<'_> {
    fn snapshot(&self) -> Result<&Snapshot> {
        ensure_active(self.status)?;
        Ok(&self.working)
    }
    fn status(&self) -> TxStatus {
        self.status
    }
}

impl Drop for WriteTx<'_> {
    fn drop(&mut self) {
        if self.status == TxStatus::Active {
            debug!(
                changes = self.journal.len(),
                "Dropped active write transaction, cancelling"
            );
            self.finish(TxStatus::Cancelled);
        }
    }
}

impl fmt::Debug for WriteTx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WriteTx")
            .field("status", &self.status)
            .field("changes", &self.journal.len())
            .field("blank_high_water", &self.allocator.high_water())
            .finish()
    }
}

fn union(found: &[Option<&RoaringTreemap>]) -> RoaringTreemap {
    let mut ids = RoaringTreemap::new();
    for set in found.iter().flatten() {
        ids |= *set;
    }
    ids
}
