use std::sync::Arc;

// keepers use hash maps for ownership and deduplication
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

// ordered index over objects, used for range scans
use std::ops::Bound;

// used for internal id sets
use roaring::RoaringTreemap;

// used to print out readable forms of a construct
use std::fmt;

use crate::error::{LigatureError, Result};
use crate::value::{DEFAULT, Entity, Node, Object, Predicate, Range};

pub type TupleId = u64;
pub type KeeperHasher = BuildHasherDefault<SeaHasher>;

// ------------- Blank entities -------------
/// Mints anonymous entities for a single write transaction.
///
/// The counter is shared by all collections and starts right after the store's committed
/// high-water mark, so a fresh store hands out `1, 2, 3, ...` and a cancelled transaction
/// leaves no gap behind.
#[derive(Debug, Clone)]
pub struct BlankAllocator {
    lower_bound: u64,
    minted: u64,
}

impl BlankAllocator {
    pub fn starting_after(high_water: u64) -> Self {
        Self {
            lower_bound: high_water,
            minted: 0,
        }
    }
    // Anonymous entities may be referenced explicitly, for example when re-adding a
    // statement read back from the store. Those numbers must never be minted again.
    pub fn retain(&mut self, entity: &Entity) {
        if let Some(id) = entity.anonymous_id() {
            if id > self.lower_bound {
                self.lower_bound = id;
            }
        }
    }
    pub fn generate(&mut self) -> Result<Entity> {
        self.lower_bound = self
            .lower_bound
            .checked_add(1)
            .ok_or(LigatureError::BlanksExhausted(self.lower_bound))?;
        self.minted += 1;
        Ok(Entity::anonymous(self.lower_bound))
    }
    pub fn high_water(&self) -> u64 {
        self.lower_bound
    }
    pub fn minted(&self) -> u64 {
        self.minted
    }
}

// ------------- Collection names -------------
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn new<S: Into<String>>(name: S) -> Result<CollectionName> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_control) {
            return Err(LigatureError::invalid_label(format!(
                "{name:?} is not a collection name"
            )));
        }
        Ok(CollectionName(name))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for CollectionName {
    type Error = LigatureError;
    fn try_from(name: &str) -> Result<Self> {
        CollectionName::new(name)
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ------------- Statement -------------
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Statement {
    subject: Entity,
    predicate: Predicate,
    object: Object,
    context: Entity,
}

impl Statement {
    /// A statement in the default context.
    pub fn new<O: Into<Object>>(subject: Entity, predicate: Predicate, object: O) -> Statement {
        Statement::with_context(subject, predicate, object, DEFAULT)
    }
    pub fn with_context<O: Into<Object>>(
        subject: Entity,
        predicate: Predicate,
        object: O,
        context: Entity,
    ) -> Statement {
        Self {
            subject,
            predicate,
            object: object.into(),
            context,
        }
    }
    pub fn subject(&self) -> &Entity {
        &self.subject
    }
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
    pub fn object(&self) -> &Object {
        &self.object
    }
    pub fn context(&self) -> &Entity {
        &self.context
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({} {} {} {})",
            self.subject, self.predicate, self.object, self.context
        )
    }
}

// ------------- Rule -------------
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Rule {
    subject: Node,
    predicate: Predicate,
    object: Object,
}

impl Rule {
    pub fn new<S: Into<Node>, O: Into<Object>>(subject: S, predicate: Predicate, object: O) -> Rule {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
        }
    }
    pub fn subject(&self) -> &Node {
        &self.subject
    }
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
    pub fn object(&self) -> &Object {
        &self.object
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

// ------------- Tuple -------------
/// What the keepers and the matcher need to know about statements and rules.
pub trait Tuple: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static {
    const TUPLE: &'static str;
    fn subject_node(&self) -> Node;
    fn predicate(&self) -> &Predicate;
    fn object(&self) -> &Object;
    fn context(&self) -> Option<&Entity> {
        None
    }
    fn keeper(collection: &Collection) -> &Keeper<Self>;
    fn keeper_mut(collection: &mut Collection) -> &mut Keeper<Self>;
    /// Every entity the tuple refers to, in any position.
    fn entities(&self) -> Vec<&Entity> {
        let mut entities = Vec::new();
        if let Some(e) = self.object().as_entity() {
            entities.push(e);
        }
        if let Some(c) = self.context() {
            entities.push(c);
        }
        entities
    }
}

impl Tuple for Statement {
    const TUPLE: &'static str = "statement";
    fn subject_node(&self) -> Node {
        Node::Entity(self.subject.clone())
    }
    fn predicate(&self) -> &Predicate {
        &self.predicate
    }
    fn object(&self) -> &Object {
        &self.object
    }
    fn context(&self) -> Option<&Entity> {
        Some(&self.context)
    }
    fn keeper(collection: &Collection) -> &Keeper<Self> {
        &collection.statements
    }
    fn keeper_mut(collection: &mut Collection) -> &mut Keeper<Self> {
        &mut collection.statements
    }
    fn entities(&self) -> Vec<&Entity> {
        let mut entities = vec![&self.subject, &self.context];
        if let Some(e) = self.object.as_entity() {
            entities.push(e);
        }
        entities
    }
}

impl Tuple for Rule {
    const TUPLE: &'static str = "rule";
    fn subject_node(&self) -> Node {
        self.subject.clone()
    }
    fn predicate(&self) -> &Predicate {
        &self.predicate
    }
    fn object(&self) -> &Object {
        &self.object
    }
    fn keeper(collection: &Collection) -> &Keeper<Self> {
        &collection.rules
    }
    fn keeper_mut(collection: &mut Collection) -> &mut Keeper<Self> {
        &mut collection.rules
    }
    fn entities(&self) -> Vec<&Entity> {
        let mut entities = Vec::new();
        if let Node::Entity(e) = &self.subject {
            entities.push(e);
        }
        if let Some(e) = self.object.as_entity() {
            entities.push(e);
        }
        entities
    }
}

// ------------- Lookups -------------
#[derive(Debug, Clone)]
pub struct Lookup<K: Eq + Hash> {
    index: HashMap<K, RoaringTreemap, KeeperHasher>,
}
impl<K: Eq + Hash> Lookup<K> {
    pub fn new() -> Self {
        Self {
            index: HashMap::default(),
        }
    }
    pub fn insert(&mut self, key: K, id: TupleId) {
        self.index.entry(key).or_default().insert(id);
    }
    pub fn remove(&mut self, key: &K, id: TupleId) {
        if let Some(ids) = self.index.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.index.remove(key);
            }
        }
    }
    pub fn lookup(&self, key: &K) -> Option<&RoaringTreemap> {
        self.index.get(key)
    }
}
impl<K: Eq + Hash> Default for Lookup<K> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Keeper -------------
/// Owns the distinct tuples of one kind in one collection and indexes them by position.
///
/// Every kept tuple gets an id from a counter local to the keeper; ids are never reused, so
/// iterating `by_id` walks the tuples in insertion order.
#[derive(Debug, Clone)]
pub struct Keeper<T: Tuple> {
    kept: HashMap<Arc<T>, TupleId, KeeperHasher>,
    by_id: BTreeMap<TupleId, Arc<T>>,
    all: RoaringTreemap,
    subjects: Lookup<Node>,
    predicates: Lookup<Predicate>,
    contexts: Lookup<Entity>,
    objects: BTreeMap<Object, RoaringTreemap>,
    next_id: TupleId,
}

impl<T: Tuple> Keeper<T> {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
            by_id: BTreeMap::new(),
            all: RoaringTreemap::new(),
            subjects: Lookup::new(),
            predicates: Lookup::new(),
            contexts: Lookup::new(),
            objects: BTreeMap::new(),
            next_id: 0,
        }
    }
    pub fn keep(&mut self, tuple: T) -> (Arc<T>, bool) {
        match self.kept.entry(Arc::new(tuple)) {
            Entry::Occupied(e) => (Arc::clone(e.key()), true),
            Entry::Vacant(e) => {
                self.next_id += 1;
                let id = self.next_id;
                let keepsake = Arc::clone(e.key());
                e.insert(id);
                self.subjects.insert(keepsake.subject_node(), id);
                self.predicates.insert(keepsake.predicate().clone(), id);
                if let Some(context) = keepsake.context() {
                    self.contexts.insert(context.clone(), id);
                }
                self.objects
                    .entry(keepsake.object().clone())
                    .or_default()
                    .insert(id);
                self.all.insert(id);
                self.by_id.insert(id, Arc::clone(&keepsake));
                (keepsake, false)
            }
        }
    }
    pub fn release(&mut self, tuple: &T) -> Option<Arc<T>> {
        let id = *self.kept.get(tuple)?;
        self.release_id(id)
    }
    pub fn release_all(&mut self, ids: &RoaringTreemap) -> Vec<Arc<T>> {
        ids.iter().filter_map(|id| self.release_id(id)).collect()
    }
    fn release_id(&mut self, id: TupleId) -> Option<Arc<T>> {
        let released = self.by_id.remove(&id)?;
        self.kept.remove(&released);
        self.all.remove(id);
        self.subjects.remove(&released.subject_node(), id);
        self.predicates.remove(released.predicate(), id);
        if let Some(context) = released.context() {
            self.contexts.remove(context, id);
        }
        if let Some(ids) = self.objects.get_mut(released.object()) {
            ids.remove(id);
            if ids.is_empty() {
                self.objects.remove(released.object());
            }
        }
        Some(released)
    }
    pub fn contains(&self, tuple: &T) -> bool {
        self.kept.contains_key(tuple)
    }
    pub fn get(&self, id: TupleId) -> Option<&Arc<T>> {
        self.by_id.get(&id)
    }
    pub fn len(&self) -> usize {
        self.by_id.len()
    }
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
    pub fn ids(&self) -> &RoaringTreemap {
        &self.all
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.by_id.values()
    }
    // index accessors used by the matcher, an absent key means no tuple has it
    pub fn with_subject(&self, subject: &Node) -> Option<&RoaringTreemap> {
        self.subjects.lookup(subject)
    }
    pub fn with_predicate(&self, predicate: &Predicate) -> Option<&RoaringTreemap> {
        self.predicates.lookup(predicate)
    }
    pub fn with_context(&self, context: &Entity) -> Option<&RoaringTreemap> {
        self.contexts.lookup(context)
    }
    pub fn with_object(&self, object: &Object) -> Option<&RoaringTreemap> {
        self.objects.get(object)
    }
    pub fn with_object_in(&self, range: &Range) -> RoaringTreemap {
        // objects are ordered by kind first, so the scan never leaves the range's kind
        let lower = Object::Literal(range.start().clone());
        let upper = Object::Literal(range.end().clone());
        let mut ids = RoaringTreemap::new();
        for (object, found) in self
            .objects
            .range((Bound::Included(lower), Bound::Excluded(upper)))
        {
            if object.as_literal().is_some_and(|l| range.contains(l)) {
                ids |= found;
            }
        }
        ids
    }
}

impl<T: Tuple> Default for Keeper<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Collection -------------
/// A named container of statements and rules, as seen by one transaction.
#[derive(Debug, Clone)]
pub struct Collection {
    name: CollectionName,
    created: u64,
    statements: Keeper<Statement>,
    rules: Keeper<Rule>,
}

impl Collection {
    pub(crate) fn new(name: CollectionName, created: u64) -> Self {
        Self {
            name,
            created,
            statements: Keeper::new(),
            rules: Keeper::new(),
        }
    }
    pub fn name(&self) -> &CollectionName {
        &self.name
    }
    /// Position in the store's creation order.
    pub fn created(&self) -> u64 {
        self.created
    }
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.rules.is_empty()
    }
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter().map(|s| s.as_ref())
    }
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }
    pub fn keeper<T: Tuple>(&self) -> &Keeper<T> {
        T::keeper(self)
    }
    pub(crate) fn keeper_mut<T: Tuple>(&mut self) -> &mut Keeper<T> {
        T::keeper_mut(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Literal;

    fn named(label: &str) -> Entity {
        Entity::named(label).unwrap()
    }

    fn predicate(label: &str) -> Predicate {
        Predicate::new(label).unwrap()
    }

    #[test]
    fn allocator_counts_from_the_high_water_mark() {
        let mut allocator = BlankAllocator::starting_after(0);
        assert_eq!(allocator.generate().unwrap(), Entity::anonymous(1));
        assert_eq!(allocator.generate().unwrap(), Entity::anonymous(2));
        let mut next = BlankAllocator::starting_after(allocator.high_water());
        assert_eq!(next.generate().unwrap(), Entity::anonymous(3));
        assert_eq!(next.minted(), 1);
    }

    #[test]
    fn allocator_skips_retained_numbers() {
        let mut allocator = BlankAllocator::starting_after(0);
        allocator.retain(&Entity::anonymous(7));
        allocator.retain(&named("seven"));
        assert_eq!(allocator.generate().unwrap(), Entity::anonymous(8));
    }

    #[test]
    fn allocator_refuses_to_wrap_around() {
        let mut allocator = BlankAllocator::starting_after(u64::MAX - 1);
        assert_eq!(allocator.generate().unwrap(), Entity::anonymous(u64::MAX));
        assert!(matches!(
            allocator.generate(),
            Err(LigatureError::BlanksExhausted(u64::MAX))
        ));
        assert_eq!(allocator.high_water(), u64::MAX);
    }

    #[test]
    fn keeper_deduplicates() {
        let mut keeper = Keeper::<Statement>::new();
        let s = Statement::new(named("a"), predicate("knows"), named("b"));
        let (first, previously_kept) = keeper.keep(s.clone());
        assert!(!previously_kept);
        let (second, previously_kept) = keeper.keep(s.clone());
        assert!(previously_kept);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(keeper.len(), 1);
    }

    #[test]
    fn keeper_release_cleans_indexes() {
        let mut keeper = Keeper::<Statement>::new();
        let s = Statement::new(named("a"), predicate("age"), Literal::long(3));
        keeper.keep(s.clone());
        assert!(keeper.release(&s).is_some());
        assert!(keeper.release(&s).is_none());
        assert!(keeper.is_empty());
        assert!(keeper.with_predicate(&predicate("age")).is_none());
        assert!(keeper.with_object(&Literal::long(3).into()).is_none());
        assert!(keeper.ids().is_empty());
    }

    #[test]
    fn keeper_iterates_in_insertion_order() {
        let mut keeper = Keeper::<Rule>::new();
        for label in ["c", "a", "b"] {
            keeper.keep(Rule::new(named(label), predicate("p"), named("x")));
        }
        let subjects: Vec<String> = keeper.iter().map(|r| r.subject().to_string()).collect();
        assert_eq!(subjects, vec!["c", "a", "b"]);
    }

    #[test]
    fn collection_names_are_validated() {
        assert!(CollectionName::new("test").is_ok());
        assert!(CollectionName::new("").is_err());
        assert!(CollectionName::try_from("tab\there").is_err());
    }
}
