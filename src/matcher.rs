//! Pattern and range matching over a collection's statements and rules.
//!
//! A pattern fixes some positions of a tuple and leaves the rest open. Each fixed position
//! is answered by one of the keeper's indexes; the answers are intersected as bitmaps, so a
//! match never walks tuples that cannot qualify. Object positions may also be constrained by
//! a [`Range`], answered by a scan over the keeper's ordered object index.

use std::marker::PhantomData;
use std::sync::Arc;

// used for internal result sets
use roaring::RoaringTreemap;

use crate::construct::{Collection, Keeper, Rule, Statement, Tuple};
use crate::value::{Entity, Node, Object, Predicate, Range};

/// One position of a pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Match<V> {
    Any,
    Exact(V),
}

impl<V: PartialEq> Match<V> {
    pub fn accepts(&self, value: &V) -> bool {
        match self {
            Match::Any => true,
            Match::Exact(v) => v == value,
        }
    }
}

impl<V> Default for Match<V> {
    fn default() -> Self {
        Match::Any
    }
}

/// The object position of a pattern.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ObjectMatch {
    #[default]
    Any,
    Exact(Object),
    Range(Range),
}

impl ObjectMatch {
    pub fn accepts(&self, object: &Object) -> bool {
        match self {
            ObjectMatch::Any => true,
            ObjectMatch::Exact(o) => o == object,
            ObjectMatch::Range(r) => object.as_literal().is_some_and(|l| r.contains(l)),
        }
    }
}

pub trait Pattern {
    type Item: Tuple;
    /// Ids of every kept tuple satisfying the pattern.
    fn select(&self, keeper: &Keeper<Self::Item>) -> RoaringTreemap;
    /// Whether a single tuple satisfies the pattern.
    fn matches(&self, tuple: &Self::Item) -> bool;
}

// A `None` selection has not been narrowed yet and stands for every kept tuple.
fn narrow(selection: &mut Option<RoaringTreemap>, found: Option<&RoaringTreemap>) {
    let narrowed = match (selection.take(), found) {
        (_, None) => RoaringTreemap::new(),
        (None, Some(ids)) => ids.clone(),
        (Some(mut current), Some(ids)) => {
            current &= ids;
            current
        }
    };
    *selection = Some(narrowed);
}

fn narrowed_to_nothing(selection: &Option<RoaringTreemap>) -> bool {
    selection.as_ref().is_some_and(|ids| ids.is_empty())
}

fn select_by<T: Tuple>(
    keeper: &Keeper<T>,
    subject: Option<&Node>,
    predicate: &Match<Predicate>,
    object: &ObjectMatch,
    context: &Match<Entity>,
) -> RoaringTreemap {
    let mut selection: Option<RoaringTreemap> = None;
    if let Some(subject) = subject {
        narrow(&mut selection, keeper.with_subject(subject));
    }
    if let Match::Exact(predicate) = predicate {
        if !narrowed_to_nothing(&selection) {
            narrow(&mut selection, keeper.with_predicate(predicate));
        }
    }
    if let Match::Exact(context) = context {
        if !narrowed_to_nothing(&selection) {
            narrow(&mut selection, keeper.with_context(context));
        }
    }
    if !narrowed_to_nothing(&selection) {
        match object {
            ObjectMatch::Any => (),
            ObjectMatch::Exact(object) => narrow(&mut selection, keeper.with_object(object)),
            ObjectMatch::Range(range) => {
                let in_range = keeper.with_object_in(range);
                narrow(&mut selection, Some(&in_range));
            }
        }
    }
    selection.unwrap_or_else(|| keeper.ids().clone())
}

// ------------- Statement patterns -------------
/// A partially specified statement. Every position starts out as a wildcard.
///
/// ```
/// use ligature::{Entity, Range, StatementPattern};
/// let valjean = Entity::named("valjean").unwrap();
/// let pattern = StatementPattern::any()
///     .subject(valjean)
///     .object_in(Range::long(24601, 24603).unwrap());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatementPattern {
    pub subject: Match<Entity>,
    pub predicate: Match<Predicate>,
    pub object: ObjectMatch,
    pub context: Match<Entity>,
}

impl StatementPattern {
    pub fn any() -> Self {
        Self::default()
    }
    pub fn subject(mut self, subject: Entity) -> Self {
        self.subject = Match::Exact(subject);
        self
    }
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Match::Exact(predicate);
        self
    }
    pub fn object<O: Into<Object>>(mut self, object: O) -> Self {
        self.object = ObjectMatch::Exact(object.into());
        self
    }
    pub fn object_in(mut self, range: Range) -> Self {
        self.object = ObjectMatch::Range(range);
        self
    }
    /// Restricts to one context. Use [`crate::DEFAULT`] for statements added without one.
    pub fn context(mut self, context: Entity) -> Self {
        self.context = Match::Exact(context);
        self
    }
}

impl Pattern for StatementPattern {
    type Item = Statement;
    fn select(&self, keeper: &Keeper<Statement>) -> RoaringTreemap {
        let subject = match &self.subject {
            Match::Any => None,
            Match::Exact(e) => Some(Node::Entity(e.clone())),
        };
        select_by(
            keeper,
            subject.as_ref(),
            &self.predicate,
            &self.object,
            &self.context,
        )
    }
    fn matches(&self, statement: &Statement) -> bool {
        self.subject.accepts(statement.subject())
            && self.predicate.accepts(statement.predicate())
            && self.object.accepts(statement.object())
            && self.context.accepts(statement.context())
    }
}

// ------------- Rule patterns -------------
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RulePattern {
    pub subject: Match<Node>,
    pub predicate: Match<Predicate>,
    pub object: ObjectMatch,
}

impl RulePattern {
    pub fn any() -> Self {
        Self::default()
    }
    pub fn subject<S: Into<Node>>(mut self, subject: S) -> Self {
        self.subject = Match::Exact(subject.into());
        self
    }
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Match::Exact(predicate);
        self
    }
    pub fn object<O: Into<Object>>(mut self, object: O) -> Self {
        self.object = ObjectMatch::Exact(object.into());
        self
    }
    pub fn object_in(mut self, range: Range) -> Self {
        self.object = ObjectMatch::Range(range);
        self
    }
}

impl Pattern for RulePattern {
    type Item = Rule;
    fn select(&self, keeper: &Keeper<Rule>) -> RoaringTreemap {
        let subject = match &self.subject {
            Match::Any => None,
            Match::Exact(n) => Some(n),
        };
        select_by(keeper, subject, &self.predicate, &self.object, &Match::Any)
    }
    fn matches(&self, rule: &Rule) -> bool {
        self.subject.accepts(rule.subject())
            && self.predicate.accepts(rule.predicate())
            && self.object.accepts(rule.object())
    }
}

// ------------- Matches -------------
/// The result of a match: a finite set of tuples that can be walked any number of times.
///
/// It holds on to the collection as it was when the match ran, so later writes in the same
/// transaction do not disturb it. Tuples come out in the order they were added.
///
/// Because of that, the next change a write transaction makes to a collection copies the
/// whole collection while a `Matches` over it is alive. Drop the result (or take
/// [`Matches::to_vec`]) before writing in a loop.
#[derive(Clone, Debug)]
pub struct Matches<T: Tuple> {
    collection: Option<Arc<Collection>>,
    ids: RoaringTreemap,
    kind: PhantomData<T>,
}

impl<T: Tuple> Matches<T> {
    pub(crate) fn empty() -> Self {
        Self {
            collection: None,
            ids: RoaringTreemap::new(),
            kind: PhantomData,
        }
    }
    pub(crate) fn new(collection: Arc<Collection>, ids: RoaringTreemap) -> Self {
        Self {
            collection: Some(collection),
            ids,
            kind: PhantomData,
        }
    }
    pub fn len(&self) -> usize {
        self.ids.len() as usize
    }
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
    pub fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        match self.collection.as_deref() {
            None => Box::new(std::iter::empty()),
            Some(collection) => {
                let keeper = T::keeper(collection);
                Box::new(
                    self.ids
                        .iter()
                        .filter_map(move |id| keeper.get(id).map(|t| t.as_ref())),
                )
            }
        }
    }
    pub fn contains(&self, tuple: &T) -> bool {
        self.iter().any(|t| t == tuple)
    }
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<'a, T: Tuple> IntoIterator for &'a Matches<T> {
    type Item = &'a T;
    type IntoIter = Box<dyn Iterator<Item = &'a T> + 'a>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Runs a pattern against one collection.
pub fn match_in<P: Pattern>(collection: &Arc<Collection>, pattern: &P) -> Matches<P::Item> {
    let ids = pattern.select(collection.keeper::<P::Item>());
    Matches::new(Arc::clone(collection), ids)
}
