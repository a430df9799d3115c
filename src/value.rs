// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// so label patterns are compiled once
use lazy_static::lazy_static;
use regex::Regex;

// used to order and compare values within a kind
use std::cmp::Ordering;
// used to print out readable forms of a value
use std::fmt;
// used to indicate that values need to be hashable
use std::hash::{Hash, Hasher};
// used when parsing a rendered entity back
use std::str::FromStr;

use crate::error::{LigatureError, Result};

/// Labels starting with this prefix are reserved for entities minted by the engine.
pub const BLANK_PREFIX: &str = "_:";
const DEFAULT_LABEL: &str = "_:default";

lazy_static! {
    static ref LABEL: Regex = Regex::new(r#"^[A-Za-z_][^\s()\[\]{}<>"]*$"#).unwrap();
    static ref LANGUAGE_TAG: Regex = Regex::new(r"^[A-Za-z]{1,8}(-[A-Za-z0-9]{1,8})*$").unwrap();
}

fn validate_label(label: &str) -> Result<()> {
    if label.starts_with(BLANK_PREFIX) {
        return Err(LigatureError::invalid_label(format!(
            "'{label}' uses the reserved prefix {BLANK_PREFIX}"
        )));
    }
    if !LABEL.is_match(label) {
        return Err(LigatureError::invalid_label(format!("'{label}' is not a valid label")));
    }
    Ok(())
}

// ------------- Kinds -------------
/// The closed set of value kinds. The identifiers are stable, since they are persisted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ValueKind {
    Entity,
    Predicate,
    String,
    LangString,
    Long,
    Double,
}

impl ValueKind {
    pub fn uid(&self) -> u8 {
        match self {
            ValueKind::Entity => 1,
            ValueKind::Predicate => 2,
            ValueKind::String => 3,
            ValueKind::LangString => 4,
            ValueKind::Long => 5,
            ValueKind::Double => 6,
        }
    }
    pub fn from_uid(uid: u8) -> Option<ValueKind> {
        match uid {
            1 => Some(ValueKind::Entity),
            2 => Some(ValueKind::Predicate),
            3 => Some(ValueKind::String),
            4 => Some(ValueKind::LangString),
            5 => Some(ValueKind::Long),
            6 => Some(ValueKind::Double),
            _ => None,
        }
    }
    pub fn data_type(&self) -> &'static str {
        match self {
            ValueKind::Entity => "Entity",
            ValueKind::Predicate => "Predicate",
            ValueKind::String => "String",
            ValueKind::LangString => "LangString",
            ValueKind::Long => "Long",
            ValueKind::Double => "Double",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.data_type())
    }
}

// ------------- Entity -------------
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
enum Identity {
    Default,
    Named(String),
    Anonymous(u64),
}

/// An opaque identity. Named entities carry a caller-chosen label, anonymous ones a number
/// minted inside a write transaction. Both are immutable once created.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Entity(Identity);

/// The context used for statements added without one.
pub const DEFAULT: Entity = Entity(Identity::Default);

impl Entity {
    pub fn named<S: Into<String>>(label: S) -> Result<Entity> {
        let label = label.into();
        validate_label(&label)?;
        Ok(Entity(Identity::Named(label)))
    }
    /// Refers to an anonymous entity by its number. Fresh ones come from `WriteTx::new_entity`.
    pub fn anonymous(id: u64) -> Entity {
        Entity(Identity::Anonymous(id))
    }
    pub fn label(&self) -> Option<&str> {
        match &self.0 {
            Identity::Named(label) => Some(label),
            _ => None,
        }
    }
    pub fn anonymous_id(&self) -> Option<u64> {
        match self.0 {
            Identity::Anonymous(id) => Some(id),
            _ => None,
        }
    }
    pub fn is_default(&self) -> bool {
        self.0 == Identity::Default
    }
    pub fn is_anonymous(&self) -> bool {
        matches!(self.0, Identity::Anonymous(_))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            Identity::Default => write!(f, "{DEFAULT_LABEL}"),
            Identity::Named(label) => write!(f, "{label}"),
            Identity::Anonymous(id) => write!(f, "{BLANK_PREFIX}{id}"),
        }
    }
}

impl FromStr for Entity {
    type Err = LigatureError;
    /// Parses the rendered form produced by `Display`, reserved forms included.
    fn from_str(s: &str) -> Result<Entity> {
        if s == DEFAULT_LABEL {
            return Ok(DEFAULT);
        }
        match s.strip_prefix(BLANK_PREFIX) {
            Some(digits) => digits
                .parse::<u64>()
                .map(Entity::anonymous)
                .map_err(|_| LigatureError::invalid_label(format!("'{s}' is not a blank entity"))),
            None => Entity::named(s),
        }
    }
}

impl ToSql for Entity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}
impl FromSql for Entity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Entity::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ------------- Predicate -------------
/// A label in predicate position. Structurally a name, but kept apart from entities.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Predicate(String);

impl Predicate {
    pub fn new<S: Into<String>>(label: S) -> Result<Predicate> {
        let label = label.into();
        validate_label(&label)?;
        Ok(Predicate(label))
    }
    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for Predicate {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}
impl FromSql for Predicate {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Predicate::new(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ------------- Literals -------------
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LangLiteral {
    // field order gives the composite ordering: value first, tag second
    value: String,
    lang: String,
}

impl LangLiteral {
    pub fn new<V: Into<String>, L: Into<String>>(value: V, lang: L) -> Result<LangLiteral> {
        let lang = lang.into();
        if !LANGUAGE_TAG.is_match(&lang) {
            return Err(LigatureError::invalid_label(format!(
                "'{lang}' is not a language tag"
            )));
        }
        Ok(LangLiteral {
            value: value.into(),
            lang,
        })
    }
    pub fn value(&self) -> &str {
        &self.value
    }
    pub fn lang(&self) -> &str {
        &self.lang
    }
}

#[derive(Clone, Debug)]
pub enum Literal {
    String(String),
    LangString(LangLiteral),
    Long(i64),
    Double(f64),
}

// -0.0 and 0.0 are the same value
fn normalized(d: f64) -> f64 {
    if d == 0.0 { 0.0 } else { d }
}

impl Literal {
    pub fn string<S: Into<String>>(value: S) -> Literal {
        Literal::String(value.into())
    }
    pub fn lang_string<V: Into<String>, L: Into<String>>(value: V, lang: L) -> Result<Literal> {
        Ok(Literal::LangString(LangLiteral::new(value, lang)?))
    }
    pub fn long(value: i64) -> Literal {
        Literal::Long(value)
    }
    pub fn double(value: f64) -> Literal {
        Literal::Double(normalized(value))
    }
    pub fn kind(&self) -> ValueKind {
        match self {
            Literal::String(_) => ValueKind::String,
            Literal::LangString(_) => ValueKind::LangString,
            Literal::Long(_) => ValueKind::Long,
            Literal::Double(_) => ValueKind::Double,
        }
    }
    pub fn is_nan(&self) -> bool {
        matches!(self, Literal::Double(d) if d.is_nan())
    }
}

impl Ord for Literal {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Literal::String(a), Literal::String(b)) => a.cmp(b),
            (Literal::LangString(a), Literal::LangString(b)) => a.cmp(b),
            (Literal::Long(a), Literal::Long(b)) => a.cmp(b),
            (Literal::Double(a), Literal::Double(b)) => normalized(*a).total_cmp(&normalized(*b)),
            // kinds never interleave
            _ => self.kind().cmp(&other.kind()),
        }
    }
}
impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Literal {}
impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Literal::String(s) => s.hash(state),
            Literal::LangString(l) => l.hash(state),
            Literal::Long(i) => i.hash(state),
            Literal::Double(d) => normalized(*d).to_bits().hash(state),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::LangString(l) => write!(f, "{:?}@{}", l.value, l.lang),
            Literal::Long(i) => write!(f, "{i}"),
            Literal::Double(d) => write!(f, "{d:?}"),
        }
    }
}

// ------------- Object / Node -------------
/// Anything that may appear in object position. Ordered entities first, then predicates,
/// then literals by kind and value.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Object {
    Entity(Entity),
    Predicate(Predicate),
    Literal(Literal),
}

impl Object {
    pub fn kind(&self) -> ValueKind {
        match self {
            Object::Entity(_) => ValueKind::Entity,
            Object::Predicate(_) => ValueKind::Predicate,
            Object::Literal(l) => l.kind(),
        }
    }
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Object::Entity(e) => Some(e),
            _ => None,
        }
    }
    pub fn as_predicate(&self) -> Option<&Predicate> {
        match self {
            Object::Predicate(p) => Some(p),
            _ => None,
        }
    }
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Object::Literal(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Entity> for Object {
    fn from(e: Entity) -> Self {
        Object::Entity(e)
    }
}
impl From<Predicate> for Object {
    fn from(p: Predicate) -> Self {
        Object::Predicate(p)
    }
}
impl From<Literal> for Object {
    fn from(l: Literal) -> Self {
        Object::Literal(l)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Object::Entity(e) => write!(f, "{e}"),
            Object::Predicate(p) => write!(f, "{p}"),
            Object::Literal(l) => write!(f, "{l}"),
        }
    }
}

/// A rule subject: an entity, or a predicate label talked about as a thing.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Node {
    Entity(Entity),
    Predicate(Predicate),
}

impl From<Entity> for Node {
    fn from(e: Entity) -> Self {
        Node::Entity(e)
    }
}
impl From<Predicate> for Node {
    fn from(p: Predicate) -> Self {
        Node::Predicate(p)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Entity(e) => write!(f, "{e}"),
            Node::Predicate(p) => write!(f, "{p}"),
        }
    }
}

// ------------- Range -------------
/// A half-open interval `start <= v < end` over literals of a single kind.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Range {
    start: Literal,
    end: Literal,
}

impl Range {
    /// Fails unless both bounds share a kind, neither is NaN, and `start < end`.
    pub fn between(start: Literal, end: Literal) -> Result<Range> {
        if start.kind() != end.kind() {
            return Err(LigatureError::invalid_range(format!(
                "bounds of different kinds: {} and {}",
                start.kind(),
                end.kind()
            )));
        }
        if start.is_nan() || end.is_nan() {
            return Err(LigatureError::invalid_range("NaN cannot bound a range"));
        }
        if start >= end {
            return Err(LigatureError::invalid_range(format!(
                "start {start} is not less than end {end}"
            )));
        }
        Ok(Range { start, end })
    }
    pub fn string<S: Into<String>, E: Into<String>>(start: S, end: E) -> Result<Range> {
        Range::between(Literal::string(start), Literal::string(end))
    }
    pub fn lang_string(start: LangLiteral, end: LangLiteral) -> Result<Range> {
        Range::between(Literal::LangString(start), Literal::LangString(end))
    }
    pub fn long(start: i64, end: i64) -> Result<Range> {
        Range::between(Literal::long(start), Literal::long(end))
    }
    pub fn double(start: f64, end: f64) -> Result<Range> {
        Range::between(Literal::double(start), Literal::double(end))
    }
    pub fn kind(&self) -> ValueKind {
        self.start.kind()
    }
    pub fn start(&self) -> &Literal {
        &self.start
    }
    pub fn end(&self) -> &Literal {
        &self.end
    }
    pub fn contains(&self, literal: &Literal) -> bool {
        literal.kind() == self.kind()
            && !literal.is_nan()
            && self.start <= *literal
            && *literal < self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
