// used for persistence
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};

// collection names are persisted with an integer identity
use bimap::BiMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::construct::{BlankAllocator, CollectionName, Rule, Statement, Tuple};
use crate::error::{LigatureError, Result};
use crate::store::Snapshot;
use crate::transaction::{Change, Kept};
use crate::value::{Entity, LangLiteral, Literal, Node, Object, Predicate, ValueKind};

const BLANK_HIGH_WATER: &str = "blank_high_water";

/// Keeps the committed state of a store in SQLite.
///
/// Every commit arrives as a journal of changes, which is replayed inside a single SQLite
/// transaction. Opening restores collections in creation order and tuples in the order
/// they were added.
#[derive(Debug)]
pub struct Persistor {
    db: Connection,
    collections: BiMap<CollectionName, i64>,
}

impl Persistor {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Persistor> {
        Persistor::new(Connection::open(path)?)
    }
    pub fn new(connection: Connection) -> Result<Persistor> {
        connection.execute_batch(
            "
            create table if not exists Collection (
                Collection_Identity integer primary key autoincrement,
                CollectionName text not null,
                constraint unique_CollectionName unique (
                    CollectionName
                )
            );
            create table if not exists Statement (
                Collection_Identity integer not null,
                Subject text not null,
                Predicate text not null,
                ObjectType integer not null,
                Object any not null,
                ObjectLang text not null default '',
                Context text not null,
                constraint Statement_in_Collection foreign key (
                    Collection_Identity
                ) references Collection(Collection_Identity),
                constraint unique_Statement unique (
                    Collection_Identity,
                    Subject,
                    Predicate,
                    ObjectType,
                    Object,
                    ObjectLang,
                    Context
                )
            );
            create table if not exists Rule (
                Collection_Identity integer not null,
                SubjectType integer not null,
                Subject text not null,
                Predicate text not null,
                ObjectType integer not null,
                Object any not null,
                ObjectLang text not null default '',
                constraint Rule_in_Collection foreign key (
                    Collection_Identity
                ) references Collection(Collection_Identity),
                constraint unique_Rule unique (
                    Collection_Identity,
                    SubjectType,
                    Subject,
                    Predicate,
                    ObjectType,
                    Object,
                    ObjectLang
                )
            );
            create table if not exists Meta (
                Key text primary key,
                Value any not null
            );
            ",
        )?;
        Ok(Persistor {
            db: connection,
            collections: BiMap::new(),
        })
    }

    /// Writes one commit's changes, all or nothing.
    pub fn apply(&mut self, journal: &[Change], blank_high_water: u64) -> Result<()> {
        // identities are only adopted once the sqlite transaction has committed
        let mut collections = self.collections.clone();
        let tx = self.db.transaction()?;
        for change in journal {
            match change {
                Change::CreateCollection(name) => {
                    tx.prepare_cached("insert into Collection (CollectionName) values (?)")?
                        .execute(params![name.as_str()])?;
                    collections.insert(name.clone(), tx.last_insert_rowid());
                }
                Change::DeleteCollection(name) => {
                    let id = identity(&collections, name)?;
                    tx.prepare_cached("delete from Statement where Collection_Identity = ?")?
                        .execute(params![id])?;
                    tx.prepare_cached("delete from Rule where Collection_Identity = ?")?
                        .execute(params![id])?;
                    tx.prepare_cached("delete from Collection where Collection_Identity = ?")?
                        .execute(params![id])?;
                    collections.remove_by_left(name);
                }
                Change::Add(name, Kept::Statement(s)) => {
                    let (kind, object, lang) = object_columns(s.object());
                    tx.prepare_cached(
                        "
                        insert into Statement (
                            Collection_Identity,
                            Subject,
                            Predicate,
                            ObjectType,
                            Object,
                            ObjectLang,
                            Context
                        ) values (?, ?, ?, ?, ?, ?, ?)
                        ",
                    )?
                    .execute(params![
                        identity(&collections, name)?,
                        s.subject(),
                        s.predicate(),
                        kind,
                        object,
                        lang,
                        s.context()
                    ])?;
                }
                Change::Remove(name, Kept::Statement(s)) => {
                    let (kind, object, lang) = object_columns(s.object());
                    tx.prepare_cached(
                        "
                        delete from Statement
                            where Collection_Identity = ?
                            and Subject = ?
                            and Predicate = ?
                            and ObjectType = ?
                            and Object = ?
                            and ObjectLang = ?
                            and Context = ?
                        ",
                    )?
                    .execute(params![
                        identity(&collections, name)?,
                        s.subject(),
                        s.predicate(),
                        kind,
                        object,
                        lang,
                        s.context()
                    ])?;
                }
                Change::Add(name, Kept::Rule(r)) => {
                    let (subject_kind, subject) = node_columns(r.subject());
                    let (kind, object, lang) = object_columns(r.object());
                    tx.prepare_cached(
                        "
                        insert into Rule (
                            Collection_Identity,
                            SubjectType,
                            Subject,
                            Predicate,
                            ObjectType,
                            Object,
                            ObjectLang
                        ) values (?, ?, ?, ?, ?, ?, ?)
                        ",
                    )?
                    .execute(params![
                        identity(&collections, name)?,
                        subject_kind,
                        subject,
                        r.predicate(),
                        kind,
                        object,
                        lang
                    ])?;
                }
                Change::Remove(name, Kept::Rule(r)) => {
                    let (subject_kind, subject) = node_columns(r.subject());
                    let (kind, object, lang) = object_columns(r.object());
                    tx.prepare_cached(
                        "
                        delete from Rule
                            where Collection_Identity = ?
                            and SubjectType = ?
                            and Subject = ?
                            and Predicate = ?
                            and ObjectType = ?
                            and Object = ?
                            and ObjectLang = ?
                        ",
                    )?
                    .execute(params![
                        identity(&collections, name)?,
                        subject_kind,
                        subject,
                        r.predicate(),
                        kind,
                        object,
                        lang
                    ])?;
                }
            }
        }
        tx.prepare_cached("insert or replace into Meta (Key, Value) values (?, ?)")?
            .execute(params![BLANK_HIGH_WATER, blank_high_water as i64])?;
        tx.commit()?;
        self.collections = collections;
        debug!(changes = journal.len(), "Persisted commit");
        Ok(())
    }

    /// Rebuilds the committed state from the database.
    pub fn restore(&mut self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        let mut collections = BiMap::new();
        // anonymous entities found on disk bound the high-water mark from below
        let mut allocator = BlankAllocator::starting_after(self.stored_high_water()?);
        {
            let mut query = self.db.prepare(
                "
                select Collection_Identity, CollectionName
                    from Collection
                    order by Collection_Identity
                ",
            )?;
            let mut rows = query.query([])?;
            while let Some(row) = rows.next()? {
                let id: i64 = row.get(0)?;
                let name = CollectionName::new(row.get::<_, String>(1)?)?;
                snapshot.create_collection(&name);
                collections.insert(name, id);
            }
        }
        let mut statements = 0;
        {
            let mut query = self.db.prepare(
                "
                select Collection_Identity, Subject, Predicate, ObjectType, Object, ObjectLang, Context
                    from Statement
                    order by rowid
                ",
            )?;
            let mut rows = query.query([])?;
            while let Some(row) = rows.next()? {
                let name = collection_named(&collections, row.get(0)?)?;
                let statement = Statement::with_context(
                    row.get::<_, Entity>(1)?,
                    row.get::<_, Predicate>(2)?,
                    object_from_columns(row.get(3)?, row.get_ref(4)?, row.get(5)?)?,
                    row.get::<_, Entity>(6)?,
                );
                keep(&mut snapshot, &mut allocator, name, statement)?;
                statements += 1;
            }
        }
        let mut rules = 0;
        {
            let mut query = self.db.prepare(
                "
                select Collection_Identity, SubjectType, Subject, Predicate, ObjectType, Object, ObjectLang
                    from Rule
                    order by rowid
                ",
            )?;
            let mut rows = query.query([])?;
            while let Some(row) = rows.next()? {
                let name = collection_named(&collections, row.get(0)?)?;
                let rule = Rule::new(
                    node_from_columns(row.get(1)?, row.get(2)?)?,
                    row.get::<_, Predicate>(3)?,
                    object_from_columns(row.get(4)?, row.get_ref(5)?, row.get(6)?)?,
                );
                keep(&mut snapshot, &mut allocator, name, rule)?;
                rules += 1;
            }
        }
        snapshot.raise_blank_high_water(allocator.high_water());
        self.collections = collections;
        debug!(
            collections = snapshot.collection_count(),
            statements,
            rules,
            blank_high_water = snapshot.blank_high_water(),
            "Restored store"
        );
        Ok(snapshot)
    }

    fn stored_high_water(&self) -> Result<u64> {
        let stored: Option<i64> = self
            .db
            .query_row(
                "select Value from Meta where Key = ?",
                params![BLANK_HIGH_WATER],
                |r| r.get(0),
            )
            .optional()?;
        Ok(stored.unwrap_or(0) as u64)
    }
}

fn keep<T: Tuple>(
    snapshot: &mut Snapshot,
    allocator: &mut BlankAllocator,
    name: &CollectionName,
    tuple: T,
) -> Result<()> {
    for entity in tuple.entities() {
        allocator.retain(entity);
    }
    snapshot.collection_mut(name)?.keeper_mut::<T>().keep(tuple);
    Ok(())
}

fn identity(collections: &BiMap<CollectionName, i64>, name: &CollectionName) -> Result<i64> {
    collections
        .get_by_left(name)
        .copied()
        .ok_or_else(|| LigatureError::corruption(format!("collection '{name}' was never persisted")))
}

fn collection_named(collections: &BiMap<CollectionName, i64>, id: i64) -> Result<&CollectionName> {
    collections
        .get_by_right(&id)
        .ok_or_else(|| LigatureError::corruption(format!("no collection with identity {id}")))
}

// ------------- Column packing -------------
// Objects take three columns: the kind's uid, the payload and a language tag (empty unless
// the object is a language string). Sqlite turns NaN into null, so doubles are kept as
// their bit pattern.
fn object_columns(object: &Object) -> (u8, Value, &str) {
    let kind = object.kind().uid();
    match object {
        Object::Entity(e) => (kind, Value::Text(e.to_string()), ""),
        Object::Predicate(p) => (kind, Value::Text(p.label().to_string()), ""),
        Object::Literal(Literal::String(s)) => (kind, Value::Text(s.clone()), ""),
        Object::Literal(Literal::LangString(l)) => {
            (kind, Value::Text(l.value().to_string()), l.lang())
        }
        Object::Literal(Literal::Long(i)) => (kind, Value::Integer(*i), ""),
        Object::Literal(Literal::Double(d)) => (kind, Value::Integer(d.to_bits() as i64), ""),
    }
}

fn object_from_columns(uid: u8, value: ValueRef<'_>, lang: String) -> Result<Object> {
    let kind = ValueKind::from_uid(uid)
        .ok_or_else(|| LigatureError::corruption(format!("unknown object type {uid}")))?;
    let unreadable =
        |e: rusqlite::types::FromSqlError| LigatureError::corruption(format!("{kind} object: {e}"));
    let object = match kind {
        ValueKind::Entity => Object::Entity(Entity::from_str(value.as_str().map_err(unreadable)?)?),
        ValueKind::Predicate => Object::Predicate(Predicate::new(value.as_str().map_err(unreadable)?)?),
        ValueKind::String => Literal::string(value.as_str().map_err(unreadable)?).into(),
        ValueKind::LangString => {
            Literal::LangString(LangLiteral::new(value.as_str().map_err(unreadable)?, lang)?).into()
        }
        ValueKind::Long => Literal::long(value.as_i64().map_err(unreadable)?).into(),
        ValueKind::Double => {
            Literal::double(f64::from_bits(value.as_i64().map_err(unreadable)? as u64)).into()
        }
    };
    Ok(object)
}

fn node_columns(node: &Node) -> (u8, String) {
    match node {
        Node::Entity(e) => (ValueKind::Entity.uid(), e.to_string()),
        Node::Predicate(p) => (ValueKind::Predicate.uid(), p.label().to_string()),
    }
}

fn node_from_columns(uid: u8, label: String) -> Result<Node> {
    match ValueKind::from_uid(uid) {
        Some(ValueKind::Entity) => Ok(Node::Entity(Entity::from_str(&label)?)),
        Some(ValueKind::Predicate) => Ok(Node::Predicate(Predicate::new(label)?)),
        _ => Err(LigatureError::corruption(format!(
            "a rule subject cannot have type {uid}"
        ))),
    }
}
