//! Ligature: a transactional, collection-scoped quad store.
//!
//! A store holds named *collections*. Each collection is a set of *statements*
//! `(subject, predicate, object, context)` and a set of *rules* `(subject, predicate, object)`:
//! * An [`Entity`] is an opaque identity, either named by a label or blank (minted by a write
//!   transaction). The distinguished [`DEFAULT`] entity is the context of statements added
//!   without one.
//! * A [`Predicate`] is a label in predicate position.
//! * An [`Object`] is an entity, a predicate or a [`Literal`] (string, language string, long
//!   or double).
//!
//! Statements and rules are owned and deduplicated by "keeper" structures (see the
//! [`construct`] module), which also index them by position so that [`matcher`] patterns are
//! answered by intersecting bitmaps.
//!
//! ## Transactions
//! Everything goes through a transaction. Any number of [`ReadTx`] may run at once, each on
//! the snapshot that was committed when it opened. At most one [`WriteTx`] is active at a
//! time; its changes become visible atomically on commit and vanish on cancel.
//!
//! ## Persistence
//! A store opened with a [`StoreConfig`] naming a file keeps its committed state in SQLite
//! through the [`persist::Persistor`]; without a file it lives in memory.
//!
//! ## Quick Start
//! ```
//! use ligature::{CollectionName, Entity, Literal, Predicate, Range, Statement,
//!     StatementPattern, Store, Transaction};
//! let store = Store::in_memory();
//! let test = CollectionName::new("test").unwrap();
//! store.write(|tx| {
//!     tx.create_collection(&test)?;
//!     let prisoner = Predicate::new("prisonerNumber")?;
//!     tx.add_statement(&test, Statement::new(Entity::named("valjean")?, prisoner.clone(), Literal::long(24601)))?;
//!     tx.add_statement(&test, Statement::new(Entity::named("javert")?, prisoner, Literal::long(24602)))?;
//!     Ok(())
//! }).unwrap();
//! let found = store.read(|tx| {
//!     tx.match_statements(&test, &StatementPattern::any().object_in(Range::long(24601, 24602)?))
//! }).unwrap();
//! assert_eq!(found.len(), 1);
//! ```

pub mod config;
pub mod construct;
pub mod error;
pub mod matcher;
pub mod persist;
pub mod store;
pub mod transaction;
pub mod value;

pub use crate::config::StoreConfig;
pub use crate::construct::{Collection, CollectionName, Rule, Statement};
pub use crate::error::{LigatureError, Result};
pub use crate::matcher::{Match, Matches, ObjectMatch, RulePattern, StatementPattern};
pub use crate::store::{Snapshot, Store};
pub use crate::transaction::{ReadTx, Transaction, TxStatus, WriteTx};
pub use crate::value::{
    DEFAULT, Entity, LangLiteral, Literal, Node, Object, Predicate, Range, ValueKind,
};
