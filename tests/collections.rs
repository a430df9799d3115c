mod common;

use common::{collection, entity, predicate, store};
use ligature::{LigatureError, Literal, Statement, Transaction};

#[test]
fn a_new_store_has_no_collections() {
    let store = store();
    let collections = store.read(|tx| tx.collections()).expect("read");
    assert!(collections.is_empty());
}

#[test]
fn create_and_list_collections() {
    let store = store();
    store
        .write(|tx| {
            tx.create_collection(&collection("test"))?;
            tx.create_collection(&collection("test2"))?;
            tx.create_collection(&collection("another"))?;
            Ok(())
        })
        .expect("write");
    let collections = store.read(|tx| tx.collections()).expect("read");
    // creation order, not name order
    assert_eq!(
        collections,
        vec![collection("test"), collection("test2"), collection("another")]
    );
}

#[test]
fn new_collections_are_empty() {
    let store = store();
    let test = collection("test");
    store
        .write(|tx| tx.create_collection(&test).map(|_| ()))
        .expect("write");
    store
        .read(|tx| {
            assert!(tx.all_statements(&test)?.is_empty());
            assert!(tx.all_rules(&test)?.is_empty());
            let view = tx.collection(&test)?.expect("collection");
            assert_eq!(view.name(), &test);
            assert!(view.is_empty());
            Ok(())
        })
        .expect("read");
}

#[test]
fn creating_an_existing_collection_keeps_its_contents() {
    let store = store();
    let test = collection("test");
    let statement = Statement::new(entity("a"), predicate("b"), Literal::long(1));
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            tx.add_statement(&test, statement.clone())
        })
        .expect("first write");
    let view = store
        .write(|tx| tx.create_collection(&test))
        .expect("second write");
    assert_eq!(view.statement_count(), 1);
    let all = store.read(|tx| tx.all_statements(&test)).expect("read");
    assert_eq!(all.to_vec(), vec![statement]);
    assert_eq!(store.read(|tx| tx.collections()).expect("read").len(), 1);
}

#[test]
fn delete_collections() {
    let store = store();
    store
        .write(|tx| {
            tx.create_collection(&collection("test"))?;
            tx.create_collection(&collection("test2"))?;
            Ok(())
        })
        .expect("create");
    let deleted = store
        .write(|tx| {
            let first = tx.delete_collection(&collection("test"))?;
            let again = tx.delete_collection(&collection("test"))?;
            Ok((first, again))
        })
        .expect("delete");
    assert_eq!(deleted, (true, false));
    let collections = store.read(|tx| tx.collections()).expect("read");
    assert_eq!(collections, vec![collection("test2")]);
}

#[test]
fn deleting_a_missing_collection_is_harmless() {
    let store = store();
    store
        .write(|tx| tx.create_collection(&collection("kept")).map(|_| ()))
        .expect("create");
    let deleted = store
        .write(|tx| tx.delete_collection(&collection("never")))
        .expect("delete");
    assert!(!deleted);
    let collections = store.read(|tx| tx.collections()).expect("read");
    assert_eq!(collections, vec![collection("kept")]);
}

#[test]
fn deleting_drops_contents() {
    let store = store();
    let test = collection("test");
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            tx.add_statement(
                &test,
                Statement::new(entity("a"), predicate("b"), entity("c")),
            )
        })
        .expect("write");
    store
        .write(|tx| {
            tx.delete_collection(&test)?;
            tx.create_collection(&test).map(|_| ())
        })
        .expect("recreate");
    let all = store.read(|tx| tx.all_statements(&test)).expect("read");
    assert!(all.is_empty());
}

#[test]
fn reads_never_create_collections() {
    let store = store();
    let missing = collection("missing");
    store
        .read(|tx| {
            assert!(tx.collection(&missing)?.is_none());
            assert!(tx.all_statements(&missing)?.is_empty());
            Ok(())
        })
        .expect("read");
    assert!(store.read(|tx| tx.collections()).expect("read").is_empty());
}

#[test]
fn mutating_a_missing_collection_is_not_found() {
    let store = store();
    let missing = collection("missing");
    let mut tx = store.write_tx().expect("write tx");
    let added = tx.add_statement(
        &missing,
        Statement::new(entity("a"), predicate("b"), entity("c")),
    );
    assert!(matches!(added, Err(LigatureError::NotFound(_))));
    assert!(matches!(
        tx.remove_entity(&missing, &entity("a")),
        Err(LigatureError::NotFound(_))
    ));
    // the transaction is still usable
    tx.create_collection(&missing).expect("create");
    tx.commit().expect("commit");
}

#[test]
fn collection_names_are_validated() {
    assert!(matches!(
        ligature::CollectionName::new(""),
        Err(LigatureError::InvalidLabel(_))
    ));
}
