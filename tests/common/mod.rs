#![allow(dead_code)]

use ligature::{CollectionName, Entity, Predicate, Store};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn store() -> Store {
    init_tracing();
    Store::in_memory()
}

pub fn collection(name: &str) -> CollectionName {
    CollectionName::new(name).expect("collection name")
}

pub fn entity(label: &str) -> Entity {
    Entity::named(label).expect("entity label")
}

pub fn predicate(label: &str) -> Predicate {
    Predicate::new(label).expect("predicate label")
}
