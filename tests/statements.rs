mod common;

use common::{collection, entity, predicate, store};
use ligature::{DEFAULT, Literal, Rule, Statement, StatementPattern, Transaction};

#[test]
fn add_and_read_back_statements() {
    let store = store();
    let test = collection("test");
    let first = Statement::new(entity("This"), predicate("and"), entity("that"));
    let second = Statement::new(entity("This"), predicate("and"), Literal::string("that"));
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            assert!(tx.add_statement(&test, first.clone())?);
            assert!(tx.add_statement(&test, second.clone())?);
            Ok(())
        })
        .expect("write");
    let all = store.read(|tx| tx.all_statements(&test)).expect("read");
    assert_eq!(all.to_vec(), vec![first, second]);
}

#[test]
fn statements_are_a_set() {
    let store = store();
    let test = collection("test");
    let statement = Statement::new(entity("a"), predicate("b"), Literal::double(1.5));
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            assert!(tx.add_statement(&test, statement.clone())?);
            assert!(!tx.add_statement(&test, statement.clone())?);
            Ok(())
        })
        .expect("first write");
    // and across transactions
    let added = store
        .write(|tx| tx.add_statement(&test, statement.clone()))
        .expect("second write");
    assert!(!added);
    let all = store
        .read(|tx| tx.match_statements(&test, &StatementPattern::any()))
        .expect("read");
    assert_eq!(all.len(), 1);
}

#[test]
fn contexts_distinguish_statements() {
    let store = store();
    let test = collection("test");
    let plain = Statement::new(entity("a"), predicate("b"), entity("c"));
    let placed = Statement::with_context(entity("a"), predicate("b"), entity("c"), entity("ctx"));
    assert_eq!(plain.context(), &DEFAULT);
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            tx.add_statement(&test, plain.clone())?;
            tx.add_statement(&test, placed.clone())?;
            Ok(())
        })
        .expect("write");
    let all = store.read(|tx| tx.all_statements(&test)).expect("read");
    assert_eq!(all.len(), 2);
}

#[test]
fn remove_statements() {
    let store = store();
    let test = collection("test");
    let first = Statement::new(entity("This"), predicate("and"), entity("that"));
    let second = Statement::new(entity("This"), predicate("and"), Literal::long(5));
    let never = Statement::new(entity("This"), predicate("or"), Literal::long(5));
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            tx.add_statement(&test, first.clone())?;
            tx.add_statement(&test, second.clone())?;
            Ok(())
        })
        .expect("write");
    let removed = store
        .write(|tx| {
            let removed = tx.remove_statement(&test, &first)?;
            let absent = tx.remove_statement(&test, &never)?;
            Ok((removed, absent))
        })
        .expect("remove");
    assert_eq!(removed, (true, false));
    let all = store.read(|tx| tx.all_statements(&test)).expect("read");
    assert_eq!(all.to_vec(), vec![second]);
}

#[test]
fn removing_and_re_adding_moves_to_the_end() {
    let store = store();
    let test = collection("test");
    let a = Statement::new(entity("a"), predicate("p"), Literal::long(1));
    let b = Statement::new(entity("b"), predicate("p"), Literal::long(2));
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            tx.add_statement(&test, a.clone())?;
            tx.add_statement(&test, b.clone())?;
            tx.remove_statement(&test, &a)?;
            tx.add_statement(&test, a.clone())?;
            Ok(())
        })
        .expect("write");
    let all = store.read(|tx| tx.all_statements(&test)).expect("read");
    assert_eq!(all.to_vec(), vec![b, a]);
}

#[test]
fn remove_entity_takes_every_mention() {
    let store = store();
    let test = collection("test");
    let javert = entity("javert");
    let kept = Statement::new(entity("trout"), predicate("knows"), entity("valjean"));
    let kept_rule = Rule::new(predicate("knows"), predicate("is"), predicate("symmetric"));
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            tx.add_statement(&test, Statement::new(javert.clone(), predicate("knows"), entity("valjean")))?;
            tx.add_statement(&test, Statement::new(entity("valjean"), predicate("fears"), javert.clone()))?;
            tx.add_statement(
                &test,
                Statement::with_context(entity("a"), predicate("b"), Literal::long(1), javert.clone()),
            )?;
            tx.add_statement(&test, kept.clone())?;
            tx.add_rule(&test, Rule::new(javert.clone(), predicate("is"), entity("inspector")))?;
            tx.add_rule(&test, kept_rule.clone())?;
            Ok(())
        })
        .expect("write");
    let removed = store
        .write(|tx| tx.remove_entity(&test, &javert))
        .expect("remove");
    assert_eq!(removed, 4);
    store
        .read(|tx| {
            assert_eq!(tx.all_statements(&test)?.to_vec(), vec![kept.clone()]);
            assert_eq!(tx.all_rules(&test)?.to_vec(), vec![kept_rule.clone()]);
            Ok(())
        })
        .expect("read");
}

#[test]
fn remove_predicate_takes_every_use() {
    let store = store();
    let test = collection("test");
    let knows = predicate("knows");
    let kept = Statement::new(entity("trout"), predicate("fears"), entity("valjean"));
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            tx.add_statement(&test, Statement::new(entity("javert"), knows.clone(), entity("valjean")))?;
            tx.add_statement(&test, Statement::new(entity("a"), predicate("likes"), knows.clone()))?;
            tx.add_statement(&test, kept.clone())?;
            tx.add_rule(&test, Rule::new(knows.clone(), predicate("is"), predicate("symmetric")))?;
            tx.add_rule(&test, Rule::new(entity("x"), knows.clone(), entity("y")))?;
            Ok(())
        })
        .expect("write");
    let removed = store
        .write(|tx| tx.remove_predicate(&test, &knows))
        .expect("remove");
    assert_eq!(removed, 4);
    store
        .read(|tx| {
            assert_eq!(tx.all_statements(&test)?.to_vec(), vec![kept.clone()]);
            assert!(tx.all_rules(&test)?.is_empty());
            Ok(())
        })
        .expect("read");
}

#[test]
fn rules_live_beside_statements() {
    let store = store();
    let test = collection("test");
    let rule = Rule::new(predicate("parentOf"), predicate("inverseOf"), predicate("childOf"));
    store
        .write(|tx| {
            tx.create_collection(&test)?;
            assert!(tx.add_rule(&test, rule.clone())?);
            assert!(!tx.add_rule(&test, rule.clone())?);
            Ok(())
        })
        .expect("write");
    store
        .read(|tx| {
            assert_eq!(tx.all_rules(&test)?.to_vec(), vec![rule.clone()]);
            assert!(tx.all_statements(&test)?.is_empty());
            Ok(())
        })
        .expect("read");
    let removed = store
        .write(|tx| tx.remove_rule(&test, &rule))
        .expect("remove");
    assert!(removed);
    assert!(store.read(|tx| tx.all_rules(&test)).expect("read").is_empty());
}
