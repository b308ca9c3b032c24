mod common;

use std::rc::Rc;

use common::{count_rows, database, key, session};
use rowkeeper::RowkeeperError;
use rowkeeper::bean::Bean;
use rowkeeper::row::RowState;
use rowkeeper::value::{Columns, Value};

#[test]
fn new_chain_is_inserted_root_first_with_one_key() {
    let connection = database();
    let session = session(&connection);
    let rex = session.create("dog").unwrap();
    assert_eq!(rex.tables(), vec!["animal", "mammal", "dog"]);
    assert_eq!(rex.state(), RowState::New);
    session.set(&rex, "animal", "name", "Rex").unwrap();
    session.set(&rex, "dog", "breed", "collie").unwrap();
    session.save(&rex).unwrap();

    assert_eq!(
        session.connection().log(),
        vec!["insert animal", "insert mammal", "insert dog"]
    );
    let keys: Vec<Columns> = rex
        .rows()
        .iter()
        .map(|row| row.borrow().primary_key().clone())
        .collect();
    assert!(keys.iter().all(|k| *k == key("id", 1)));
    assert_eq!(rex.state(), RowState::Loaded);
    assert_eq!(session.pending_count(), 0);
    assert_eq!(count_rows(&connection, "dog"), 1);
}

#[test]
fn supplied_key_is_propagated_down_the_chain() {
    let connection = database();
    let session = session(&connection);
    let rex = session.create("dog").unwrap();
    session.set(&rex, "animal", "id", 42).unwrap();
    session.save(&rex).unwrap();
    for row in rex.rows() {
        assert_eq!(row.borrow().primary_key(), &key("id", 42));
    }
    let breed: Option<String> = connection
        .query_row("select breed from dog where id = 42", [], |r| r.get(0))
        .unwrap();
    assert!(breed.is_none());
}

#[test]
fn mutation_without_diffing_is_an_update() {
    let connection = database();
    let session = session(&connection);
    let rex = session.create("dog").unwrap();
    session.set(&rex, "animal", "name", "Rex").unwrap();
    session.save(&rex).unwrap();
    session.connection().clear();

    // nothing changed, nothing written
    session.save(&rex).unwrap();
    assert!(session.connection().log().is_empty());

    session.set(&rex, "animal", "name", "Rex").unwrap();
    assert_eq!(rex.state(), RowState::Dirty);
    assert!(session.is_pending(&rex, "animal"));
    session.save(&rex).unwrap();
    assert_eq!(session.connection().log(), vec!["update animal"]);
    assert_eq!(rex.state(), RowState::Loaded);
    assert!(!session.is_pending(&rex, "animal"));
}

#[test]
fn updates_run_leaf_first() {
    let connection = database();
    let session = session(&connection);
    let rex = session.create("dog").unwrap();
    session.save(&rex).unwrap();
    session.connection().clear();
    session.set(&rex, "animal", "name", "Rex").unwrap();
    session.set(&rex, "dog", "breed", "collie").unwrap();
    session.save(&rex).unwrap();
    assert_eq!(session.connection().log(), vec!["update dog", "update animal"]);
    let name: String = connection
        .query_row("select name from animal where id = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "Rex");
}

#[test]
fn composite_key_must_be_set_before_any_statement() {
    let connection = database();
    let session = session(&connection);
    let feeding = session.create("feeding").unwrap();
    session.set(&feeding, "feeding", "food", "bones").unwrap();
    let err = session.save(&feeding).unwrap_err();
    assert!(matches!(err, RowkeeperError::InvalidOperation(_)));
    assert!(session.connection().log().is_empty());
    assert_eq!(feeding.state(), RowState::New);

    let rex = session.create("animal").unwrap();
    session.save(&rex).unwrap();
    session.set(&feeding, "feeding", "animal_id", 1).unwrap();
    // one of two key columns is still not enough
    assert!(session.save(&feeding).is_err());
    session.set(&feeding, "feeding", "day", "monday").unwrap();
    session.save(&feeding).unwrap();
    assert_eq!(count_rows(&connection, "feeding"), 1);
}

#[test]
fn composite_key_can_come_from_a_reference() {
    let connection = database();
    let session = session(&connection);
    let feeding = session.create("feeding").unwrap();
    let rex = session.create("animal").unwrap();
    session.set(&feeding, "feeding", "day", "monday").unwrap();
    session.set_reference(&feeding, "feeding", "animal_id", &rex).unwrap();
    session.save(&feeding).unwrap();

    assert_eq!(
        session.connection().log(),
        vec!["insert animal", "insert feeding"]
    );
    let mut expected = key("animal_id", 1);
    expected.insert("day".to_owned(), Value::from("monday"));
    assert_eq!(feeding.primary_key(), expected);
    assert_eq!(feeding.state(), RowState::Loaded);
    assert!(session.cached_row("feeding", &expected).is_some());
    assert_eq!(count_rows(&connection, "feeding"), 1);
}

#[test]
fn unset_text_key_is_refused_instead_of_stored_as_null() {
    let connection = database();
    let session = session(&connection);
    let tag = session.create("tag").unwrap();
    session.set(&tag, "tag", "label", "urgent").unwrap();
    let err = session.save(&tag).unwrap_err();
    assert!(matches!(err, RowkeeperError::InvalidOperation(_)));
    assert_eq!(tag.state(), RowState::New);
    assert!(tag.primary_key().is_empty());
    assert_eq!(count_rows(&connection, "tag"), 0);

    session.set(&tag, "tag", "code", "urgent").unwrap();
    session.save(&tag).unwrap();
    assert_eq!(tag.primary_key(), key("code", "urgent"));
    assert_eq!(tag.state(), RowState::Loaded);
}

#[test]
fn cycle_of_new_beans_is_reported_with_its_chain() {
    let connection = database();
    let session = session(&connection);
    let husband = session.create("husband").unwrap();
    let wife = session.create("wife").unwrap();
    session.set_reference(&husband, "husband", "wife_id", &wife).unwrap();
    session.set_reference(&wife, "wife", "husband_id", &husband).unwrap();

    let err = session.save(&husband).unwrap_err();
    match &err {
        RowkeeperError::CyclicReference { chain } => {
            assert_eq!(chain, &vec!["husband.wife_id", "wife.husband_id"]);
        }
        other => panic!("expected a cyclic reference, got {:?}", other),
    }
    let message = err.to_string();
    assert!(message.contains("husband") && message.contains("wife"));
    assert!(session.connection().log().is_empty());
    assert_eq!(husband.state(), RowState::New);
    assert_eq!(wife.state(), RowState::New);
}

#[test]
fn beans_on_a_failed_cycle_can_be_freed() {
    let connection = database();
    let (husband_row, wife_row) = {
        let session = session(&connection);
        let husband = session.create("husband").unwrap();
        let wife = session.create("wife").unwrap();
        session.set_reference(&husband, "husband", "wife_id", &wife).unwrap();
        session.set_reference(&wife, "wife", "husband_id", &husband).unwrap();
        assert!(session.save(&husband).is_err());
        assert!(session.get_reference(&husband, "husband", "wife_id").unwrap().is_none());
        (
            Rc::downgrade(&husband.rows()[0]),
            Rc::downgrade(&wife.rows()[0]),
        )
    };
    assert!(husband_row.upgrade().is_none());
    assert!(wife_row.upgrade().is_none());
}

#[test]
fn referenced_new_bean_is_saved_first() {
    let connection = database();
    let session = session(&connection);
    let keeper = session.create("keeper").unwrap();
    let rex = session.create("dog").unwrap();
    session.set(&keeper, "keeper", "name", "Sam").unwrap();
    session.set_reference(&keeper, "keeper", "favourite_id", &rex).unwrap();
    session.save(&keeper).unwrap();

    assert_eq!(
        session.connection().log(),
        vec!["insert animal", "insert mammal", "insert dog", "insert keeper"]
    );
    assert_eq!(rex.state(), RowState::Loaded);
    assert_eq!(
        session.get(&keeper, "keeper", "favourite_id").unwrap(),
        session.get(&rex, "dog", "id").unwrap()
    );
    let favourite = session
        .get_reference(&keeper, "keeper", "favourite_id")
        .unwrap()
        .unwrap();
    assert!(Bean::ptr_eq(&favourite, &rex));
}

#[test]
fn reference_to_a_persisted_bean_only_copies_its_key() {
    let connection = database();
    let session = session(&connection);
    let rex = session.create("animal").unwrap();
    session.set(&rex, "animal", "id", 7).unwrap();
    session.save(&rex).unwrap();
    session.connection().clear();

    let keeper = session.create("keeper").unwrap();
    session.set_reference(&keeper, "keeper", "favourite_id", &rex).unwrap();
    session.save(&keeper).unwrap();
    assert_eq!(session.connection().log(), vec!["insert keeper"]);
    assert_eq!(
        session.get(&keeper, "keeper", "favourite_id").unwrap(),
        Value::Integer(7)
    );
}

#[test]
fn reference_must_fit_its_foreign_key() {
    let connection = database();
    let session = session(&connection);
    let keeper = session.create("keeper").unwrap();
    let husband = session.create("husband").unwrap();
    assert!(matches!(
        session.set_reference(&keeper, "keeper", "favourite_id", &husband),
        Err(RowkeeperError::InvalidOperation(_))
    ));
    assert!(matches!(
        session.set_reference(&keeper, "keeper", "nope", &husband),
        Err(RowkeeperError::Schema(_))
    ));
}

#[test]
fn persisted_primary_key_cannot_change() {
    let connection = database();
    let session = session(&connection);
    let rex = session.create("animal").unwrap();
    session.save(&rex).unwrap();
    let err = session.set(&rex, "animal", "id", 99).unwrap_err();
    assert!(matches!(err, RowkeeperError::InvalidOperation(_)));
    assert_eq!(rex.state(), RowState::Loaded);
}

#[test]
fn detached_bean_is_attached_by_save() {
    let connection = database();
    let session = session(&connection);
    let tweety = session.detached("bird").unwrap();
    session.set(&tweety, "animal", "name", "Tweety").unwrap();
    assert_eq!(tweety.state(), RowState::Detached);
    assert_eq!(session.pending_count(), 0);
    session.save(&tweety).unwrap();
    assert_eq!(tweety.state(), RowState::Loaded);
    assert_eq!(count_rows(&connection, "bird"), 1);
    assert!(matches!(
        session.attach(&tweety),
        Err(RowkeeperError::InvalidOperation(_))
    ));
}

#[test]
fn save_all_flushes_auto_saved_beans_only() {
    let connection = database();
    let session = session(&connection);
    let kept = session.create("animal").unwrap();
    let opted_out = session.create("animal").unwrap();
    session.set_auto_save(&opted_out, false);
    {
        // dropped by the caller, still owed to the database
        let forgotten = session.create("dog").unwrap();
        session.set(&forgotten, "dog", "breed", "pug").unwrap();
    }
    assert_eq!(session.pending_count(), 5);
    assert_eq!(session.save_all().unwrap(), 2);
    assert_eq!(kept.state(), RowState::Loaded);
    assert_eq!(opted_out.state(), RowState::New);
    assert_eq!(session.pending_count(), 1);
    assert_eq!(count_rows(&connection, "dog"), 1);
    assert_eq!(count_rows(&connection, "animal"), 2);
}

#[test]
fn failed_child_insert_keeps_written_rows_loaded() {
    let connection = database();
    connection
        .execute_batch(
            "
            create trigger no_bad_dogs before insert on dog
            when new.breed = 'bad'
            begin
                select raise(abort, 'bad breed');
            end;
            ",
        )
        .unwrap();
    let session = session(&connection);
    let rex = session.create("dog").unwrap();
    session.set(&rex, "dog", "breed", "bad").unwrap();
    let err = session.save(&rex).unwrap_err();
    assert!(matches!(err, RowkeeperError::Constraint(_)));

    let states: Vec<RowState> = rex.rows().iter().map(|r| r.borrow().state()).collect();
    assert_eq!(states, vec![RowState::Loaded, RowState::Loaded, RowState::New]);
    assert!(session.cached_row("animal", &key("id", 1)).is_some());
    assert!(!session.is_pending(&rex, "animal"));
    assert!(session.is_pending(&rex, "dog"));

    session.connection().clear();
    session.set(&rex, "dog", "breed", "good").unwrap();
    session.save(&rex).unwrap();
    assert_eq!(session.connection().log(), vec!["insert dog"]);
    assert_eq!(rex.state(), RowState::Loaded);
}

#[test]
fn deleted_bean_cannot_be_saved() {
    let connection = database();
    let session = session(&connection);
    let rex = session.create("animal").unwrap();
    session.save(&rex).unwrap();
    session.delete(&rex).unwrap();
    assert!(matches!(
        session.save(&rex),
        Err(RowkeeperError::InvalidOperation(_))
    ));
}
