mod common;

use common::{database, key, session};
use rowkeeper::RowkeeperError;
use rowkeeper::bean::Bean;
use rowkeeper::row::RowState;
use rowkeeper::value::Value;

#[test]
fn find_one_by_matches_on_plain_columns() {
    let connection = database();
    connection
        .execute_batch(
            "insert into animal (id, name) values (1, 'Ada');
             insert into animal (id, name) values (2, 'Ada');
             insert into animal (id, name) values (3, 'Grace');",
        )
        .unwrap();
    let session = session(&connection);

    let grace = session
        .find_one_by("animal", &key("name", "Grace"))
        .unwrap()
        .unwrap();
    assert_eq!(grace.primary_key(), key("id", 3));
    assert_eq!(grace.state(), RowState::Loaded);
    // the fetched columns are kept, no second round trip
    session.get(&grace, "animal", "name").unwrap();
    assert_eq!(session.connection().count("fetch"), 1);

    assert!(session.find_one_by("animal", &key("name", "Nobody")).unwrap().is_none());

    match session.find_one_by("animal", &key("name", "Ada")) {
        Err(RowkeeperError::DuplicateRow { table, filter }) => {
            assert_eq!(table, "animal");
            assert!(filter.contains("Ada"));
        }
        other => panic!("expected a duplicate row, got {:?}", other),
    }
}

#[test]
fn find_one_by_returns_the_live_instance() {
    let connection = database();
    let session = session(&connection);
    let rex = session.create("animal").unwrap();
    session.set(&rex, "animal", "name", "Rex").unwrap();
    session.save(&rex).unwrap();
    let found = session
        .find_one_by("animal", &key("name", "Rex"))
        .unwrap()
        .unwrap();
    assert!(Bean::ptr_eq(&found, &rex));
}

#[test]
fn null_reference_is_none() {
    let connection = database();
    connection
        .execute("insert into keeper (id, name) values (1, 'Sam')", [])
        .unwrap();
    let session = session(&connection);
    let sam = session.find("keeper", key("id", 1)).unwrap();
    assert!(session.get_reference(&sam, "keeper", "favourite_id").unwrap().is_none());
}

#[test]
fn stored_reference_is_found_lazily() {
    let connection = database();
    connection
        .execute_batch(
            "insert into animal (id, name) values (4, 'Rex');
             insert into keeper (id, name, favourite_id) values (1, 'Sam', 4);",
        )
        .unwrap();
    let session = session(&connection);
    let sam = session.find("keeper", key("id", 1)).unwrap();
    let rex = session
        .get_reference(&sam, "keeper", "favourite_id")
        .unwrap()
        .unwrap();
    assert_eq!(rex.primary_key(), key("id", 4));
    assert_eq!(rex.state(), RowState::NotLoaded);
    assert_eq!(session.get(&rex, "animal", "name").unwrap(), Value::from("Rex"));
}

#[test]
fn pending_reference_is_returned_before_saving() {
    let connection = database();
    let session = session(&connection);
    let keeper = session.create("keeper").unwrap();
    let rex = session.create("dog").unwrap();
    session.set_reference(&keeper, "keeper", "favourite_id", &rex).unwrap();
    let pending = session
        .get_reference(&keeper, "keeper", "favourite_id")
        .unwrap()
        .unwrap();
    assert!(Bean::ptr_eq(&pending, &rex));
}

#[test]
fn join_path_follows_keys_both_ways() {
    let connection = database();
    let session = session(&connection);
    let path = session.topology().join_path("keeper", "dog").unwrap();
    let hops: Vec<String> = path.iter().map(|fk| fk.to_string()).collect();
    assert_eq!(hops.len(), 3);
    assert_eq!(path[0].table, "keeper");
    assert_eq!(path[2].table, "dog");

    assert!(matches!(
        session.topology().join_path("animal", "husband"),
        Err(RowkeeperError::InvalidOperation(_))
    ));
}

#[test]
fn introspected_schema_knows_the_chain() {
    let connection = database();
    let session = session(&connection);
    let topology = session.topology();
    assert_eq!(topology.ancestors("dog").unwrap(), vec!["animal", "mammal", "dog"]);
    assert_eq!(
        topology.link_chain(&["dog", "animal"]).unwrap(),
        vec!["animal", "mammal", "dog"]
    );
    assert!(matches!(
        topology.link_chain(&["dog", "bird"]),
        Err(RowkeeperError::Inheritance { .. })
    ));
    assert!(matches!(
        session.create("keeper").unwrap().state(),
        RowState::New
    ));
}
