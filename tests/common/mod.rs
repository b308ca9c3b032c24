#![allow(dead_code)]

use std::cell::RefCell;

use rowkeeper::connection::Connection;
use rowkeeper::persist::Persistor;
use rowkeeper::schema::StaticSchema;
use rowkeeper::session::Session;
use rowkeeper::settings::EngineConfig;
use rowkeeper::value::{Columns, Value};
use rowkeeper::Result;

// animal <- mammal <- dog is the inheritance chain; the rest are plain references
pub const SCHEMA: &str = "
    create table animal (
        id integer primary key,
        name text
    );
    create table mammal (
        id integer primary key references animal(id),
        legs integer
    );
    create table dog (
        id integer primary key references mammal(id),
        breed text
    );
    create table bird (
        id integer primary key references animal(id),
        wingspan real
    );
    create table keeper (
        id integer primary key,
        name text,
        favourite_id integer references animal(id)
    );
    create table feeding (
        animal_id integer not null references animal(id),
        day text not null,
        food text,
        primary key (animal_id, day)
    );
    create table husband (
        id integer primary key,
        wife_id integer references wife(id)
    );
    create table wife (
        id integer primary key,
        husband_id integer references husband(id)
    );
    create table tag (
        code text primary key,
        label text
    );
";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn database() -> rusqlite::Connection {
    let connection = rusqlite::Connection::open_in_memory().unwrap();
    connection.execute_batch(SCHEMA).unwrap();
    connection
}

/// Passes every call through to SQLite and keeps a log of the writes.
pub struct Recording<'db> {
    inner: Persistor<'db>,
    log: RefCell<Vec<String>>,
}

impl<'db> Recording<'db> {
    pub fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
    pub fn count(&self, prefix: &str) -> usize {
        self.log.borrow().iter().filter(|l| l.starts_with(prefix)).count()
    }
}

impl<'db> Connection for Recording<'db> {
    fn insert(&self, table: &str, columns: &Columns) -> Result<Option<Value>> {
        self.log.borrow_mut().push(format!("insert {}", table));
        self.inner.insert(table, columns)
    }
    fn update(&self, table: &str, columns: &Columns, primary_key: &Columns) -> Result<()> {
        self.log.borrow_mut().push(format!("update {}", table));
        self.inner.update(table, columns, primary_key)
    }
    fn delete(&self, table: &str, primary_key: &Columns) -> Result<()> {
        self.log.borrow_mut().push(format!("delete {}", table));
        self.inner.delete(table, primary_key)
    }
    fn fetch_one_by_primary_key(&self, table: &str, primary_key: &Columns) -> Result<Option<Columns>> {
        self.log.borrow_mut().push(format!("fetch {}", table));
        self.inner.fetch_one_by_primary_key(table, primary_key)
    }
    fn fetch_by_columns(&self, table: &str, filter: &Columns) -> Result<Vec<Columns>> {
        self.log.borrow_mut().push(format!("fetch {}", table));
        self.inner.fetch_by_columns(table, filter)
    }
}

pub type TestSession<'db> = Session<Recording<'db>, StaticSchema>;

pub fn session(connection: &rusqlite::Connection) -> TestSession<'_> {
    init_tracing();
    let persistor = Persistor::new(connection).unwrap();
    let schema = persistor.schema().unwrap();
    let recording = Recording {
        inner: persistor,
        log: RefCell::new(Vec::new()),
    };
    Session::new(recording, schema, EngineConfig::default())
}

pub fn key(column: &str, value: impl Into<Value>) -> Columns {
    let mut key = Columns::new();
    key.insert(column.to_owned(), value.into());
    key
}

pub fn count_rows(connection: &rusqlite::Connection, table: &str) -> i64 {
    connection
        .query_row(&format!("select count(*) from {}", table), [], |r| r.get(0))
        .unwrap()
}
