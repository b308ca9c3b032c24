//! Rowkeeper – an identity-mapped row-to-object persistence engine.
//!
//! Rowkeeper maps table rows onto *beans*: logical objects that may span
//! several tables through single-chain table inheritance, where a child table
//! extends its parent through a foreign key from its primary key onto the
//! parent's primary key.
//! * A [`row::Row`] is one table's share of a bean: columns, primary key and a
//!   lifecycle [`row::RowState`].
//! * A [`bean::Bean`] holds one row per table of its chain, root table first,
//!   and derives its state from theirs.
//! * The [`identity::IdentityMap`] guarantees that one persisted row has one
//!   live instance, holding rows weakly so beans nobody uses are freed.
//! * The [`pending::PendingSaves`] registry remembers new and dirty rows until
//!   they are flushed.
//! * The [`topology::Topology`] works out which tables make up a bean.
//!
//! These are wired together by a [`session::Session`], the unit of work every
//! bean is created, looked up, saved and deleted through.
//!
//! ## Collaborators
//! The engine writes through a [`connection::Connection`] and learns about
//! keys from a [`schema::SchemaProvider`]. The [`persist`] module implements
//! both over SQLite; [`schema::StaticSchema`] declares a schema in code.
//!
//! ## Quick Start
//! ```
//! use rusqlite::Connection;
//! use rowkeeper::{persist::Persistor, session::Session, settings::EngineConfig};
//! let conn = Connection::open_in_memory().unwrap();
//! conn.execute_batch(
//!     "create table person (id integer primary key, name text);
//!      create table employee (id integer primary key references person(id), salary real);",
//! ).unwrap();
//! let persistor = Persistor::new(&conn).unwrap();
//! let schema = persistor.schema().unwrap();
//! let session = Session::new(persistor, schema, EngineConfig::default());
//! let ada = session.create("employee").unwrap();
//! session.set(&ada, "person", "name", "Ada").unwrap();
//! session.set(&ada, "employee", "salary", 1000.0).unwrap();
//! session.save(&ada).unwrap();
//! let again = session.find("employee", ada.primary_key()).unwrap();
//! assert!(rowkeeper::bean::Bean::ptr_eq(&ada, &again));
//! ```
//!
//! ## Threading
//! A session is single-threaded by construction (`Rc`/`RefCell` inside). A
//! host that shares one across threads has to serialize access itself.

pub mod bean;
pub mod connection;
pub mod error;
pub mod identity;
pub mod pending;
pub mod persist;
pub mod row;
pub mod schema;
pub mod session;
pub mod settings;
pub mod topology;
pub mod value;

pub use error::{Result, RowkeeperError};
