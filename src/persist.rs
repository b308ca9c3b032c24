//! SQLite implementations of the engine's collaborators.
//!
//! [`Persistor`] is a [`Connection`] over a borrowed `rusqlite` connection,
//! generating one statement shape per table and column set and leaving the
//! caching of those to `prepare_cached`. [`Persistor::schema`] reads primary
//! and foreign keys back out of the database into a [`StaticSchema`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{Connection as SqliteConnection, params_from_iter};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Result, RowkeeperError};
use crate::schema::StaticSchema;
use crate::value::{Columns, Value, describe};

lazy_static! {
    // table and column names are interpolated into statements, so only plain
    // identifiers are let through
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

fn quote(identifier: &str) -> Result<String> {
    if !IDENTIFIER.is_match(identifier) {
        return Err(RowkeeperError::Schema(format!(
            "'{}' is not a usable identifier",
            identifier
        )));
    }
    Ok(format!("\"{}\"", identifier))
}

// "a" = ?n and "b" = ?n+1 ...
fn conditions(columns: &Columns, first_parameter: usize) -> Result<String> {
    let mut conditions = Vec::new();
    for (i, column) in columns.keys().enumerate() {
        conditions.push(format!("{} = ?{}", quote(column)?, first_parameter + i));
    }
    Ok(conditions.join(" and "))
}

// ------------- Persistence -------------
pub struct Persistor<'db> {
    pub db: &'db SqliteConnection,
    // table -> (primary key columns, whether SQLite assigns the key)
    keys: RefCell<HashMap<String, (Vec<String>, bool)>>,
}

impl<'db> Persistor<'db> {
    /// Wraps a connection and turns on foreign key enforcement, which SQLite
    /// leaves off by default.
    pub fn new(connection: &'db SqliteConnection) -> Result<Persistor<'db>> {
        connection.pragma_update(None, "foreign_keys", true)?;
        Ok(Persistor {
            db: connection,
            keys: RefCell::new(HashMap::new()),
        })
    }

    /// The primary key of `table` and whether it is an alias of the rowid,
    /// the only kind of key SQLite generates: a single `INTEGER` column in a
    /// table that has a rowid.
    fn key_of(&self, table: &str) -> Result<(Vec<String>, bool)> {
        if let Some(key) = self.keys.borrow().get(table) {
            return Ok(key.clone());
        }
        let mut statement = self.db.prepare_cached(
            "
            select name, upper(type)
                from pragma_table_info(?1)
                where pk > 0
                order by pk
        ",
        )?;
        let columns = statement
            .query_map([table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        // WITHOUT ROWID tables and non-integer keys get a separate key index
        let indexed: i64 = self.db.query_row(
            "select count(*) from pragma_index_list(?1) where origin = 'pk'",
            [table],
            |row| row.get(0),
        )?;
        let generated = columns.len() == 1 && columns[0].1 == "INTEGER" && indexed == 0;
        let key = (
            columns.into_iter().map(|(name, _)| name).collect::<Vec<_>>(),
            generated,
        );
        self.keys
            .borrow_mut()
            .insert(table.to_owned(), key.clone());
        Ok(key)
    }

    fn select(&self, table: &str, filter: &Columns) -> Result<Vec<Columns>> {
        let mut sql = format!("select * from {}", quote(table)?);
        if !filter.is_empty() {
            sql += &format!(" where {}", conditions(filter, 1)?);
        }
        debug!(%sql, "fetch");
        let mut statement = self.db.prepare_cached(&sql)?;
        let names: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = statement.query(params_from_iter(filter.values()))?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let mut columns = Columns::new();
            for (i, name) in names.iter().enumerate() {
                columns.insert(name.clone(), row.get::<_, Value>(i)?);
            }
            fetched.push(columns);
        }
        Ok(fetched)
    }

    /// Reads every table's primary key and foreign keys.
    ///
    /// SQLite does not report constraint names, so each foreign key is named
    /// after its local columns joined with `_` (`team_id`, or `id` for the
    /// inheritance key of a child table).
    pub fn schema(&self) -> Result<StaticSchema> {
        let mut tables_statement = self.db.prepare(
            "
            select name
                from sqlite_master
                where type = 'table'
                and name not like 'sqlite_%'
                order by name
        ",
        )?;
        let tables = tables_statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut schema = StaticSchema::new();
        let mut primary_keys: HashMap<String, Vec<String>> = HashMap::new();
        let mut key_statement = self.db.prepare(
            "
            select name, pk
                from pragma_table_info(?1)
                where pk > 0
                order by pk
        ",
        )?;
        for table in &tables {
            let primary_key = key_statement
                .query_map([table], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            let columns: Vec<&str> = primary_key.iter().map(String::as_str).collect();
            schema = schema.table(table, &columns);
            primary_keys.insert(table.clone(), primary_key);
        }

        let mut foreign_key_statement = self.db.prepare(
            "
            select id, \"table\", \"from\", \"to\"
                from pragma_foreign_key_list(?1)
                order by id, seq
        ",
        )?;
        for table in &tables {
            let mut grouped: BTreeMap<i64, (String, Vec<String>, Vec<Option<String>>)> =
                BTreeMap::new();
            let mut rows = foreign_key_statement.query([table])?;
            while let Some(row) = rows.next()? {
                let entry = grouped
                    .entry(row.get(0)?)
                    .or_insert_with(|| (String::new(), Vec::new(), Vec::new()));
                entry.0 = row.get(1)?;
                entry.1.push(row.get(2)?);
                entry.2.push(row.get(3)?);
            }
            let mut names: Vec<String> = Vec::new();
            for (id, (referenced_table, columns, referenced)) in grouped {
                // a missing "to" means the referenced table's primary key
                let referenced_columns: Vec<String> = if referenced.iter().any(Option::is_none) {
                    primary_keys.get(&referenced_table).cloned().unwrap_or_default()
                } else {
                    referenced.into_iter().flatten().collect()
                };
                let mut name = columns.join("_");
                if names.contains(&name) {
                    name = format!("{}_{}", name, id);
                }
                names.push(name.clone());
                let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                let referenced_columns: Vec<&str> =
                    referenced_columns.iter().map(String::as_str).collect();
                schema = schema.foreign_key(
                    &name,
                    table,
                    &columns,
                    &referenced_table,
                    &referenced_columns,
                );
            }
        }
        Ok(schema)
    }
}

impl<'db> Connection for Persistor<'db> {
    fn insert(&self, table: &str, columns: &Columns) -> Result<Option<Value>> {
        let (key, generated) = self.key_of(table)?;
        let unset: Vec<&String> = key
            .iter()
            .filter(|c| columns.get(*c).is_none_or(Value::is_null))
            .collect();
        if !generated && !unset.is_empty() {
            // SQLite would store a null key here rather than refuse the row
            return Err(RowkeeperError::InvalidOperation(format!(
                "{} has no value for key column {} and SQLite does not generate it",
                table,
                unset.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
            )));
        }
        let sql = if columns.is_empty() {
            format!("insert into {} default values", quote(table)?)
        } else {
            let mut names = Vec::new();
            for column in columns.keys() {
                names.push(quote(column)?);
            }
            let parameters: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "insert into {} ({}) values ({})",
                quote(table)?,
                names.join(", "),
                parameters.join(", ")
            )
        };
        debug!(%sql, "insert");
        self.db
            .prepare_cached(&sql)?
            .execute(params_from_iter(columns.values()))?;
        if generated {
            Ok(Some(Value::Integer(self.db.last_insert_rowid())))
        } else {
            Ok(None)
        }
    }

    fn update(&self, table: &str, columns: &Columns, primary_key: &Columns) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let mut assignments = Vec::new();
        for (i, column) in columns.keys().enumerate() {
            assignments.push(format!("{} = ?{}", quote(column)?, i + 1));
        }
        let sql = format!(
            "update {} set {} where {}",
            quote(table)?,
            assignments.join(", "),
            conditions(primary_key, columns.len() + 1)?
        );
        debug!(%sql, "update");
        let changed = self
            .db
            .prepare_cached(&sql)?
            .execute(params_from_iter(columns.values().chain(primary_key.values())))?;
        if changed == 0 {
            return Err(RowkeeperError::NotFound {
                table: table.to_owned(),
                primary_key: describe(primary_key),
            });
        }
        Ok(())
    }

    fn delete(&self, table: &str, primary_key: &Columns) -> Result<()> {
        let sql = format!(
            "delete from {} where {}",
            quote(table)?,
            conditions(primary_key, 1)?
        );
        debug!(%sql, "delete");
        self.db
            .prepare_cached(&sql)?
            .execute(params_from_iter(primary_key.values()))?;
        Ok(())
    }

    fn fetch_one_by_primary_key(
        &self,
        table: &str,
        primary_key: &Columns,
    ) -> Result<Option<Columns>> {
        let mut rows = self.select(table, primary_key)?;
        if rows.len() > 1 {
            return Err(RowkeeperError::DuplicateRow {
                table: table.to_owned(),
                filter: describe(primary_key),
            });
        }
        Ok(rows.pop())
    }

    fn fetch_by_columns(&self, table: &str, filter: &Columns) -> Result<Vec<Columns>> {
        self.select(table, filter)
    }
}
