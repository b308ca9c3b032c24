//! The foreign-key graph the engine consults, and a hand-declared implementation of it.
//!
//! The engine never discovers column metadata itself. It only needs primary
//! keys and foreign keys per table, which a [`SchemaProvider`] supplies. The
//! relationships the engine actually reasons about (inheritance parents and
//! children, dependents for cascading deletes) are derived from those two
//! facts by the provided trait methods, so an implementation only has to
//! answer `tables`, `primary_key_columns` and `foreign_keys`.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, RowkeeperError};

/// A foreign key from `table(columns)` onto `referenced_table(referenced_columns)`.
/// Columns pair up positionally.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(
        name: &str,
        table: &str,
        columns: &[&str],
        referenced_table: &str,
        referenced_columns: &[&str],
    ) -> Self {
        Self {
            name: name.to_owned(),
            table: table.to_owned(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: referenced_table.to_owned(),
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
        }
    }
    /// Pairs of (local column, referenced column).
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.referenced_columns.iter().map(String::as_str))
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{}({}) -> {}({})",
            self.table,
            self.name,
            self.columns.join(", "),
            self.referenced_table,
            self.referenced_columns.join(", ")
        )
    }
}

fn same_columns(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    !a.is_empty() && a == b
}

pub trait SchemaProvider {
    fn tables(&self) -> Result<Vec<String>>;
    fn primary_key_columns(&self, table: &str) -> Result<Vec<String>>;
    /// Foreign keys declared on `table` (outgoing).
    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    fn foreign_key(&self, table: &str, name: &str) -> Result<ForeignKey> {
        self.foreign_keys(table)?
            .into_iter()
            .find(|fk| fk.name == name)
            .ok_or_else(|| {
                RowkeeperError::Schema(format!("no foreign key {} on table {}", name, table))
            })
    }

    /// True when `fk` maps the whole primary key of its table onto the whole
    /// primary key of another table.
    fn is_inheritance(&self, fk: &ForeignKey) -> Result<bool> {
        if fk.table == fk.referenced_table {
            return Ok(false);
        }
        Ok(same_columns(&fk.columns, &self.primary_key_columns(&fk.table)?)
            && same_columns(
                &fk.referenced_columns,
                &self.primary_key_columns(&fk.referenced_table)?,
            ))
    }

    /// The PK-to-PK foreign key making `table` a child of another table.
    /// More than one such key is multiple inheritance, which is not supported.
    fn parent_relationship(&self, table: &str) -> Result<Option<ForeignKey>> {
        let mut parents = Vec::new();
        for fk in self.foreign_keys(table)? {
            if self.is_inheritance(&fk)? {
                parents.push(fk);
            }
        }
        if parents.len() > 1 {
            let mut tables = vec![table.to_owned()];
            tables.extend(parents.into_iter().map(|fk| fk.referenced_table));
            return Err(RowkeeperError::Inheritance { tables });
        }
        Ok(parents.pop())
    }

    /// PK-to-PK foreign keys from other tables onto `table`.
    fn child_relationships(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let mut children = Vec::new();
        for fk in self.referencing_foreign_keys(table)? {
            if self.is_inheritance(&fk)? {
                children.push(fk);
            }
        }
        Ok(children)
    }

    /// Every foreign key, on any table, that references `table`.
    fn referencing_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let mut referencing = Vec::new();
        for other in self.tables()? {
            for fk in self.foreign_keys(&other)? {
                if fk.referenced_table == table {
                    referencing.push(fk);
                }
            }
        }
        Ok(referencing)
    }
}

#[derive(Debug, Default, Clone)]
struct TableDefinition {
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
}

/// A schema declared in code.
///
/// ```
/// use rowkeeper::schema::{SchemaProvider, StaticSchema};
/// let schema = StaticSchema::new()
///     .table("person", &["id"])
///     .table("employee", &["id"])
///     .foreign_key("employee_is_person", "employee", &["id"], "person", &["id"]);
/// let parent = schema.parent_relationship("employee").unwrap().unwrap();
/// assert_eq!(parent.referenced_table, "person");
/// ```
#[derive(Debug, Default, Clone)]
pub struct StaticSchema {
    tables: BTreeMap<String, TableDefinition>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn table(mut self, name: &str, primary_key: &[&str]) -> Self {
        let definition = self.tables.entry(name.to_owned()).or_default();
        definition.primary_key = primary_key.iter().map(|c| c.to_string()).collect();
        self
    }
    pub fn foreign_key(
        mut self,
        name: &str,
        table: &str,
        columns: &[&str],
        referenced_table: &str,
        referenced_columns: &[&str],
    ) -> Self {
        self.tables
            .entry(table.to_owned())
            .or_default()
            .foreign_keys
            .push(ForeignKey::new(name, table, columns, referenced_table, referenced_columns));
        self
    }
    fn definition(&self, table: &str) -> Result<&TableDefinition> {
        self.tables
            .get(table)
            .ok_or_else(|| RowkeeperError::Schema(format!("unknown table {}", table)))
    }
}

impl SchemaProvider for StaticSchema {
    fn tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }
    fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.definition(table)?.primary_key.clone())
    }
    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        Ok(self.definition(table)?.foreign_keys.clone())
    }
}
