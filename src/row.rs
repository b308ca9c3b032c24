//! One table's share of a bean: its columns, its primary key and where it is in
//! its lifecycle.
//!
//! ```text
//! Detached --attach--> New --insert--> Loaded <--update-- Dirty
//!                                        |  \--set------------^
//! NotLoaded --first access (fetch)-------/
//! any of the above --delete--> Deleted (terminal)
//! Loaded | Dirty | NotLoaded --discard--> NotLoaded
//! ```
//!
//! A `Row` only enforces the transitions. Fetching, writing and bookkeeping in
//! the identity map and pending registry are done by the session, which is the
//! only caller of the crate-private transition methods.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Weak;

use crate::bean::{Bean, BeanInner};
use crate::error::{Result, RowkeeperError};
use crate::value::{Columns, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowState {
    /// Not attached to a session.
    Detached,
    /// Attached but never written.
    New,
    /// The primary key is known but the columns have not been fetched.
    NotLoaded,
    Loaded,
    /// Loaded, then modified in memory.
    Dirty,
    Deleted,
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RowState::Detached => "detached",
            RowState::New => "new",
            RowState::NotLoaded => "not loaded",
            RowState::Loaded => "loaded",
            RowState::Dirty => "dirty",
            RowState::Deleted => "deleted",
        };
        write!(f, "{}", name)
    }
}

pub struct Row {
    table: String,
    primary_key_columns: Vec<String>,
    columns: Columns,
    primary_key: Columns,
    state: RowState,
    references: BTreeMap<String, Bean>,
    pub(crate) owner: Weak<BeanInner>,
}

impl Row {
    pub(crate) fn new(table: &str, primary_key_columns: Vec<String>, state: RowState) -> Self {
        Self {
            table: table.to_owned(),
            primary_key_columns,
            columns: Columns::new(),
            primary_key: Columns::new(),
            state,
            references: BTreeMap::new(),
            owner: Weak::new(),
        }
    }
    pub(crate) fn not_loaded(table: &str, primary_key_columns: Vec<String>, key: Columns) -> Self {
        let mut row = Row::new(table, primary_key_columns, RowState::NotLoaded);
        row.columns = key.clone();
        row.primary_key = key;
        row
    }

    pub fn table(&self) -> &str {
        &self.table
    }
    pub fn state(&self) -> RowState {
        self.state
    }
    pub fn primary_key(&self) -> &Columns {
        &self.primary_key
    }
    pub fn primary_key_columns(&self) -> &[String] {
        &self.primary_key_columns
    }
    pub fn columns(&self) -> &Columns {
        &self.columns
    }
    pub fn has_complete_primary_key(&self) -> bool {
        !self.primary_key_columns.is_empty()
            && self
                .primary_key_columns
                .iter()
                .all(|c| self.primary_key.contains_key(c))
    }
    pub fn is_primary_key_column(&self, column: &str) -> bool {
        self.primary_key_columns.iter().any(|c| c == column)
    }
    /// The bean this row belongs to, if it is still alive.
    pub fn owner(&self) -> Option<Bean> {
        self.owner.upgrade().map(Bean::from_inner)
    }
    pub fn reference(&self, fk_name: &str) -> Option<Bean> {
        self.references.get(fk_name).cloned()
    }
    pub fn references(&self) -> impl Iterator<Item = (&String, &Bean)> {
        self.references.iter()
    }

    /// Reads a column. Rows that have never been written answer `Null` for
    /// anything unset; fetched rows know every column of their table.
    pub fn get(&self, column: &str) -> Result<Value> {
        match self.state {
            RowState::NotLoaded => Err(RowkeeperError::InvalidOperation(format!(
                "row of {} must be loaded before reading {}",
                self.table, column
            ))),
            RowState::Detached | RowState::New => {
                Ok(self.columns.get(column).cloned().unwrap_or(Value::Null))
            }
            _ => self.columns.get(column).cloned().ok_or_else(|| {
                RowkeeperError::Schema(format!("no column {} in table {}", column, self.table))
            }),
        }
    }

    /// Writes a column. There is no comparison with the previous value, so
    /// writing the current value of a loaded row still makes it dirty.
    pub(crate) fn set(&mut self, column: &str, value: Value) -> Result<()> {
        match self.state {
            RowState::Deleted => {
                return Err(RowkeeperError::InvalidOperation(format!(
                    "cannot modify {} in a deleted row of {}",
                    column, self.table
                )));
            }
            RowState::NotLoaded => {
                return Err(RowkeeperError::InvalidOperation(format!(
                    "row of {} must be loaded before writing {}",
                    self.table, column
                )));
            }
            RowState::Loaded | RowState::Dirty if self.is_primary_key_column(column) => {
                if self.primary_key.get(column) != Some(&value) {
                    return Err(RowkeeperError::InvalidOperation(format!(
                        "cannot change primary key column {} of a persisted row of {}",
                        column, self.table
                    )));
                }
            }
            RowState::Detached | RowState::New if self.is_primary_key_column(column) => {
                if value.is_null() {
                    self.primary_key.remove(column);
                } else {
                    self.primary_key.insert(column.to_owned(), value.clone());
                }
            }
            _ => (),
        }
        self.columns.insert(column.to_owned(), value);
        self.touch();
        Ok(())
    }

    pub(crate) fn set_reference(&mut self, fk_name: &str, target: Bean) -> Result<()> {
        match self.state {
            RowState::Deleted | RowState::NotLoaded => Err(RowkeeperError::InvalidOperation(
                format!("cannot set reference {} on a {} row of {}", fk_name, self.state, self.table),
            )),
            _ => {
                self.references.insert(fk_name.to_owned(), target);
                self.touch();
                Ok(())
            }
        }
    }

    fn touch(&mut self) {
        if self.state == RowState::Loaded {
            self.state = RowState::Dirty;
        }
    }

    /// Copies a resolved foreign key value in without any state change. On a
    /// row that has not been written yet the value also fills in the primary
    /// key when the column is part of it.
    pub(crate) fn resolve_column(&mut self, column: &str, value: Value) {
        if matches!(self.state, RowState::Detached | RowState::New)
            && self.is_primary_key_column(column)
            && !value.is_null()
        {
            self.primary_key.insert(column.to_owned(), value.clone());
        }
        self.columns.insert(column.to_owned(), value);
    }
    pub(crate) fn clear_reference(&mut self, fk_name: &str) {
        self.references.remove(fk_name);
    }

    /// Installs a complete primary key on a row that has not been written yet.
    pub(crate) fn assign_primary_key(&mut self, key: Columns) {
        for (column, value) in &key {
            self.columns.insert(column.clone(), value.clone());
        }
        self.primary_key = key;
    }

    pub(crate) fn attach(&mut self) -> Result<()> {
        if self.state != RowState::Detached {
            return Err(RowkeeperError::InvalidOperation(format!(
                "row of {} is already attached ({})",
                self.table, self.state
            )));
        }
        self.state = RowState::New;
        Ok(())
    }

    pub(crate) fn load(&mut self, columns: Columns) {
        self.columns = columns;
        self.primary_key = self.key_from_columns();
        self.references.clear();
        self.state = RowState::Loaded;
    }

    pub(crate) fn mark_inserted(&mut self) {
        self.primary_key = self.key_from_columns();
        self.state = RowState::Loaded;
    }

    /// Marks an updated row clean. Returns the previous primary key when the
    /// update changed key values, so the caller can re-key the identity map.
    pub(crate) fn mark_updated(&mut self) -> Option<Columns> {
        self.state = RowState::Loaded;
        let key = self.key_from_columns();
        if key != self.primary_key {
            Some(std::mem::replace(&mut self.primary_key, key))
        } else {
            None
        }
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.references.clear();
        self.state = RowState::Deleted;
    }

    pub(crate) fn discard(&mut self) -> Result<()> {
        match self.state {
            RowState::Loaded | RowState::Dirty | RowState::NotLoaded => {
                self.columns = self.primary_key.clone();
                self.references.clear();
                self.state = RowState::NotLoaded;
                Ok(())
            }
            state => Err(RowkeeperError::InvalidOperation(format!(
                "cannot discard changes of a {} row of {}",
                state, self.table
            ))),
        }
    }

    fn key_from_columns(&self) -> Columns {
        self.primary_key_columns
            .iter()
            .filter_map(|c| match self.columns.get(c) {
                Some(v) if !v.is_null() => Some((c.clone(), v.clone())),
                _ => None,
            })
            .collect()
    }
}

// References are printed by name only: beans may point at each other.
impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Row")
            .field("table", &self.table)
            .field("state", &self.state)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("references", &self.references.keys().collect::<Vec<_>>())
            .finish()
    }
}
