use crate::error::Result;
use crate::value::{Columns, Value};

/// The store the engine writes through. Every call is blocking.
///
/// Implementations pass constraint violations back as
/// [`RowkeeperError::Constraint`](crate::error::RowkeeperError::Constraint)
/// and never retry.
pub trait Connection {
    /// Inserts a row and returns the key the store generated for it, if any.
    fn insert(&self, table: &str, columns: &Columns) -> Result<Option<Value>>;
    /// Overwrites the row identified by `primary_key` with `columns`.
    fn update(&self, table: &str, columns: &Columns, primary_key: &Columns) -> Result<()>;
    fn delete(&self, table: &str, primary_key: &Columns) -> Result<()>;
    /// Fails with a duplicate-row error when the key matches more than one row.
    fn fetch_one_by_primary_key(&self, table: &str, primary_key: &Columns)
    -> Result<Option<Columns>>;
    /// Every row whose columns equal `filter`.
    fn fetch_by_columns(&self, table: &str, filter: &Columns) -> Result<Vec<Columns>>;
}

impl<C: Connection + ?Sized> Connection for &C {
    fn insert(&self, table: &str, columns: &Columns) -> Result<Option<Value>> {
        (**self).insert(table, columns)
    }
    fn update(&self, table: &str, columns: &Columns, primary_key: &Columns) -> Result<()> {
        (**self).update(table, columns, primary_key)
    }
    fn delete(&self, table: &str, primary_key: &Columns) -> Result<()> {
        (**self).delete(table, primary_key)
    }
    fn fetch_one_by_primary_key(
        &self,
        table: &str,
        primary_key: &Columns,
    ) -> Result<Option<Columns>> {
        (**self).fetch_one_by_primary_key(table, primary_key)
    }
    fn fetch_by_columns(&self, table: &str, filter: &Columns) -> Result<Vec<Columns>> {
        (**self).fetch_by_columns(table, filter)
    }
}
