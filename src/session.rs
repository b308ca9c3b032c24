//! The unit of work: beans, their rows and how they reach the database.
//!
//! A [`Session`] owns the store connection, the inheritance topology, the
//! identity map and the pending-save registry. Every bean is created or looked
//! up through it and every column access goes through it, which is what lets
//! it load rows lazily, track dirty rows and decide between INSERT and UPDATE
//! when saving.
//!
//! ## Saving
//! Rows are inserted root table first, since a child row's primary key is a
//! foreign key onto its parent's. The root row's key, supplied or generated by
//! the store, is then copied down the chain. Beans referenced by a row that
//! have not been written yet are saved first, recursively; the set of beans
//! whose save is in progress is threaded through the recursion so a cycle of
//! new beans is reported instead of recursing forever. Updates and deletes run
//! leaf table first.
//!
//! The session never opens transactions. Wrap a save in one if a failure
//! halfway through a chain must not leave the earlier rows in the database;
//! either way the rows that were written stay `Loaded` in memory.

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::bean::{Bean, BeanId, BeanIdGenerator, RowRef};
use crate::connection::Connection;
use crate::error::{Result, RowkeeperError};
use crate::identity::{IdentityMap, PkHash};
use crate::pending::PendingSaves;
use crate::row::{Row, RowState};
use crate::schema::{ForeignKey, SchemaProvider};
use crate::settings::EngineConfig;
use crate::topology::Topology;
use crate::value::{Columns, Value, describe};

pub struct Session<C: Connection, S: SchemaProvider> {
    connection: C,
    topology: Topology<S>,
    identity_map: RefCell<IdentityMap>,
    pending: RefCell<PendingSaves>,
    bean_ids: RefCell<BeanIdGenerator>,
    auto_save: Cell<bool>,
}

impl<C: Connection, S: SchemaProvider> Session<C, S> {
    pub fn new(connection: C, schema: S, config: EngineConfig) -> Self {
        Self {
            connection,
            topology: Topology::new(schema),
            identity_map: RefCell::new(IdentityMap::new(config.identity_sweep_interval)),
            pending: RefCell::new(PendingSaves::new()),
            bean_ids: RefCell::new(BeanIdGenerator::new()),
            auto_save: Cell::new(config.auto_save),
        }
    }
    pub fn connection(&self) -> &C {
        &self.connection
    }
    pub fn topology(&self) -> &Topology<S> {
        &self.topology
    }
    pub fn identity_map(&self) -> Ref<'_, IdentityMap> {
        self.identity_map.borrow()
    }
    /// Number of rows waiting for a save.
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
    pub fn is_pending(&self, bean: &Bean, table: &str) -> bool {
        self.pending.borrow().contains(bean.id(), table)
    }
    /// The live row cached for `table` under `key`, if any.
    pub fn cached_row(&self, table: &str, key: &Columns) -> Option<RowRef> {
        let hash = PkHash::of(key)?;
        self.identity_map.borrow_mut().get(table, &hash)
    }

    fn schema(&self) -> &S {
        self.topology.schema()
    }

    fn build(&self, chain: &[String], state: RowState) -> Result<Bean> {
        let mut rows = Vec::new();
        for table in chain {
            let primary_key = self.schema().primary_key_columns(table)?;
            if primary_key.is_empty() {
                return Err(RowkeeperError::Schema(format!(
                    "table {} has no primary key",
                    table
                )));
            }
            rows.push(Row::new(table, primary_key, state));
        }
        Ok(self.assemble(rows))
    }

    fn assemble(&self, rows: Vec<Row>) -> Bean {
        let id = self.bean_ids.borrow_mut().generate();
        Bean::new(id, rows, self.auto_save.get())
    }

    // ------------- Creation and lookup -------------

    /// A new bean of `table`, with one row per table from its root ancestor
    /// down to `table`. It is pending until saved.
    pub fn create(&self, table: &str) -> Result<Bean> {
        let chain = self.topology.link_chain(&[table])?;
        let bean = self.build(&chain, RowState::New)?;
        let mut pending = self.pending.borrow_mut();
        for table in &chain {
            pending.register(&bean, table);
        }
        debug!(table, bean = ?bean.id(), "created bean");
        Ok(bean)
    }

    /// A bean of `table` that is not known to the session until attached.
    pub fn detached(&self, table: &str) -> Result<Bean> {
        let chain = self.topology.link_chain(&[table])?;
        self.build(&chain, RowState::Detached)
    }

    pub fn attach(&self, bean: &Bean) -> Result<()> {
        if bean.state() != RowState::Detached {
            return Err(RowkeeperError::InvalidOperation(format!(
                "bean of {} is already attached",
                bean.leaf_table()
            )));
        }
        let tables = bean.tables();
        let names: Vec<&str> = tables.iter().map(String::as_str).collect();
        if self.topology.link_chain(&names)? != tables {
            return Err(RowkeeperError::Inheritance { tables });
        }
        for row in bean.rows() {
            let mut row = row.borrow_mut();
            row.attach()?;
            self.pending.borrow_mut().register(bean, row.table());
        }
        Ok(())
    }

    fn validate_key(&self, table: &str, key: &Columns) -> Result<()> {
        let mut expected = self.schema().primary_key_columns(table)?;
        expected.sort_unstable();
        let given: Vec<&String> = key.keys().collect();
        if expected.iter().collect::<Vec<_>>() != given || key.values().any(Value::is_null) {
            return Err(RowkeeperError::InvalidOperation(format!(
                "{} is not a primary key of {} (expected columns {})",
                describe(key),
                table,
                expected.join(", ")
            )));
        }
        Ok(())
    }

    /// Keys of every table in `chain`, derived upwards from the key of its last table.
    fn chain_keys(&self, chain: &[String], key: Columns) -> Result<Vec<Columns>> {
        let mut keys = vec![key];
        for table in chain.iter().skip(1).rev() {
            let parent = self.parent_of(table)?;
            let child_key = &keys[keys.len() - 1];
            let mut parent_key = Columns::new();
            for (local, remote) in parent.column_pairs() {
                let value = child_key.get(local).cloned().ok_or_else(|| {
                    RowkeeperError::Schema(format!(
                        "inheritance key {} of {} is not part of its primary key",
                        parent.name, table
                    ))
                })?;
                parent_key.insert(remote.to_owned(), value);
            }
            keys.push(parent_key);
        }
        keys.reverse();
        Ok(keys)
    }

    fn parent_of(&self, table: &str) -> Result<ForeignKey> {
        self.schema()
            .parent_relationship(table)?
            .ok_or_else(|| RowkeeperError::Inheritance {
                tables: vec![table.to_owned()],
            })
    }

    fn live_owner(&self, table: &str, key: &Columns) -> Option<Bean> {
        let hash = PkHash::of(key)?;
        let row = self.identity_map.borrow_mut().get(table, &hash)?;
        let row = row.borrow();
        if row.primary_key() != key {
            return None;
        }
        row.owner()
    }

    fn install(&self, row: &RowRef) {
        let (table, key) = {
            let row = row.borrow();
            (row.table().to_owned(), row.primary_key().clone())
        };
        if let Some(hash) = PkHash::of(&key) {
            self.identity_map.borrow_mut().set(&table, hash, row);
        }
    }

    fn evict(&self, table: &str, key: &Columns) {
        if let Some(hash) = PkHash::of(key) {
            self.identity_map.borrow_mut().remove(table, &hash);
        }
    }

    /// The bean of `table` with primary key `key`.
    ///
    /// Returns the live instance when there is one. Otherwise the bean is
    /// built without touching the database; its rows are fetched on first
    /// access. A live bean holding only the upper part of the chain under the
    /// same key is extended downwards rather than duplicated.
    pub fn find(&self, table: &str, key: Columns) -> Result<Bean> {
        self.validate_key(table, &key)?;
        if let Some(bean) = self.live_owner(table, &key) {
            debug!(table, key = %describe(&key), "identity map hit");
            return Ok(bean);
        }
        let chain = self.topology.link_chain(&[table])?;
        let keys = self.chain_keys(&chain, key)?;
        if let Some(owner) = self.live_owner(&chain[0], &keys[0]) {
            let tables = owner.tables();
            if chain.len() > tables.len() && chain.starts_with(&tables) {
                debug!(table, bean = ?owner.id(), "widening bean");
                for (table, key) in chain.iter().zip(keys).skip(tables.len()) {
                    let primary_key = self.schema().primary_key_columns(table)?;
                    let row = owner.push_row(Row::not_loaded(table, primary_key, key));
                    self.install(&row);
                }
                return Ok(owner);
            }
            let mut tables = tables;
            tables.push(table.to_owned());
            return Err(RowkeeperError::Inheritance { tables });
        }
        debug!(table, "identity map miss");
        let mut rows = Vec::new();
        for (table, key) in chain.iter().zip(keys) {
            let primary_key = self.schema().primary_key_columns(table)?;
            rows.push(Row::not_loaded(table, primary_key, key));
        }
        let bean = self.assemble(rows);
        for row in bean.rows() {
            self.install(&row);
        }
        Ok(bean)
    }

    /// Like [`find`](Self::find), then extended down to the most specific
    /// table that holds a row for the key.
    pub fn find_specific(&self, table: &str, key: Columns) -> Result<Bean> {
        let bean = self.find(table, key)?;
        self.specialize(&bean)?;
        Ok(bean)
    }

    /// Appends rows for descendant tables present in the database.
    fn specialize(&self, bean: &Bean) -> Result<()> {
        loop {
            let leaf = bean.leaf_table();
            let chain = bean.tables();
            let descendants = self
                .topology
                .related_tables(&leaf)?
                .into_iter()
                .filter(|t| !chain.contains(t))
                .count();
            if descendants == 0 {
                return Ok(());
            }
            let leaf_key = match bean.row(&leaf) {
                Some(row) => row.borrow().primary_key().clone(),
                None => return Ok(()),
            };
            // every child is looked at: a parent row may extend into one child only
            let mut found = Vec::new();
            for child in self.topology.children(&leaf)? {
                let mut key = Columns::new();
                for (local, remote) in child.column_pairs() {
                    if let Some(value) = leaf_key.get(remote) {
                        key.insert(local.to_owned(), value.clone());
                    }
                }
                if let Some(owner) = self.live_owner(&child.table, &key) {
                    if Bean::ptr_eq(&owner, bean) {
                        continue;
                    }
                    return Err(RowkeeperError::Inheritance {
                        tables: owner.tables(),
                    });
                }
                if let Some(columns) = self.connection.fetch_one_by_primary_key(&child.table, &key)? {
                    found.push((child.table, columns));
                }
            }
            if found.len() > 1 {
                warn!(table = %leaf, "parent row has rows in several child tables");
                let mut tables = chain;
                tables.extend(found.into_iter().map(|(table, _)| table));
                return Err(RowkeeperError::Inheritance { tables });
            }
            let Some((table, columns)) = found.pop() else {
                return Ok(());
            };
            let primary_key = self.schema().primary_key_columns(&table)?;
            let mut row = Row::new(&table, primary_key, RowState::NotLoaded);
            row.load(columns);
            let row = bean.push_row(row);
            self.install(&row);
            debug!(table = %table, bean = ?bean.id(), "specialized bean");
        }
    }

    /// The single bean of `table` whose columns equal `filter`.
    pub fn find_one_by(&self, table: &str, filter: &Columns) -> Result<Option<Bean>> {
        let mut rows = self.connection.fetch_by_columns(table, filter)?;
        if rows.len() > 1 {
            return Err(RowkeeperError::DuplicateRow {
                table: table.to_owned(),
                filter: describe(filter),
            });
        }
        let Some(columns) = rows.pop() else {
            return Ok(None);
        };
        let mut key = Columns::new();
        for column in self.schema().primary_key_columns(table)? {
            let value = columns.get(&column).cloned().unwrap_or(Value::Null);
            key.insert(column, value);
        }
        let bean = self.find(table, key)?;
        if let Some(row) = bean.row(table) {
            let mut row = row.borrow_mut();
            if row.state() == RowState::NotLoaded {
                row.load(columns);
            }
        }
        Ok(Some(bean))
    }

    // ------------- Column access -------------

    fn loaded_row(&self, bean: &Bean, table: &str) -> Result<RowRef> {
        let row = bean.row(table).ok_or_else(|| {
            RowkeeperError::Schema(format!(
                "bean of {} has no row for table {}",
                bean.leaf_table(),
                table
            ))
        })?;
        if row.borrow().state() == RowState::NotLoaded {
            let key = row.borrow().primary_key().clone();
            match self.connection.fetch_one_by_primary_key(table, &key)? {
                Some(columns) => {
                    debug!(table, key = %describe(&key), "loaded row");
                    row.borrow_mut().load(columns);
                }
                None => {
                    return Err(RowkeeperError::NotFound {
                        table: table.to_owned(),
                        primary_key: describe(&key),
                    });
                }
            }
        }
        Ok(row)
    }

    fn register_if_unsaved(&self, bean: &Bean, row: &RowRef) {
        let row = row.borrow();
        if matches!(row.state(), RowState::New | RowState::Dirty) {
            self.pending.borrow_mut().register(bean, row.table());
        }
    }

    pub fn get(&self, bean: &Bean, table: &str, column: &str) -> Result<Value> {
        let row = self.loaded_row(bean, table)?;
        let value = row.borrow().get(column)?;
        Ok(value)
    }

    pub fn set(&self, bean: &Bean, table: &str, column: &str, value: impl Into<Value>) -> Result<()> {
        let row = self.loaded_row(bean, table)?;
        row.borrow_mut().set(column, value.into())?;
        self.register_if_unsaved(bean, &row);
        Ok(())
    }

    /// Points the foreign key `fk_name` of `table` at `target`. The key columns
    /// are filled in from `target` when `bean` is saved, after `target` itself
    /// has been saved if it is new. A save that fails on a cycle of new
    /// beans drops the references it followed.
    pub fn set_reference(&self, bean: &Bean, table: &str, fk_name: &str, target: &Bean) -> Result<()> {
        let fk = self.schema().foreign_key(table, fk_name)?;
        if target.row(&fk.referenced_table).is_none() {
            return Err(RowkeeperError::InvalidOperation(format!(
                "{} references {}, which the target bean of {} does not contain",
                fk_name,
                fk.referenced_table,
                target.leaf_table()
            )));
        }
        let row = self.loaded_row(bean, table)?;
        row.borrow_mut().set_reference(fk_name, target.clone())?;
        self.register_if_unsaved(bean, &row);
        Ok(())
    }

    /// The bean the foreign key `fk_name` of `table` points to, or `None`
    /// when its columns are null.
    pub fn get_reference(&self, bean: &Bean, table: &str, fk_name: &str) -> Result<Option<Bean>> {
        let row = self.loaded_row(bean, table)?;
        if let Some(target) = row.borrow().reference(fk_name) {
            return Ok(Some(target));
        }
        let fk = self.schema().foreign_key(table, fk_name)?;
        let mut filter = Columns::new();
        for (local, remote) in fk.column_pairs() {
            let value = row.borrow().get(local)?;
            if value.is_null() {
                return Ok(None);
            }
            filter.insert(remote.to_owned(), value);
        }
        let mut referenced_key = self.schema().primary_key_columns(&fk.referenced_table)?;
        referenced_key.sort_unstable();
        if filter.keys().eq(referenced_key.iter()) {
            self.find(&fk.referenced_table, filter).map(Some)
        } else {
            self.find_one_by(&fk.referenced_table, &filter)
        }
    }

    pub fn set_auto_save(&self, bean: &Bean, auto_save: bool) {
        bean.set_auto_save(auto_save);
    }

    // ------------- Saving -------------

    pub fn save(&self, bean: &Bean) -> Result<()> {
        let mut in_progress = HashSet::new();
        self.save_bean(bean, &mut in_progress)
    }

    /// Saves every pending bean that has auto-save on. Returns how many beans
    /// were saved.
    pub fn save_all(&self) -> Result<usize> {
        let beans = self.pending.borrow().beans();
        let (auto, opted_out): (Vec<Bean>, Vec<Bean>) =
            beans.into_iter().partition(|bean| bean.auto_save());
        let mut saved = 0;
        for bean in &auto {
            // may already have been written as the target of a reference
            if matches!(bean.state(), RowState::New | RowState::Dirty) {
                self.save(bean)?;
                saved += 1;
            }
        }
        info!(saved, skipped = opted_out.len(), "saved pending beans");
        Ok(saved)
    }

    fn save_bean(&self, bean: &Bean, in_progress: &mut HashSet<BeanId>) -> Result<()> {
        match bean.state() {
            RowState::Deleted => {
                return Err(RowkeeperError::InvalidOperation(format!(
                    "cannot save a deleted bean of {}",
                    bean.leaf_table()
                )));
            }
            RowState::Detached => self.attach(bean)?,
            _ => (),
        }
        if !in_progress.insert(bean.id()) {
            warn!(table = %bean.leaf_table(), "cyclic reference between new beans");
            return Err(RowkeeperError::CyclicReference { chain: Vec::new() });
        }
        let saved = self.write_bean(bean, in_progress);
        in_progress.remove(&bean.id());
        saved
    }

    fn write_bean(&self, bean: &Bean, in_progress: &mut HashSet<BeanId>) -> Result<()> {
        let rows = bean.rows();
        if rows.iter().any(|row| row.borrow().state() == RowState::New) {
            self.check_insertable(&rows)?;
            let mut previous: Option<&RowRef> = None;
            for row in &rows {
                if row.borrow().state() == RowState::New {
                    if let Some(parent) = previous {
                        self.inherit_key(parent, row)?;
                    }
                    self.resolve_references(row, in_progress)?;
                    self.insert_row(bean, row)?;
                }
                previous = Some(row);
            }
        }
        for row in rows.iter().rev() {
            if row.borrow().state() == RowState::Dirty {
                self.resolve_references(row, in_progress)?;
                self.update_row(bean, row)?;
            }
        }
        Ok(())
    }

    // Only the root row can lack a key once saving starts; the store can only
    // generate single-column keys. Key columns a pending reference will fill
    // in count as set, and nothing here touches the store.
    fn check_insertable(&self, rows: &[RowRef]) -> Result<()> {
        let Some(root) = rows.first() else {
            return Ok(());
        };
        let root = root.borrow();
        if root.state() != RowState::New || root.primary_key_columns().len() < 2 {
            return Ok(());
        }
        let mut missing: Vec<&String> = root
            .primary_key_columns()
            .iter()
            .filter(|c| !root.primary_key().contains_key(*c))
            .collect();
        for (fk_name, _) in root.references() {
            let fk = self.schema().foreign_key(root.table(), fk_name)?;
            missing.retain(|c| !fk.columns.contains(c));
        }
        if !missing.is_empty() {
            return Err(RowkeeperError::InvalidOperation(format!(
                "composite primary key ({}) of {} must be set before saving",
                root.primary_key_columns().join(", "),
                root.table()
            )));
        }
        Ok(())
    }

    fn inherit_key(&self, parent: &RowRef, child: &RowRef) -> Result<()> {
        let table = child.borrow().table().to_owned();
        let fk = self.parent_of(&table)?;
        let parent_key = parent.borrow().primary_key().clone();
        let mut key = Columns::new();
        for (local, remote) in fk.column_pairs() {
            let value = parent_key.get(remote).cloned().ok_or_else(|| {
                RowkeeperError::InvalidOperation(format!(
                    "parent row of {} has no value for key column {}",
                    table, remote
                ))
            })?;
            key.insert(local.to_owned(), value);
        }
        child.borrow_mut().assign_primary_key(key);
        Ok(())
    }

    fn resolve_references(&self, row: &RowRef, in_progress: &mut HashSet<BeanId>) -> Result<()> {
        let (table, references) = {
            let row = row.borrow();
            let references: Vec<(String, Bean)> = row
                .references()
                .map(|(fk, target)| (fk.clone(), target.clone()))
                .collect();
            (row.table().to_owned(), references)
        };
        for (fk_name, target) in references {
            if matches!(target.state(), RowState::New | RowState::Detached) {
                if let Err(e) = self.save_bean(&target, in_progress) {
                    if matches!(e, RowkeeperError::CyclicReference { .. }) {
                        // beans on a cycle would otherwise keep each other alive
                        row.borrow_mut().clear_reference(&fk_name);
                    }
                    return Err(e.through(format!("{}.{}", table, fk_name)));
                }
            }
            let fk = self.schema().foreign_key(&table, &fk_name)?;
            let mut values = Vec::new();
            for (local, remote) in fk.column_pairs() {
                values.push((local, self.get(&target, &fk.referenced_table, remote)?));
            }
            let mut row = row.borrow_mut();
            for (column, value) in values {
                row.resolve_column(column, value);
            }
            row.clear_reference(&fk_name);
        }
        Ok(())
    }

    fn insert_row(&self, bean: &Bean, row: &RowRef) -> Result<()> {
        let (table, columns) = {
            let row = row.borrow();
            (row.table().to_owned(), row.columns().clone())
        };
        let generated = self.connection.insert(&table, &columns)?;
        {
            let mut row = row.borrow_mut();
            if !row.has_complete_primary_key() {
                let column = row.primary_key_columns()[0].clone();
                match generated {
                    Some(value) => {
                        let mut key = Columns::new();
                        key.insert(column, value);
                        row.assign_primary_key(key);
                    }
                    None => {
                        return Err(RowkeeperError::InvalidOperation(format!(
                            "{} has no value for {} and the store generated none",
                            table, column
                        )));
                    }
                }
            }
            row.mark_inserted();
            debug!(table = %table, key = %describe(row.primary_key()), "inserted row");
        }
        self.install(row);
        self.pending.borrow_mut().remove(bean.id(), &table);
        Ok(())
    }

    fn update_row(&self, bean: &Bean, row: &RowRef) -> Result<()> {
        let (table, columns, key) = {
            let row = row.borrow();
            (
                row.table().to_owned(),
                row.columns().clone(),
                row.primary_key().clone(),
            )
        };
        self.connection.update(&table, &columns, &key)?;
        let previous = row.borrow_mut().mark_updated();
        if let Some(previous) = previous {
            self.evict(&table, &previous);
            self.install(row);
        }
        debug!(table = %table, key = %describe(&key), "updated row");
        self.pending.borrow_mut().remove(bean.id(), &table);
        Ok(())
    }

    // ------------- Deleting -------------

    /// Deletes the bean's rows, most specific table first. Deleting a deleted
    /// bean does nothing; a new bean is only forgotten.
    pub fn delete(&self, bean: &Bean) -> Result<()> {
        match bean.state() {
            RowState::Deleted => return Ok(()),
            RowState::Detached => {
                return Err(RowkeeperError::InvalidOperation(format!(
                    "cannot delete a detached bean of {}",
                    bean.leaf_table()
                )));
            }
            _ => (),
        }
        self.pending.borrow_mut().remove_bean(bean);
        let rows = bean.rows();
        for row in rows.iter().rev() {
            let (table, state, key) = {
                let row = row.borrow();
                (row.table().to_owned(), row.state(), row.primary_key().clone())
            };
            if state != RowState::New {
                self.connection.delete(&table, &key)?;
                self.evict(&table, &key);
                debug!(table = %table, key = %describe(&key), "deleted row");
            }
        }
        // only once every statement went through, so a failed delete can be retried
        for row in &rows {
            row.borrow_mut().mark_deleted();
        }
        Ok(())
    }

    /// Deletes the bean after deleting, recursively, every bean that
    /// references one of its rows through a foreign key.
    pub fn delete_cascade(&self, bean: &Bean) -> Result<()> {
        let mut in_progress = HashSet::new();
        self.cascade(bean, &mut in_progress)
    }

    fn cascade(&self, bean: &Bean, in_progress: &mut HashSet<BeanId>) -> Result<()> {
        match bean.state() {
            RowState::Deleted => return Ok(()),
            RowState::Detached | RowState::New => return self.delete(bean),
            _ => (),
        }
        if !in_progress.insert(bean.id()) {
            return Ok(());
        }
        self.specialize(bean)?;
        let tables = bean.tables();
        for table in tables.iter().rev() {
            for fk in self.schema().referencing_foreign_keys(table)? {
                if tables.contains(&fk.table) && self.schema().is_inheritance(&fk)? {
                    continue;
                }
                let mut filter = Columns::new();
                for (local, remote) in fk.column_pairs() {
                    filter.insert(local.to_owned(), self.get(bean, table, remote)?);
                }
                if filter.values().any(Value::is_null) {
                    continue;
                }
                for dependent in self.connection.fetch_by_columns(&fk.table, &filter)? {
                    let mut key = Columns::new();
                    for column in self.schema().primary_key_columns(&fk.table)? {
                        let value = dependent.get(&column).cloned().unwrap_or(Value::Null);
                        key.insert(column, value);
                    }
                    let dependent_bean = self.find(&fk.table, key)?;
                    debug!(table = %fk.table, via = %fk.name, "cascading delete");
                    self.cascade(&dependent_bean, in_progress)?;
                }
            }
        }
        self.delete(bean)
    }

    /// Forgets unsaved changes; the next access fetches the rows again.
    pub fn discard_changes(&self, bean: &Bean) -> Result<()> {
        match bean.state() {
            RowState::New | RowState::Deleted | RowState::Detached => {
                return Err(RowkeeperError::InvalidOperation(format!(
                    "cannot discard changes of a {} bean of {}",
                    bean.state(),
                    bean.leaf_table()
                )));
            }
            _ => (),
        }
        for row in bean.rows() {
            let mut row = row.borrow_mut();
            row.discard()?;
            self.pending.borrow_mut().remove(bean.id(), row.table());
        }
        Ok(())
    }
}
