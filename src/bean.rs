use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::row::{Row, RowState};
use crate::value::Columns;

pub type RowRef = Rc<RefCell<Row>>;

/// Identity of a bean within its session, handed out in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BeanId(u64);

#[derive(Debug, Default)]
pub struct BeanIdGenerator {
    lower_bound: u64,
}
impl BeanIdGenerator {
    pub fn new() -> Self {
        Self { lower_bound: 0 }
    }
    pub fn generate(&mut self) -> BeanId {
        self.lower_bound += 1;
        BeanId(self.lower_bound)
    }
}

pub struct BeanInner {
    id: BeanId,
    // root table first, most specific table last
    rows: RefCell<Vec<RowRef>>,
    auto_save: Cell<bool>,
}

/// A logical object made of one row per table of its inheritance chain.
///
/// Cloning a `Bean` clones the handle, not the object; use [`Bean::ptr_eq`] to
/// check whether two handles are the same instance.
#[derive(Clone)]
pub struct Bean(Rc<BeanInner>);

impl Bean {
    pub(crate) fn new(id: BeanId, rows: Vec<Row>, auto_save: bool) -> Self {
        Bean(Rc::new_cyclic(|owner| BeanInner {
            id,
            rows: RefCell::new(
                rows.into_iter()
                    .map(|mut row| {
                        row.owner = owner.clone();
                        Rc::new(RefCell::new(row))
                    })
                    .collect(),
            ),
            auto_save: Cell::new(auto_save),
        }))
    }
    pub(crate) fn from_inner(inner: Rc<BeanInner>) -> Self {
        Bean(inner)
    }
    /// Extends the chain downwards with a row of a more specific table.
    pub(crate) fn push_row(&self, mut row: Row) -> RowRef {
        row.owner = Rc::downgrade(&self.0);
        let row = Rc::new(RefCell::new(row));
        self.0.rows.borrow_mut().push(Rc::clone(&row));
        row
    }

    pub fn id(&self) -> BeanId {
        self.0.id
    }
    pub fn ptr_eq(a: &Bean, b: &Bean) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
    pub fn rows(&self) -> Vec<RowRef> {
        self.0.rows.borrow().clone()
    }
    pub fn row(&self, table: &str) -> Option<RowRef> {
        self.0
            .rows
            .borrow()
            .iter()
            .find(|row| row.borrow().table() == table)
            .cloned()
    }
    pub fn tables(&self) -> Vec<String> {
        self.0
            .rows
            .borrow()
            .iter()
            .map(|row| row.borrow().table().to_owned())
            .collect()
    }
    /// The most specific table of the chain.
    pub fn leaf_table(&self) -> String {
        self.0
            .rows
            .borrow()
            .last()
            .map(|row| row.borrow().table().to_owned())
            .unwrap_or_default()
    }
    /// The shared primary key, as held by the root row.
    pub fn primary_key(&self) -> Columns {
        self.0
            .rows
            .borrow()
            .first()
            .map(|row| row.borrow().primary_key().clone())
            .unwrap_or_default()
    }
    pub fn auto_save(&self) -> bool {
        self.0.auto_save.get()
    }
    pub(crate) fn set_auto_save(&self, auto_save: bool) {
        self.0.auto_save.set(auto_save);
    }

    /// The most unsaved state among the rows.
    pub fn state(&self) -> RowState {
        let states: Vec<RowState> = self
            .0
            .rows
            .borrow()
            .iter()
            .map(|row| row.borrow().state())
            .collect();
        combine(&states)
    }
}

fn combine(states: &[RowState]) -> RowState {
    const PRECEDENCE: [RowState; 5] = [
        RowState::Deleted,
        RowState::Dirty,
        RowState::New,
        RowState::Detached,
        RowState::NotLoaded,
    ];
    PRECEDENCE
        .into_iter()
        .find(|state| states.contains(state))
        .unwrap_or(RowState::Loaded)
}

impl PartialEq for Bean {
    fn eq(&self, other: &Self) -> bool {
        Bean::ptr_eq(self, other)
    }
}
impl Eq for Bean {}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Bean")
            .field("id", &self.id())
            .field("tables", &self.tables())
            .field("state", &self.state())
            .finish()
    }
}
