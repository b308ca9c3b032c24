use std::collections::BTreeMap;

use crate::bean::{Bean, BeanId};

/// Rows waiting to be written, keyed by owning bean and table.
///
/// The registry holds the owning bean strongly: a bean that was created or
/// modified and then let go by the caller must still be flushed by
/// `save_all`. Beans are visited in creation order.
#[derive(Debug, Default)]
pub struct PendingSaves {
    kept: BTreeMap<(BeanId, String), Bean>,
}

impl PendingSaves {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn register(&mut self, bean: &Bean, table: &str) {
        self.kept
            .entry((bean.id(), table.to_owned()))
            .or_insert_with(|| bean.clone());
    }
    pub fn remove(&mut self, bean: BeanId, table: &str) {
        self.kept.remove(&(bean, table.to_owned()));
    }
    pub fn remove_bean(&mut self, bean: &Bean) {
        let id = bean.id();
        self.kept.retain(|(kept, _), _| *kept != id);
    }
    pub fn contains(&self, bean: BeanId, table: &str) -> bool {
        self.kept.contains_key(&(bean, table.to_owned()))
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    /// Each registered bean once, in creation order.
    pub fn beans(&self) -> Vec<Bean> {
        let mut beans: Vec<Bean> = Vec::new();
        for ((id, _), bean) in &self.kept {
            if beans.last().is_none_or(|last| last.id() != *id) {
                beans.push(bean.clone());
            }
        }
        beans
    }
}
