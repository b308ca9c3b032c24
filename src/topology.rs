//! Inheritance topology: which tables make up one logical bean.
//!
//! A child table extends its parent through a foreign key from its primary key
//! onto the parent's primary key. Following those keys upward from any table
//! gives its ancestor chain, root first. The schema is immutable for the life
//! of the process, so every answer is memoized.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::error::{Result, RowkeeperError};
use crate::identity::OtherHasher;
use crate::schema::{ForeignKey, SchemaProvider};

pub struct Topology<S: SchemaProvider> {
    schema: S,
    ancestors: RefCell<HashMap<String, Vec<String>, OtherHasher>>,
    chains: RefCell<HashMap<Vec<String>, Vec<String>, OtherHasher>>,
    related: RefCell<HashMap<String, BTreeSet<String>, OtherHasher>>,
}

impl<S: SchemaProvider> Topology<S> {
    pub fn new(schema: S) -> Self {
        Self {
            schema,
            ancestors: RefCell::new(HashMap::default()),
            chains: RefCell::new(HashMap::default()),
            related: RefCell::new(HashMap::default()),
        }
    }
    pub fn schema(&self) -> &S {
        &self.schema
    }

    /// The chain from the top-most ancestor of `table` down to `table` itself.
    pub fn ancestors(&self, table: &str) -> Result<Vec<String>> {
        if let Some(chain) = self.ancestors.borrow().get(table) {
            return Ok(chain.clone());
        }
        let mut chain = vec![table.to_owned()];
        let mut seen = HashSet::new();
        seen.insert(table.to_owned());
        let mut current = table.to_owned();
        while let Some(parent) = self.schema.parent_relationship(&current)? {
            current = parent.referenced_table;
            if !seen.insert(current.clone()) {
                // a loop of PK-to-PK keys has no root
                return Err(RowkeeperError::Inheritance { tables: chain });
            }
            chain.push(current.clone());
        }
        chain.reverse();
        self.ancestors
            .borrow_mut()
            .insert(table.to_owned(), chain.clone());
        Ok(chain)
    }

    /// Orders `tables` as one root-to-leaf inheritance chain.
    ///
    /// Each requested table is tried as the most specific one: if its ancestor
    /// chain contains every requested table, that chain is the answer. The
    /// chain may contain tables that were not requested (intermediate ancestors).
    pub fn link_chain(&self, tables: &[&str]) -> Result<Vec<String>> {
        let mut key: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        key.sort_unstable();
        key.dedup();
        if let Some(chain) = self.chains.borrow().get(&key) {
            return Ok(chain.clone());
        }
        for candidate in &key {
            let chain = self.ancestors(candidate)?;
            if key.iter().all(|t| chain.contains(t)) {
                debug!(tables = ?key, chain = ?chain, "linked inheritance chain");
                self.chains.borrow_mut().insert(key, chain.clone());
                return Ok(chain);
            }
        }
        Err(RowkeeperError::Inheritance { tables: key })
    }

    /// Direct PK-to-PK children of `table`.
    pub fn children(&self, table: &str) -> Result<Vec<ForeignKey>> {
        self.schema.child_relationships(table)
    }

    /// Every table `table` takes part in: its ancestors and all of its descendants.
    pub fn related_tables(&self, table: &str) -> Result<BTreeSet<String>> {
        if let Some(related) = self.related.borrow().get(table) {
            return Ok(related.clone());
        }
        let mut related: BTreeSet<String> = self.ancestors(table)?.into_iter().collect();
        let mut queue = VecDeque::from([table.to_owned()]);
        while let Some(current) = queue.pop_front() {
            for child in self.schema.child_relationships(&current)? {
                if related.insert(child.table.clone()) {
                    queue.push_back(child.table);
                }
            }
        }
        self.related
            .borrow_mut()
            .insert(table.to_owned(), related.clone());
        Ok(related)
    }

    /// The shortest chain of foreign keys, followed in either direction, that
    /// links `from` to `to`.
    ///
    /// Several equally short chains make the relationship ambiguous; all of them
    /// are reported so the caller can pick one explicitly.
    pub fn join_path(&self, from: &str, to: &str) -> Result<Vec<ForeignKey>> {
        if from == to {
            return Ok(Vec::new());
        }
        let mut distance: HashMap<String, usize> = HashMap::new();
        let mut predecessors: HashMap<String, Vec<(String, ForeignKey)>> = HashMap::new();
        distance.insert(from.to_owned(), 0);
        let mut queue = VecDeque::from([from.to_owned()]);
        while let Some(current) = queue.pop_front() {
            let depth = distance[&current];
            if distance.get(to).is_some_and(|d| *d <= depth) {
                break;
            }
            for (neighbour, fk) in self.neighbours(&current)? {
                match distance.get(&neighbour) {
                    None => {
                        distance.insert(neighbour.clone(), depth + 1);
                        predecessors
                            .entry(neighbour.clone())
                            .or_default()
                            .push((current.clone(), fk));
                        queue.push_back(neighbour);
                    }
                    Some(d) if *d == depth + 1 => {
                        predecessors
                            .entry(neighbour)
                            .or_default()
                            .push((current.clone(), fk));
                    }
                    Some(_) => (),
                }
            }
        }
        if !distance.contains_key(to) {
            return Err(RowkeeperError::InvalidOperation(format!(
                "no foreign key path between {} and {}",
                from, to
            )));
        }
        let mut paths = collect_paths(from, to, &predecessors);
        if paths.len() > 1 {
            return Err(RowkeeperError::Ambiguity {
                from: from.to_owned(),
                to: to.to_owned(),
                paths: paths
                    .iter()
                    .map(|path| {
                        path.iter()
                            .map(|fk| fk.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .collect(),
            });
        }
        Ok(paths.pop().unwrap_or_default())
    }

    fn neighbours(&self, table: &str) -> Result<Vec<(String, ForeignKey)>> {
        let mut neighbours = Vec::new();
        for fk in self.schema.foreign_keys(table)? {
            if fk.referenced_table != table {
                neighbours.push((fk.referenced_table.clone(), fk));
            }
        }
        for fk in self.schema.referencing_foreign_keys(table)? {
            if fk.table != table {
                neighbours.push((fk.table.clone(), fk));
            }
        }
        Ok(neighbours)
    }
}

fn collect_paths(
    from: &str,
    node: &str,
    predecessors: &HashMap<String, Vec<(String, ForeignKey)>>,
) -> Vec<Vec<ForeignKey>> {
    if node == from {
        return vec![Vec::new()];
    }
    let mut paths = Vec::new();
    for (previous, fk) in predecessors.get(node).into_iter().flatten() {
        for mut path in collect_paths(from, previous, predecessors) {
            path.push(fk.clone());
            paths.push(path);
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StaticSchema;

    // animal <- mammal <- dog, mammal <- cat
    fn zoo() -> Topology<StaticSchema> {
        Topology::new(
            StaticSchema::new()
                .table("animal", &["id"])
                .table("mammal", &["id"])
                .table("dog", &["id"])
                .table("cat", &["id"])
                .table("keeper", &["id"])
                .foreign_key("mammal_is_animal", "mammal", &["id"], "animal", &["id"])
                .foreign_key("dog_is_mammal", "dog", &["id"], "mammal", &["id"])
                .foreign_key("cat_is_mammal", "cat", &["id"], "mammal", &["id"])
                .foreign_key("animal_keeper", "animal", &["keeper_id"], "keeper", &["id"])
                .foreign_key("animal_vet", "animal", &["vet_id"], "keeper", &["id"]),
        )
    }

    #[test]
    fn chain_runs_root_to_leaf() {
        let topology = zoo();
        assert_eq!(
            topology.link_chain(&["dog", "animal"]).unwrap(),
            vec!["animal", "mammal", "dog"]
        );
        assert_eq!(topology.link_chain(&["animal"]).unwrap(), vec!["animal"]);
    }

    #[test]
    fn siblings_cannot_be_linked() {
        match zoo().link_chain(&["dog", "cat"]) {
            Err(RowkeeperError::Inheritance { tables }) => {
                assert_eq!(tables, vec!["cat", "dog"]);
            }
            other => panic!("expected inheritance error, got {:?}", other),
        }
    }

    #[test]
    fn related_tables_cover_both_directions() {
        let topology = zoo();
        let related: Vec<String> = topology.related_tables("mammal").unwrap().into_iter().collect();
        assert_eq!(related, vec!["animal", "cat", "dog", "mammal"]);
        let related: Vec<String> = topology.related_tables("dog").unwrap().into_iter().collect();
        assert_eq!(related, vec!["animal", "dog", "mammal"]);
    }

    #[test]
    fn answers_are_memoized() {
        let topology = zoo();
        topology.link_chain(&["dog"]).unwrap();
        topology.related_tables("dog").unwrap();
        assert_eq!(topology.chains.borrow().len(), 1);
        assert!(topology.ancestors.borrow().contains_key("dog"));
        assert!(topology.related.borrow().contains_key("dog"));
    }

    #[test]
    fn join_path_follows_keys_both_ways() {
        let topology = zoo();
        let path = topology.join_path("dog", "animal").unwrap();
        let names: Vec<&str> = path.iter().map(|fk| fk.name.as_str()).collect();
        assert_eq!(names, vec!["dog_is_mammal", "mammal_is_animal"]);
        assert!(topology.join_path("cat", "cat").unwrap().is_empty());
    }

    #[test]
    fn two_equally_short_paths_are_ambiguous() {
        match zoo().join_path("keeper", "animal") {
            Err(RowkeeperError::Ambiguity { paths, .. }) => {
                assert_eq!(paths.len(), 2);
                assert!(paths.iter().any(|p| p.contains("animal_keeper")));
                assert!(paths.iter().any(|p| p.contains("animal_vet")));
            }
            other => panic!("expected ambiguity error, got {:?}", other),
        }
    }

    #[test]
    fn disconnected_tables_have_no_path() {
        let topology = Topology::new(StaticSchema::new().table("a", &["id"]).table("b", &["id"]));
        assert!(matches!(
            topology.join_path("a", "b"),
            Err(RowkeeperError::InvalidOperation(_))
        ));
    }
}
