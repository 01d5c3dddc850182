//! Item model over the element graph for the element inspector
//!
//! Items are rebuilt from the score on every `load`; an item key stays
//! valid until the next load. In tree mode items mirror the parent/child
//! structure of the graph, in flat mode every element is a direct child of
//! the root item. Elements of the arena that the walk from the score root
//! does not reach are collected under a separate "lost items" branch.

use crate::api::dispatch::{ActionDispatcher, DispatchError};
use crate::models::{ElementId, ElementKind, Score};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Position of an item: row under its parent, column, and the item's key.
/// The invisible root item has no index (`None` where an index is expected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ModelIndex {
    pub row: usize,
    pub column: usize,
    pub key: usize,
}

#[derive(Debug, Clone)]
struct Item {
    parent: Option<usize>,
    children: Vec<usize>,
    element: Option<ElementId>,
    data: Value,
}

#[derive(Debug, Clone)]
pub struct ElementsModel {
    items: Vec<Item>,
    info: String,
    summary: String,
    use_tree_parent: bool,
}

const ROOT: usize = 0;

impl Default for ElementsModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementsModel {
    pub fn new() -> Self {
        Self {
            items: vec![Item { parent: None, children: Vec::new(), element: None, data: Value::Null }],
            info: String::new(),
            summary: String::new(),
            use_tree_parent: true,
        }
    }

    pub fn is_use_tree_parent(&self) -> bool {
        self.use_tree_parent
    }

    /// Switch between nested and flat presentation; reloads from `score`
    pub fn set_is_use_tree_parent(&mut self, score: &Score, value: bool) {
        if self.use_tree_parent != value {
            self.use_tree_parent = value;
            self.load(score);
        }
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Rebuild all items from `score`
    pub fn load(&mut self, score: &Score) {
        *self = Self { use_tree_parent: self.use_tree_parent, ..Self::new() };

        let mut placed: HashSet<ElementId> = HashSet::new();
        if self.use_tree_parent {
            self.add_subtree(score, score.root(), ROOT, &mut placed);
        } else {
            for id in score.descendants(score.root()) {
                self.add_item(score, id, ROOT);
                placed.insert(id);
            }
        }

        let lost: Vec<ElementId> = score.ids().filter(|id| !placed.contains(id)).collect();
        if !lost.is_empty() {
            log::warn!("element model: {} element(s) not reachable from the score root", lost.len());
            let branch = self.push(ROOT, None, json!({ "name": "Lost items", "count": lost.len() }));
            for id in lost {
                self.add_item(score, id, branch);
            }
        }

        self.summary = make_summary(score, self.items.len() - 1);
        self.update_info(score, None);
    }

    fn add_subtree(&mut self, score: &Score, id: ElementId, parent_item: usize, placed: &mut HashSet<ElementId>) {
        if !placed.insert(id) {
            return;
        }
        let item = self.add_item(score, id, parent_item);
        for child in score.children(id) {
            self.add_subtree(score, *child, item, placed);
        }
    }

    fn add_item(&mut self, score: &Score, id: ElementId, parent_item: usize) -> usize {
        let data = make_data(score, id);
        self.push(parent_item, Some(id), data)
    }

    fn push(&mut self, parent: usize, element: Option<ElementId>, data: Value) -> usize {
        let key = self.items.len();
        self.items.push(Item { parent: Some(parent), children: Vec::new(), element, data });
        self.items[parent].children.push(key);
        key
    }

    fn item(&self, index: Option<ModelIndex>) -> Option<&Item> {
        match index {
            None => self.items.get(ROOT),
            Some(i) => self.items.get(i.key),
        }
    }

    fn row_of(&self, key: usize) -> usize {
        self.items[key]
            .parent
            .and_then(|p| self.items[p].children.iter().position(|c| *c == key))
            .unwrap_or(0)
    }

    pub fn index(&self, row: usize, column: usize, parent: Option<ModelIndex>) -> Option<ModelIndex> {
        if column >= self.column_count(parent) {
            return None;
        }
        let key = *self.item(parent)?.children.get(row)?;
        Some(ModelIndex { row, column, key })
    }

    pub fn parent(&self, child: ModelIndex) -> Option<ModelIndex> {
        let parent = self.items.get(child.key)?.parent?;
        if parent == ROOT {
            return None;
        }
        Some(ModelIndex { row: self.row_of(parent), column: 0, key: parent })
    }

    pub fn row_count(&self, parent: Option<ModelIndex>) -> usize {
        self.item(parent).map_or(0, |i| i.children.len())
    }

    pub fn column_count(&self, _parent: Option<ModelIndex>) -> usize {
        1
    }

    /// JSON data of the item: kind name, description, element key
    pub fn data(&self, index: ModelIndex) -> Option<&Value> {
        self.items.get(index.key).map(|i| &i.data)
    }

    pub fn element(&self, index: ModelIndex) -> Option<ElementId> {
        self.items.get(index.key).and_then(|i| i.element)
    }

    /// Index of the item showing `element`
    pub fn find(&self, element: ElementId) -> Option<ModelIndex> {
        let key = self.items.iter().position(|i| i.element == Some(element))?;
        Some(ModelIndex { row: self.row_of(key), column: 0, key })
    }

    /// Forward a selection to the dispatcher; the graph is never touched here
    pub fn select(
        &mut self,
        score: &Score,
        dispatcher: &mut dyn ActionDispatcher,
        index: ModelIndex,
        additive: bool,
    ) -> Result<(), DispatchError> {
        let Some(element) = self.element(index) else {
            return Ok(());
        };
        dispatcher.dispatch("select", json!({ "key": element.key(), "additive": additive }))?;
        self.update_info(score, Some(element));
        Ok(())
    }

    fn update_info(&mut self, score: &Score, selected: Option<ElementId>) {
        self.info = match selected.and_then(|id| score.get(id).map(|n| (id, n))) {
            Some((id, node)) => {
                let parent = node
                    .parent
                    .and_then(|p| score.element(p))
                    .map(|e| e.kind().name())
                    .unwrap_or("-");
                format!(
                    "{} {}\nparent: {}\nchildren: {}",
                    id,
                    node.element.describe(),
                    parent,
                    node.children.len()
                )
            }
            None => String::new(),
        };
    }
}

fn make_data(score: &Score, id: ElementId) -> Value {
    match score.get(id) {
        Some(node) => json!({
            "name": node.element.kind().name(),
            "info": node.element.describe(),
            "key": id.key(),
            "generated": id.is_generated(),
            "children": node.children.len(),
        }),
        None => Value::Null,
    }
}

fn make_summary(score: &Score, items: usize) -> String {
    let mut counts: BTreeMap<ElementKind, usize> = BTreeMap::new();
    let mut generated = 0;
    for id in score.ids() {
        if let Some(kind) = score.kind(id) {
            *counts.entry(kind).or_default() += 1;
        }
        if id.is_generated() {
            generated += 1;
        }
    }
    let mut lines: Vec<String> = counts
        .iter()
        .map(|(kind, n)| format!("{}: {}", kind.name(), n))
        .collect();
    lines.push(format!("total: {} ({} generated, {} items)", score.len(), generated, items));
    lines.join("\n")
}

/// Per-kind counts keyed by kind name, for JSON consumers
pub fn kind_counts(score: &Score) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for id in score.ids() {
        if let Some(kind) = score.kind(id) {
            *counts.entry(kind.name()).or_default() += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Element, LayoutBreakKind, Node, ScoreBuilder};

    struct Recorder(Vec<(String, Value)>);

    impl ActionDispatcher for Recorder {
        fn dispatch(&mut self, action: &str, params: Value) -> Result<Value, DispatchError> {
            self.0.push((action.to_string(), params));
            Ok(Value::Null)
        }
    }

    fn score() -> Score {
        ScoreBuilder::new(2).measures(2, 4, 4).build()
    }

    #[test]
    fn test_tree_mirrors_graph() {
        let score = score();
        let mut model = ElementsModel::new();
        model.load(&score);

        assert_eq!(model.row_count(None), 1);
        let root = model.index(0, 0, None).unwrap();
        assert_eq!(model.element(root), Some(score.root()));
        assert_eq!(model.row_count(Some(root)), score.children(score.root()).len());

        let staff = model.index(0, 0, Some(root)).unwrap();
        assert_eq!(model.data(staff).unwrap()["name"], json!("Staff"));
        assert_eq!(model.parent(staff), Some(root));
        assert_eq!(model.parent(root), None);
        assert!(model.index(0, 1, Some(root)).is_none());
    }

    #[test]
    fn test_flat_mode_lists_every_element() {
        let score = score();
        let mut model = ElementsModel::new();
        model.load(&score);
        model.set_is_use_tree_parent(&score, false);
        assert!(!model.is_use_tree_parent());
        assert_eq!(model.row_count(None), score.len());
    }

    #[test]
    fn test_lost_items_branch() {
        let mut score = score();
        let orphan = ElementId::from_key(4000).unwrap();
        let missing_parent = ElementId::from_key(4001).unwrap();
        score.attach_subtree(
            vec![Node {
                id: orphan,
                parent: Some(missing_parent),
                children: Vec::new(),
                element: Element::LayoutBreak(LayoutBreakKind::Line),
            }],
            missing_parent,
            0,
        );
        let mut model = ElementsModel::new();
        model.load(&score);
        assert_eq!(model.row_count(None), 2);
        let lost = model.index(1, 0, None).unwrap();
        assert_eq!(model.data(lost).unwrap()["name"], json!("Lost items"));
        assert_eq!(model.row_count(Some(lost)), 1);
        assert_eq!(model.find(orphan).map(|i| i.row), Some(0));
    }

    #[test]
    fn test_select_forwards_and_updates_info() {
        let score = score();
        let mut model = ElementsModel::new();
        model.load(&score);
        let m = score.first_measure().unwrap();
        let index = model.find(m).unwrap();
        let mut recorder = Recorder(Vec::new());
        model.select(&score, &mut recorder, index, true).unwrap();

        assert_eq!(recorder.0.len(), 1);
        assert_eq!(recorder.0[0].0, "select");
        assert_eq!(recorder.0[0].1["key"], json!(m.key()));
        assert_eq!(recorder.0[0].1["additive"], json!(true));
        assert!(model.info().contains("Measure 4/4"));
    }

    #[test]
    fn test_summary_counts_kinds() {
        let score = score();
        let mut model = ElementsModel::new();
        model.load(&score);
        assert!(model.summary().contains("Measure: 2"));
        assert!(model.summary().contains("Staff: 2"));
        assert_eq!(kind_counts(&score).get("Rest"), Some(&4));
    }
}
