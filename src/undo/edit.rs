//! Recorded mutation of the score graph
//!
//! An `EditContext` pairs the score with the command being built. It is the
//! only way to change authored content: every call applies its change and
//! records the matching [`UndoAction`], so the command can always be reverted.

use super::{Command, UndoAction};
use crate::errors::{EngravingError, Result};
use crate::models::{Element, ElementId, Node, Score};

pub struct EditContext<'a> {
    score: &'a mut Score,
    command: &'a mut Command,
}

impl<'a> EditContext<'a> {
    pub fn new(score: &'a mut Score, command: &'a mut Command) -> Self {
        Self { score, command }
    }

    pub fn score(&self) -> &Score {
        self.score
    }

    /// Add a leaf element at its canonical position under `parent`
    pub fn add(&mut self, parent: ElementId, element: Element) -> Result<ElementId> {
        self.ensure(parent)?;
        let index = self.score.insert_index(parent, &element);
        self.add_at(parent, index, element)
    }

    /// Add a leaf element at an explicit child position
    pub fn add_at(&mut self, parent: ElementId, index: usize, element: Element) -> Result<ElementId> {
        self.ensure(parent)?;
        let id = self.score.alloc_id();
        let node = Node { id, parent: Some(parent), children: Vec::new(), element };
        self.attach(parent, index, vec![node])?;
        Ok(id)
    }

    /// Re-attach a previously removed subtree, keeping its ids
    pub fn add_subtree(&mut self, parent: ElementId, index: usize, nodes: Vec<Node>) -> Result<()> {
        self.attach(parent, index, nodes)
    }

    /// Remove an element and everything it owns
    pub fn remove(&mut self, id: ElementId) -> Result<Vec<Node>> {
        let (nodes, parent, index) = self
            .score
            .detach_subtree(id)
            .ok_or(EngravingError::InvalidReference(id))?;
        self.command.record(
            UndoAction::RemoveSubtree { parent, index, nodes: nodes.clone() },
            self.score,
        );
        Ok(nodes)
    }

    /// Move a subtree to a new parent and position
    pub fn move_to(&mut self, id: ElementId, parent: ElementId, index: usize) -> Result<()> {
        self.ensure(parent)?;
        let nodes = self.remove(id)?;
        self.attach(parent, index, nodes)
    }

    pub fn change(&mut self, id: ElementId, element: Element) -> Result<()> {
        let before = self
            .score
            .replace_element(id, element.clone())
            .ok_or(EngravingError::InvalidReference(id))?;
        if before != element {
            self.command.record(UndoAction::ChangeElement { id, before, after: element }, self.score);
        }
        Ok(())
    }

    /// Edit a payload in place through a closure
    pub fn modify<F>(&mut self, id: ElementId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Element),
    {
        let mut element = self
            .score
            .element(id)
            .cloned()
            .ok_or(EngravingError::InvalidReference(id))?;
        f(&mut element);
        self.change(id, element)
    }

    fn ensure(&self, id: ElementId) -> Result<()> {
        if self.score.contains(id) {
            Ok(())
        } else {
            Err(EngravingError::InvalidReference(id))
        }
    }

    fn attach(&mut self, parent: ElementId, index: usize, nodes: Vec<Node>) -> Result<()> {
        self.ensure(parent)?;
        let index = index.min(self.score.children(parent).len());
        self.score.attach_subtree(nodes.clone(), parent, index);
        self.command.record(UndoAction::AddSubtree { parent, index, nodes }, self.score);
        Ok(())
    }
}
